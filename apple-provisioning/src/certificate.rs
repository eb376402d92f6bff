// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Resolving local signing identities for provisioning profiles.

A provisioning profile is only usable if the machine holds the private key
of one of the profile's developer certificates. [CertificateResolver] is the
seam through which profile matching asks that question.
*/

use {
    crate::{error::ProvisioningError, profile::MobileProvisionProfile},
    log::{debug, info, warn},
    std::{collections::HashSet, path::Path},
    x509_certificate::{CapturedX509Certificate, InMemorySigningKeyPair, Sign},
};

/// Finds a locally usable signing certificate for a provisioning profile.
pub trait CertificateResolver {
    /// Find a developer certificate of `profile` that can be signed with.
    ///
    /// Returns `Ok(None)` if no certificate is available.
    fn find_certificate(
        &self,
        profile: &MobileProvisionProfile,
    ) -> Result<Option<CapturedX509Certificate>, ProvisioningError>;
}

impl<F> CertificateResolver for F
where
    F: Fn(&MobileProvisionProfile) -> Result<Option<CapturedX509Certificate>, ProvisioningError>,
{
    fn find_certificate(
        &self,
        profile: &MobileProvisionProfile,
    ) -> Result<Option<CapturedX509Certificate>, ProvisioningError> {
        self(profile)
    }
}

/// A resolver that never finds a certificate.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCertificateResolver;

impl CertificateResolver for NoCertificateResolver {
    fn find_certificate(
        &self,
        _profile: &MobileProvisionProfile,
    ) -> Result<Option<CapturedX509Certificate>, ProvisioningError> {
        Ok(None)
    }
}

/// Resolves certificates from a fixed set of trusted certificates.
///
/// Certificates are compared by SHA-256 fingerprint. No private key is
/// consulted: the caller vouches for the key being available.
#[derive(Clone, Debug, Default)]
pub struct StaticCertificateResolver {
    fingerprints: HashSet<String>,
}

impl StaticCertificateResolver {
    /// Register a certificate as available.
    pub fn add_certificate(
        &mut self,
        cert: &CapturedX509Certificate,
    ) -> Result<(), ProvisioningError> {
        self.fingerprints.insert(sha256_hex(cert)?);

        Ok(())
    }

    /// Register a certificate by its hex encoded SHA-256 fingerprint.
    pub fn add_fingerprint(&mut self, fingerprint: &str) {
        self.fingerprints.insert(fingerprint.to_ascii_lowercase());
    }

    /// Whether no certificates are registered.
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

impl CertificateResolver for StaticCertificateResolver {
    fn find_certificate(
        &self,
        profile: &MobileProvisionProfile,
    ) -> Result<Option<CapturedX509Certificate>, ProvisioningError> {
        for cert in profile.developer_certificates() {
            if self.fingerprints.contains(&sha256_hex(cert)?) {
                return Ok(Some(cert.clone()));
            }
        }

        Ok(None)
    }
}

/// Resolves certificates against private keys loaded from PEM files.
///
/// A developer certificate resolves only when a loaded private key has the
/// same public key. `CERTIFICATE` entries are ignored: a certificate alone
/// can't sign anything.
#[derive(Default)]
pub struct PemCertificateResolver {
    keys: Vec<InMemorySigningKeyPair>,
}

impl PemCertificateResolver {
    /// Load private keys from PEM files.
    pub fn from_paths(
        paths: impl IntoIterator<Item = impl AsRef<Path>>,
    ) -> Result<Self, ProvisioningError> {
        let mut res = Self::default();

        for path in paths {
            res.load_pem_file(path.as_ref())?;
        }

        Ok(res)
    }

    /// Load private keys from a PEM file.
    pub fn load_pem_file(&mut self, path: &Path) -> Result<(), ProvisioningError> {
        info!("reading PEM data from {}", path.display());
        let data = std::fs::read(path)?;

        self.load_pem_data(&data)
    }

    /// Load private keys from PEM encoded data.
    pub fn load_pem_data(&mut self, data: &[u8]) -> Result<(), ProvisioningError> {
        for pem in pem::parse_many(data)? {
            match pem.tag() {
                "CERTIFICATE" => {
                    debug!("ignoring certificate in PEM data; only private keys are used");
                }
                "PRIVATE KEY" => {
                    self.keys
                        .push(InMemorySigningKeyPair::from_pkcs8_der(pem.contents())?);
                }
                tag => warn!("(unhandled PEM tag {}; ignoring)", tag),
            }
        }

        Ok(())
    }

    /// Number of private keys loaded.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

impl CertificateResolver for PemCertificateResolver {
    fn find_certificate(
        &self,
        profile: &MobileProvisionProfile,
    ) -> Result<Option<CapturedX509Certificate>, ProvisioningError> {
        for cert in profile.developer_certificates() {
            let public_key = cert.public_key_data();

            if self
                .keys
                .iter()
                .any(|key| key.public_key_data() == public_key)
            {
                if !cert.time_constraints_valid(None) {
                    warn!(
                        "signing certificate for {} expired as of {}; signatures may not be valid",
                        profile.provision_name(),
                        cert.validity_not_after().to_rfc3339()
                    );
                }

                return Ok(Some(cert.clone()));
            }
        }

        Ok(None)
    }
}

/// Hex encoded SHA-256 fingerprint of a certificate.
pub fn sha256_hex(cert: &CapturedX509Certificate) -> Result<String, ProvisioningError> {
    Ok(hex::encode(cert.sha256_fingerprint()?.as_ref()))
}
