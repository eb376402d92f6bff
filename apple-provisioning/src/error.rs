// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Unified error type for provisioning profile handling.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("failed to find embedded plist in provisioning profile data")]
    MarkerNotFound,

    #[error("malformed property list: {0}")]
    MalformedPropertyList(#[from] plist::Error),

    #[error("property list value is not a dictionary")]
    PropertyListNotDictionary,

    #[error("property list key {key} is not of type {expected}")]
    PropertyListKeyType { key: String, expected: &'static str },

    #[error("provisioning profile has no Entitlements dictionary")]
    MissingEntitlements,

    #[error("invalid developer certificate data: {0}")]
    InvalidCertificateData(#[from] x509_certificate::X509CertificateError),

    #[error("no compatible provisioning profile found for {bundle_identifier} (distribution: {for_distribution}); install or download a matching provisioning profile")]
    NoCompatibleProvisionFound {
        bundle_identifier: String,
        for_distribution: bool,
    },

    #[error("no embedded.mobileprovision in {0}")]
    EmbeddedProvisionMissing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error walking directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("PEM error: {0}")]
    CertificatePem(#[from] pem::PemError),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("bad argument: {0}")]
    CliBadArgument(String),
}
