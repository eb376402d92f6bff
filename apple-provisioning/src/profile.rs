// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Mobile provisioning profiles.

[MobileProvisionProfile] is a read-only view of the fields of a
provisioning profile that matter for code signing: the team prefix, the
application identifier, the developer certificates, the devices the profile
is restricted to and its entitlements.
*/

use {
    crate::{
        error::ProvisioningError,
        locator::{extract_payload, PayloadExtraction},
        plist_document::PropertyListDocument,
    },
    log::warn,
    std::{io::Read, path::Path},
    x509_certificate::CapturedX509Certificate,
};

/// Value used for identifiers that are absent from a profile.
pub const UNKNOWN_VALUE: &str = "(unknown)";

/// Name of the provisioning profile embedded in application bundles.
pub const EMBEDDED_PROVISION_NAME: &str = "embedded.mobileprovision";

const KEY_APPLICATION_IDENTIFIER: &str = "application-identifier";
const KEY_KEYCHAIN_ACCESS_GROUPS: &str = "keychain-access-groups";
const KEY_GET_TASK_ALLOW: &str = "get-task-allow";

/// A parsed provisioning profile.
#[derive(Clone, Debug)]
pub struct MobileProvisionProfile {
    application_identifier_prefix: Option<String>,
    application_identifier: String,
    developer_certificates: Vec<CapturedX509Certificate>,
    provision_name: String,
    provisioned_device_ids: Vec<String>,
    is_debuggable: bool,
    entitlements: PropertyListDocument,
    document: PropertyListDocument,
}

impl MobileProvisionProfile {
    /// Construct an instance from the text of the embedded property list.
    pub fn parse(text: &str) -> Result<Self, ProvisioningError> {
        let document = PropertyListDocument::from_xml_str(text)?;

        let prefixes = document
            .get_string_array("ApplicationIdentifierPrefix")?
            .unwrap_or_default();
        if prefixes.len() > 1 {
            warn!("found more than one entry for ApplicationIdentifierPrefix; using the first one");
        }
        let application_identifier_prefix = prefixes.into_iter().next();

        let developer_certificates = document
            .get_data_array("DeveloperCertificates")?
            .unwrap_or_default()
            .into_iter()
            .map(CapturedX509Certificate::from_der)
            .collect::<Result<Vec<_>, _>>()?;

        let provision_name = document
            .get_string("Name")?
            .unwrap_or(UNKNOWN_VALUE)
            .to_string();

        let provisioned_device_ids = document
            .get_string_array("ProvisionedDevices")?
            .unwrap_or_default();

        let entitlements = document
            .clone_dictionary_rooted_at("Entitlements")?
            .ok_or(ProvisioningError::MissingEntitlements)?;

        let application_identifier = entitlements
            .get_string(KEY_APPLICATION_IDENTIFIER)?
            .unwrap_or(UNKNOWN_VALUE)
            .to_string();

        let is_debuggable = entitlements.get_bool(KEY_GET_TASK_ALLOW)?.unwrap_or(false);

        Ok(Self {
            application_identifier_prefix,
            application_identifier,
            developer_certificates,
            provision_name,
            provisioned_device_ids,
            is_debuggable,
            entitlements,
            document,
        })
    }

    /// Construct an instance from the raw bytes of a `.mobileprovision` file.
    pub fn from_provision_data(
        data: &[u8],
        extraction: PayloadExtraction,
    ) -> Result<Self, ProvisioningError> {
        Self::parse(&extract_payload(data, extraction)?)
    }

    /// Construct an instance from a `.mobileprovision` file.
    pub fn from_path(
        path: impl AsRef<Path>,
        extraction: PayloadExtraction,
    ) -> Result<Self, ProvisioningError> {
        let data = std::fs::read(path.as_ref())?;

        Self::from_provision_data(&data, extraction)
    }

    /// Construct an instance from the profile embedded in an `.ipa` archive.
    ///
    /// Both `embedded.mobileprovision` at the archive root and
    /// `Payload/<name>.app/embedded.mobileprovision` are recognized.
    pub fn from_ipa(
        path: impl AsRef<Path>,
        extraction: PayloadExtraction,
    ) -> Result<Self, ProvisioningError> {
        let path = path.as_ref();
        let mut archive = zip::ZipArchive::new(std::fs::File::open(path)?)?;

        let name = archive
            .file_names()
            .find(|name| is_embedded_provision_entry(name))
            .map(|name| name.to_string())
            .ok_or_else(|| ProvisioningError::EmbeddedProvisionMissing(path.display().to_string()))?;

        let mut data = Vec::new();
        archive.by_name(&name)?.read_to_end(&mut data)?;

        Self::from_provision_data(&data, extraction)
    }

    /// The team prefix of the application identifier, if present.
    pub fn application_identifier_prefix(&self) -> Option<&str> {
        self.application_identifier_prefix.as_deref()
    }

    /// The `application-identifier` entitlement.
    ///
    /// e.g. `ABCDE12345.com.example.app` or `ABCDE12345.*`.
    pub fn application_identifier(&self) -> &str {
        &self.application_identifier
    }

    /// Certificates that may sign applications using this profile.
    pub fn developer_certificates(&self) -> &[CapturedX509Certificate] {
        &self.developer_certificates
    }

    /// The human readable name of this profile.
    pub fn provision_name(&self) -> &str {
        &self.provision_name
    }

    /// Unique device identifiers this profile is restricted to.
    ///
    /// Empty for profiles that aren't device restricted.
    pub fn provisioned_device_ids(&self) -> &[String] {
        &self.provisioned_device_ids
    }

    /// Whether the `get-task-allow` entitlement is set.
    pub fn is_debuggable(&self) -> bool {
        self.is_debuggable
    }

    /// Whether this looks like a distribution profile.
    pub fn is_distribution(&self) -> bool {
        self.provisioned_device_ids.is_empty() && !self.is_debuggable
    }

    /// Whether this profile is restricted to a given device.
    ///
    /// Device identifiers are compared case-insensitively.
    pub fn contains_device(&self, udid: &str) -> bool {
        self.provisioned_device_ids
            .iter()
            .any(|id| id.eq_ignore_ascii_case(udid))
    }

    /// The entitlements dictionary as stored in the profile.
    pub fn entitlements(&self) -> &PropertyListDocument {
        &self.entitlements
    }

    /// The full property list of the profile.
    pub fn document(&self) -> &PropertyListDocument {
        &self.document
    }

    /// Produce an entitlements plist for signing `bundle_identifier`.
    ///
    /// When the profile's application identifier contains a wildcard, the
    /// identifier is replaced with `<prefix>.<bundle_identifier>` and every
    /// wildcard keychain access group collapses to that same value. Otherwise
    /// the entitlements are emitted as-is.
    pub fn entitlements_text(&self, bundle_identifier: &str) -> Result<String, ProvisioningError> {
        let mut entitlements = self.entitlements.clone();

        let current = entitlements
            .get_string(KEY_APPLICATION_IDENTIFIER)?
            .unwrap_or_default()
            .to_string();

        if current.contains('*') {
            let new_identifier = format!(
                "{}.{}",
                self.application_identifier_prefix.as_deref().unwrap_or_default(),
                bundle_identifier
            );
            entitlements.set_string(KEY_APPLICATION_IDENTIFIER, &new_identifier);

            if let Some(groups) = entitlements.get_string_array(KEY_KEYCHAIN_ACCESS_GROUPS)? {
                let groups = groups
                    .into_iter()
                    .map(|group| {
                        if group.contains('*') {
                            new_identifier.clone()
                        } else {
                            group
                        }
                    })
                    .collect::<Vec<_>>();

                entitlements.set_string_array(KEY_KEYCHAIN_ACCESS_GROUPS, groups);
            }
        }

        entitlements.to_xml_string()
    }
}

fn is_embedded_provision_entry(name: &str) -> bool {
    if name == EMBEDDED_PROVISION_NAME {
        return true;
    }

    match name.strip_prefix("Payload/") {
        Some(rest) => rest
            .split_once('/')
            .map(|(app, file)| app.ends_with(".app") && file == EMBEDDED_PROVISION_NAME)
            .unwrap_or(false),
        None => false,
    }
}
