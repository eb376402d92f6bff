// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Apple mobile provisioning profiles.

This crate reads iOS `.mobileprovision` files and selects the profile an
application should be signed with.

* [locator] pulls the XML property list out of the signed profile bytes.
* [plist_document::PropertyListDocument] gives typed access to property list
  dictionaries.
* [profile::MobileProvisionProfile] is a parsed profile. It can also derive
  the entitlements for a concrete bundle identifier.
* [certificate::CertificateResolver] decides whether a signing identity for
  a profile is available locally.
* [library] syncs profiles into a library directory and picks a compatible
  profile for a bundle identifier.

Settings are loaded through [config::ConfigBuilder]. The `mprovision`
binary exposes all of this from the command line.
*/

pub mod certificate;
pub mod cli;
pub mod config;
pub mod error;
pub mod library;
pub mod locator;
pub mod plist_document;
pub mod profile;
#[cfg(test)]
mod testutil;

pub use {
    certificate::{
        CertificateResolver, NoCertificateResolver, PemCertificateResolver,
        StaticCertificateResolver,
    },
    config::{ConfigBuilder, ProvisioningConfig},
    error::ProvisioningError,
    library::{find_compatible_provision, sync_provision_sources, ProvisionLibrary, ProvisionMatcher},
    locator::{extract_payload, locate, PayloadExtraction},
    plist_document::PropertyListDocument,
    profile::MobileProvisionProfile,
};
