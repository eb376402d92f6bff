// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Provisioning profile libraries and profile selection.

A library is a directory of `.mobileprovision` files. Selecting a profile for
a bundle identifier runs in phases, and the first qualifying profile of the
earliest phase wins:

1. Profiles whose application identifier contains the bundle identifier.
2. Wildcard profiles: the name contains `Wildcard` or the application
   identifier contains `*`.
3. The `embedded.mobileprovision` previously staged from the app bundle.

When matching for distribution, only profiles that are neither device
restricted nor debuggable qualify. A qualifying profile must also have a
locally resolvable signing certificate.

Profiles are visited in lexicographic path order, so selection is
deterministic.
*/

use {
    crate::{
        certificate::CertificateResolver,
        config::ProvisioningConfig,
        error::ProvisioningError,
        locator::PayloadExtraction,
        profile::{MobileProvisionProfile, EMBEDDED_PROVISION_NAME},
    },
    log::{debug, info, warn},
    rayon::prelude::*,
    std::{
        cell::RefCell,
        collections::{BTreeMap, HashMap},
        path::{Path, PathBuf},
    },
};

/// File extension of provisioning profiles.
pub const PROVISION_EXTENSION: &str = "mobileprovision";

fn is_provision_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(PROVISION_EXTENSION))
            .unwrap_or(false)
}

/// Copy provisioning profiles from source directories into a library.
///
/// Source directories are searched recursively. A profile is only copied if
/// the library doesn't already contain a file with the same name. Copies
/// are made writable. Source directories that don't exist are ignored.
///
/// Returns the paths of newly copied files.
pub fn sync_provision_sources(
    library_directory: &Path,
    sources: &[PathBuf],
) -> Result<Vec<PathBuf>, ProvisioningError> {
    std::fs::create_dir_all(library_directory)?;

    let mut copied = vec![];

    for source in sources {
        if !source.is_dir() {
            debug!("provision source {} does not exist; skipping", source.display());
            continue;
        }

        for entry in walkdir::WalkDir::new(source).sort_by_file_name() {
            let entry = entry?;

            if !is_provision_file(entry.path()) {
                continue;
            }

            let dest_path = library_directory.join(entry.file_name());
            if dest_path.exists() {
                continue;
            }

            info!(
                "copying {} to {}",
                entry.path().display(),
                dest_path.display()
            );
            std::fs::copy(entry.path(), &dest_path)?;

            let mut permissions = std::fs::metadata(&dest_path)?.permissions();
            if permissions.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                permissions.set_readonly(false);
                std::fs::set_permissions(&dest_path, permissions)?;
            }

            copied.push(dest_path);
        }
    }

    Ok(copied)
}

/// A collection of parsed provisioning profiles keyed by path.
#[derive(Clone, Debug, Default)]
pub struct ProvisionLibrary {
    profiles: BTreeMap<PathBuf, MobileProvisionProfile>,
    rejected: Vec<(PathBuf, String)>,
}

impl ProvisionLibrary {
    /// Load every `*.mobileprovision` file directly inside a directory.
    ///
    /// Files are parsed in parallel. A file that fails to parse is logged
    /// and skipped; see [Self::rejected()]. A directory that doesn't exist
    /// yields an empty library.
    pub fn load_directory(
        directory: &Path,
        extraction: PayloadExtraction,
    ) -> Result<Self, ProvisioningError> {
        if !directory.is_dir() {
            debug!(
                "provisioning profile library {} does not exist",
                directory.display()
            );
            return Ok(Self::default());
        }

        let mut paths = vec![];

        for entry in std::fs::read_dir(directory)? {
            let path = entry?.path();

            if is_provision_file(&path) {
                paths.push(path);
            }
        }

        let parsed = paths
            .into_par_iter()
            .map(|path| {
                let res = MobileProvisionProfile::from_path(&path, extraction);
                (path, res)
            })
            .collect::<Vec<_>>();

        let mut library = Self::default();

        for (path, res) in parsed {
            match res {
                Ok(profile) => {
                    library.insert(path, profile);
                }
                Err(e) => {
                    warn!("ignoring provisioning profile {}: {}", path.display(), e);
                    library.rejected.push((path, e.to_string()));
                }
            }
        }

        library.rejected.sort();

        Ok(library)
    }

    /// Register a profile.
    pub fn insert(
        &mut self,
        path: impl Into<PathBuf>,
        profile: MobileProvisionProfile,
    ) -> Option<MobileProvisionProfile> {
        self.profiles.insert(path.into(), profile)
    }

    /// Iterate over profiles in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &MobileProvisionProfile)> {
        self.profiles.iter().map(|(k, v)| (k.as_path(), v))
    }

    /// Obtain the profile loaded from `path`.
    pub fn get(&self, path: &Path) -> Option<&MobileProvisionProfile> {
        self.profiles.get(path)
    }

    /// Number of profiles in the library.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether the library holds no profiles.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Files that failed to parse during loading, with the reason.
    pub fn rejected(&self) -> &[(PathBuf, String)] {
        &self.rejected
    }

    /// Find the profile to sign `bundle_identifier` with.
    ///
    /// Returns `None` if neither the exact nor the wildcard phase yields a
    /// profile. The resolver is consulted at most once per profile.
    pub fn find_compatible(
        &self,
        bundle_identifier: &str,
        for_distribution: bool,
        resolver: &dyn CertificateResolver,
    ) -> Option<&Path> {
        let resolved = RefCell::new(HashMap::<PathBuf, bool>::new());

        let has_certificate = |path: &Path, profile: &MobileProvisionProfile| -> bool {
            if let Some(res) = resolved.borrow().get(path) {
                return *res;
            }

            let res = match resolver.find_certificate(profile) {
                Ok(Some(_)) => true,
                Ok(None) => {
                    debug!("no signing certificate available for {}", path.display());
                    false
                }
                Err(e) => {
                    warn!(
                        "error resolving signing certificate for {}: {}",
                        path.display(),
                        e
                    );
                    false
                }
            };

            resolved.borrow_mut().insert(path.to_path_buf(), res);
            res
        };

        let mode_allows = |profile: &MobileProvisionProfile| -> bool {
            !for_distribution || profile.is_distribution()
        };

        let exact = self.iter().find(|&(path, profile)| {
            profile.application_identifier().contains(bundle_identifier)
                && mode_allows(profile)
                && has_certificate(path, profile)
        });

        if let Some((path, _)) = exact {
            info!("selected provisioning profile {}", path.display());
            return Some(path);
        }

        let wildcard = self.iter().find(|&(path, profile)| {
            (profile.provision_name().contains("Wildcard")
                || profile.application_identifier().contains('*'))
                && mode_allows(profile)
                && has_certificate(path, profile)
        });

        if let Some((path, _)) = wildcard {
            info!("selected wildcard provisioning profile {}", path.display());
            return Some(path);
        }

        None
    }
}

/// Find a provisioning profile compatible with a bundle identifier.
///
/// Loads the library at `library_directory` and runs the matching phases.
/// If nothing matches, `fallback` is returned if it exists. The fallback is
/// not checked against the bundle identifier.
pub fn find_compatible_provision(
    bundle_identifier: &str,
    library_directory: &Path,
    for_distribution: bool,
    resolver: &dyn CertificateResolver,
    fallback: &Path,
    extraction: PayloadExtraction,
) -> Result<PathBuf, ProvisioningError> {
    let library = ProvisionLibrary::load_directory(library_directory, extraction)?;
    info!(
        "loaded {} provisioning profiles from {}",
        library.len(),
        library_directory.display()
    );

    if let Some(path) = library.find_compatible(bundle_identifier, for_distribution, resolver) {
        return Ok(path.to_path_buf());
    }

    if fallback.is_file() {
        warn!(
            "no provisioning profile matches {}; falling back to {}",
            bundle_identifier,
            fallback.display()
        );
        Ok(fallback.to_path_buf())
    } else {
        Err(ProvisioningError::NoCompatibleProvisionFound {
            bundle_identifier: bundle_identifier.to_string(),
            for_distribution,
        })
    }
}

/// Selects provisioning profiles according to a [ProvisioningConfig].
pub struct ProvisionMatcher<'a> {
    config: &'a ProvisioningConfig,
    resolver: &'a dyn CertificateResolver,
}

impl<'a> ProvisionMatcher<'a> {
    pub fn new(config: &'a ProvisioningConfig, resolver: &'a dyn CertificateResolver) -> Self {
        Self { config, resolver }
    }

    /// Path of the profile staged from a previously built app bundle.
    pub fn fallback_path(&self) -> PathBuf {
        self.config.staging_directory.join(EMBEDDED_PROVISION_NAME)
    }

    /// Copy project and engine profiles into the library.
    pub fn sync(&self) -> Result<Vec<PathBuf>, ProvisioningError> {
        let sources = [
            self.config.project_build_directory.clone(),
            self.config.engine_build_directory.clone(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        sync_provision_sources(&self.config.library_directory, &sources)
    }

    /// Sync the library, then find a profile for `bundle_identifier`.
    pub fn find_compatible_provision(
        &self,
        bundle_identifier: &str,
    ) -> Result<PathBuf, ProvisioningError> {
        self.sync()?;

        find_compatible_provision(
            bundle_identifier,
            &self.config.library_directory,
            self.config.for_distribution,
            self.resolver,
            &self.fallback_path(),
            self.config.payload_extraction,
        )
    }
}
