// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Configuration for provisioning profile selection.

Configuration is assembled from layered sources. Later sources override
earlier ones:

1. Built-in defaults.
2. The user config file (`mprovision/mprovision.toml` in the platform
   config directory).
3. `mprovision.toml` in the current directory.
4. Explicitly registered TOML files or strings.
5. `MPROVISION_` environment variables.

TOML sources are keyed by profile. Settings normally live in a `[default]`
table.
*/

use {
    crate::{error::ProvisioningError, locator::PayloadExtraction},
    figment::{
        providers::{Env, Format, Toml},
        Figment,
    },
    log::debug,
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
};

/// Settings controlling where profiles come from and how they are chosen.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProvisioningConfig {
    /// Directory holding the provisioning profile library.
    pub library_directory: PathBuf,

    /// Project build directory searched for profiles to sync into the library.
    pub project_build_directory: Option<PathBuf>,

    /// Engine build directory searched for profiles to sync into the library.
    pub engine_build_directory: Option<PathBuf>,

    /// Directory of the staged app bundle.
    ///
    /// Its `embedded.mobileprovision` is the last resort profile.
    pub staging_directory: PathBuf,

    pub for_distribution: bool,

    pub payload_extraction: PayloadExtraction,

    /// PEM files holding private signing keys.
    pub certificate_pem_files: Vec<PathBuf>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            library_directory: default_library_directory(),
            project_build_directory: None,
            engine_build_directory: None,
            staging_directory: PathBuf::from("."),
            for_distribution: false,
            payload_extraction: PayloadExtraction::default(),
            certificate_pem_files: vec![],
        }
    }
}

/// The directory Apple tooling installs provisioning profiles into.
pub fn default_library_directory() -> PathBuf {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|p| p.join("Library"))
    } else {
        dirs::data_local_dir().map(|p| p.join("Apple Computer"))
    };

    base.unwrap_or_default()
        .join("MobileDevice")
        .join("Provisioning Profiles")
}

#[derive(Clone)]
pub struct ConfigBuilder {
    loader: Figment,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            loader: Figment::new(),
        }
    }
}

impl ConfigBuilder {
    pub fn with_user_config_file(mut self) -> Self {
        if let Some(base) = dirs::config_dir() {
            let p = base.join("mprovision").join("mprovision.toml");
            debug!("registering user config file: {}", p.display());

            self.loader = self.loader.merge(Toml::file(p).nested());
        }

        self
    }

    pub fn with_cwd_config_file(mut self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            let p = cwd.join("mprovision.toml");
            debug!("registering cwd config file: {}", p.display());

            self.loader = self.loader.merge(Toml::file(p).nested());
        }

        self
    }

    /// Register `MPROVISION_` environment variables.
    ///
    /// `MPROVISION_LIBRARY_DIRECTORY` sets `library-directory` and so on.
    pub fn with_env_prefix(mut self) -> Self {
        debug!("registering MPROVISION_ environment variable config source");
        let env = Env::prefixed("MPROVISION_")
            .map(|key| key.as_str().to_ascii_lowercase().replace('_', "-").into())
            .profile(self.loader.profile().to_string());

        self.loader = self.loader.merge(env);
        self
    }

    pub fn toml_file(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        debug!("registering custom config file: {}", path.display());
        self.loader = self.loader.merge(Toml::file(path).nested());
        self
    }

    pub fn toml_string(mut self, data: &str) -> Self {
        debug!("registering TOML string config data");
        self.loader = self.loader.merge(Toml::string(data).nested());
        self
    }

    pub fn profile(mut self, profile: String) -> Self {
        self.loader = self.loader.select(profile);
        self
    }

    pub fn config(self) -> Result<ProvisioningConfig, ProvisioningError> {
        Ok(self.loader.extract()?)
    }
}
