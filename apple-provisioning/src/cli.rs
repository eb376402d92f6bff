// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        certificate::{sha256_hex, PemCertificateResolver},
        config::{ConfigBuilder, ProvisioningConfig},
        error::ProvisioningError,
        library::{find_compatible_provision, ProvisionMatcher},
        locator::PayloadExtraction,
        profile::{MobileProvisionProfile, UNKNOWN_VALUE},
    },
    clap::{ArgAction, Args, Parser, Subcommand},
    log::{info, LevelFilter},
    std::{io::Write, path::PathBuf},
};

pub struct Context {
    pub config: ProvisioningConfig,
}

pub trait CliCommand {
    /// Runs the command.
    fn run(&self, context: &Context) -> Result<(), ProvisioningError>;
}

#[derive(Args)]
struct ProfileSource {
    /// Path to a .mobileprovision file
    path: PathBuf,

    /// Read the embedded.mobileprovision of an .ipa archive instead
    #[arg(long)]
    ipa: bool,
}

impl ProfileSource {
    fn load(&self, context: &Context) -> Result<MobileProvisionProfile, ProvisioningError> {
        let extraction = context.config.payload_extraction;

        if self.ipa {
            MobileProvisionProfile::from_ipa(&self.path, extraction)
        } else {
            MobileProvisionProfile::from_path(&self.path, extraction)
        }
    }
}

#[derive(Parser)]
struct Show {
    #[command(flatten)]
    source: ProfileSource,
}

impl CliCommand for Show {
    fn run(&self, context: &Context) -> Result<(), ProvisioningError> {
        let profile = self.source.load(context)?;

        println!("name: {}", profile.provision_name());
        println!(
            "team: {}",
            profile
                .document()
                .get_string("TeamName")?
                .unwrap_or(UNKNOWN_VALUE)
        );
        println!(
            "application identifier prefix: {}",
            profile
                .application_identifier_prefix()
                .unwrap_or(UNKNOWN_VALUE)
        );
        println!("application identifier: {}", profile.application_identifier());
        println!("debuggable: {}", profile.is_debuggable());
        println!("distribution: {}", profile.is_distribution());

        println!("devices:");
        for device in profile.provisioned_device_ids() {
            println!("  - {}", device);
        }

        println!("certificates:");
        for cert in profile.developer_certificates() {
            println!(
                "  - subject: {}",
                cert.subject_common_name()
                    .unwrap_or_else(|| UNKNOWN_VALUE.to_string())
            );
            println!("    sha256: {}", sha256_hex(cert)?);
            println!("    not after: {}", cert.validity_not_after().to_rfc3339());
        }

        Ok(())
    }
}

#[derive(Parser)]
struct Entitlements {
    #[command(flatten)]
    source: ProfileSource,

    /// Bundle identifier the entitlements are generated for
    #[arg(long, value_name = "ID")]
    bundle_id: String,

    /// File to write entitlements to. Defaults to stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

impl CliCommand for Entitlements {
    fn run(&self, context: &Context) -> Result<(), ProvisioningError> {
        let profile = self.source.load(context)?;
        let text = profile.entitlements_text(&self.bundle_id)?;

        if let Some(output) = &self.output {
            info!("writing entitlements to {}", output.display());
            std::fs::write(output, text.as_bytes())?;
        } else {
            std::io::stdout().write_all(text.as_bytes())?;
        }

        Ok(())
    }
}

#[derive(Parser)]
struct Find {
    /// Bundle identifier to find a provisioning profile for
    #[arg(long, value_name = "ID")]
    bundle_id: String,

    /// Only consider profiles usable for distribution
    #[arg(long)]
    distribution: bool,

    /// Provisioning profile library directory
    #[arg(long, value_name = "DIR")]
    library: Option<PathBuf>,

    /// Staging directory holding a fallback embedded.mobileprovision
    #[arg(long, value_name = "DIR")]
    staging: Option<PathBuf>,

    /// PEM file containing private signing keys
    ///
    /// Can be specified multiple times. Adds to files defined in configuration.
    #[arg(long = "pem-file", value_name = "FILE")]
    pem_files: Vec<PathBuf>,

    /// Don't copy profiles from build directories into the library
    #[arg(long)]
    no_sync: bool,
}

impl Find {
    fn effective_config(&self, context: &Context) -> ProvisioningConfig {
        let mut config = context.config.clone();

        if self.distribution {
            config.for_distribution = true;
        }
        if let Some(library) = &self.library {
            config.library_directory = library.clone();
        }
        if let Some(staging) = &self.staging {
            config.staging_directory = staging.clone();
        }
        config
            .certificate_pem_files
            .extend(self.pem_files.iter().cloned());

        config
    }
}

impl CliCommand for Find {
    fn run(&self, context: &Context) -> Result<(), ProvisioningError> {
        if self.bundle_id.is_empty() {
            return Err(ProvisioningError::CliBadArgument(
                "--bundle-id must not be empty".into(),
            ));
        }

        let config = self.effective_config(context);

        let resolver = PemCertificateResolver::from_paths(&config.certificate_pem_files)?;
        if resolver.key_count() == 0 {
            info!("no private keys loaded; only the fallback profile can be selected");
        }

        let matcher = ProvisionMatcher::new(&config, &resolver);

        let path = if self.no_sync {
            find_compatible_provision(
                &self.bundle_id,
                &config.library_directory,
                config.for_distribution,
                &resolver,
                &matcher.fallback_path(),
                config.payload_extraction,
            )?
        } else {
            matcher.find_compatible_provision(&self.bundle_id)?
        };

        println!("{}", path.display());

        Ok(())
    }
}

#[derive(Subcommand)]
enum Subcommands {
    /// Print information about a provisioning profile
    Show(Show),

    /// Print the entitlements to sign an app with
    ///
    /// Wildcard application identifiers are replaced with the given bundle
    /// identifier.
    Entitlements(Entitlements),

    /// Find the provisioning profile to sign a bundle identifier with
    ///
    /// Profiles from the configured project and engine build directories are
    /// first copied into the library. Profiles whose application identifier
    /// contains the bundle identifier are preferred over wildcard profiles.
    /// A profile is only selected if a signing key for one of its
    /// certificates is available.
    Find(Find),
}

impl Subcommands {
    fn as_cli_command(&self) -> &dyn CliCommand {
        match self {
            Subcommands::Show(c) => c,
            Subcommands::Entitlements(c) => c,
            Subcommands::Find(c) => c,
        }
    }
}

/// Inspect iOS provisioning profiles and select one for code signing
#[derive(Parser)]
#[command(author, version, arg_required_else_help = true)]
struct Cli {
    /// Explicit configuration file to load.
    ///
    /// If provided, the default configuration files are not loaded.
    ///
    /// Can be specified multiple times. Files are merged in the order given.
    #[arg(short = 'C', long = "config", global = true)]
    config_path: Vec<PathBuf>,

    /// Configuration profile to load.
    ///
    /// If not specified, the implicit "default" profile is loaded.
    #[arg(short = 'P', long, global = true)]
    profile: Option<String>,

    /// Decode the CMS envelope of profiles instead of scanning for the plist
    #[arg(long, global = true)]
    cms: bool,

    /// Increase logging verbosity. Can be specified multiple times
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Subcommands,
}

impl Cli {
    pub fn config_builder(&self) -> ConfigBuilder {
        let mut config = ConfigBuilder::default();

        config = if self.config_path.is_empty() {
            config.with_user_config_file().with_cwd_config_file()
        } else {
            for path in &self.config_path {
                config = config.toml_file(path);
            }

            config
        };

        if let Some(profile) = &self.profile {
            config = config.profile(profile.to_string());
        }

        // Environment variables override everything.
        config = config.with_env_prefix();

        config
    }
}

pub fn main_impl() -> Result<(), ProvisioningError> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    let mut config = cli.config_builder().config()?;
    if cli.cms {
        config.payload_extraction = PayloadExtraction::Cms;
    }

    let context = Context { config };

    cli.command.as_cli_command().run(&context)
}
