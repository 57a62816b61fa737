use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands that inspect the configuration without exporting anything
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CommonCommands {
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Log level implied by the CLI flags. `RUST_LOG` takes precedence.
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));

        // A subscriber may already be installed, e.g. by a test harness.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration");
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Render configuration in human-readable or JSON format
    pub fn render_config(config: &Configuration, json: bool) -> Result<String> {
        if json {
            return serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON");
        }

        let export = &config.export;
        let mut out = String::new();
        out.push_str("Exporter Configuration:\n");
        out.push_str("=======================\n");
        out.push_str(&format!("Metric prefix: {}\n", export.metric_prefix));
        out.push_str(&format!("Max label count: {}\n", export.max_label_count));
        out.push_str(&format!("Refresh interval: {:?}\n", export.refresh_interval));
        out.push_str(&format!("Refresh jitter: {:?}\n", export.refresh_jitter));
        out.push_str(&format!("GC interval: {:?}\n", export.gc_interval));
        out.push_str(&format!("Max batch size: {}\n", export.max_batch_size));
        if export.external_labels.is_empty() {
            out.push_str("External labels: none\n");
        } else {
            out.push_str("External labels:\n");
            for (name, value) in &export.external_labels {
                out.push_str(&format!("  {name}={value}\n"));
            }
        }
        Ok(out)
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        tracing::info!("Validating configuration...");
        config.validate().context("Invalid configuration")?;
        tracing::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle a command that only inspects the configuration
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<()> {
        match command {
            CommonCommands::Config { json } => {
                print!("{}", render_config(config, *json)?);
                if *json {
                    println!();
                }
            }
            CommonCommands::Validate => validate_config(config)?,
            CommonCommands::Version => println!("{}", version_info()),
        }
        Ok(())
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
