use anyhow::Result;
use clap::Parser;
use common::cli::{CommonArgs, CommonCommands, utils};
use exporter::CacheOptions;

#[derive(Parser)]
#[command(name = "promexport")]
#[command(about = "Prometheus to monitoring backend exporter: configuration tooling")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: CommonCommands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    // Version needs no configuration.
    if cli.command == CommonCommands::Version {
        println!("promexport {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = utils::load_config(cli.common.config.as_ref())?;
    utils::handle_common_command(&cli.command, &config)?;

    if cli.command == CommonCommands::Validate {
        let options = CacheOptions::from(&config.export);
        tracing::debug!(?options, "series cache options");
    }
    Ok(())
}
