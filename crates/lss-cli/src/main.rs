//! `lss`: inspect plugins and data sources, convert sources to flat binary
//! files, and bin a source column into a histogram.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::{
    convert::{self, ConvertArgs},
    histogram::{self, HistogramArgs},
    inspect::{self, InspectArgs},
    plugins::{self, PluginsArgs},
};
use lss_core::LssError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(name = "lss", version, about = "Large-scale-structure data toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered data source and storage plugins with their arguments.
    Plugins(PluginsArgs),
    /// Describe the columns and size of a data source.
    Inspect(InspectArgs),
    /// Histogram a source column across a worker team and store the counts.
    Histogram(HistogramArgs),
    /// Copy source columns into a flat binary file.
    Convert(ConvertArgs),
}

// RUST_LOG wins over the configured filter. Logs go to stderr so that a
// result written to stdout stays parseable.
fn init_logging(fallback: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback.unwrap_or("info")));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn run(cli: Cli) -> Result<(), LssError> {
    match cli.command {
        Command::Histogram(args) => {
            let config = args.resolve()?;
            init_logging(config.log_filter.as_deref());
            histogram::run(&config)
        }
        Command::Plugins(args) => {
            init_logging(None);
            plugins::run(&args)
        }
        Command::Inspect(args) => {
            init_logging(None);
            inspect::run(&args)
        }
        Command::Convert(args) => {
            init_logging(None);
            convert::run(&args)
        }
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {}", err.class(), err.info().message);
            if let Some(hint) = &err.info().hint {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}
