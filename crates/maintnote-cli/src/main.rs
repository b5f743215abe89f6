//! maintnote CLI
//!
//! Parse a circuit maintenance notification and print the resulting records.
//!
//! ```bash
//! maintnote --data-file notification.ics
//! maintnote --data-file notification.eml --data-type email --provider-type ntt -vv
//! ```

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use maintnote_core::{
    init_data, init_data_from_email, registry, NotificationData, ParserCatalog, Provider,
    ProviderRegistry, GENERIC_PROVIDER,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "maintnote")]
#[command(about = "Parse circuit maintenance notifications")]
#[command(version)]
struct Cli {
    /// Notification to parse
    #[arg(long)]
    data_file: PathBuf,

    /// Fragment tag of the file; `email` decomposes a raw email
    #[arg(long, default_value = "ical")]
    data_type: String,

    /// Provider name or sender address
    #[arg(long, default_value = GENERIC_PROVIDER)]
    provider_type: String,

    /// YAML provider profiles to use instead of the built-in set
    #[arg(long)]
    profiles: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_data(cli: &Cli) -> Result<NotificationData> {
    let raw = fs::read(&cli.data_file)
        .with_context(|| format!("Failed to read {}", cli.data_file.display()))?;

    if cli.data_type == "email" {
        init_data_from_email(&raw).context("Failed to decompose email")
    } else {
        Ok(init_data(&cli.data_type, raw))
    }
}

fn load_provider(cli: &Cli) -> Result<Provider> {
    let provider = match &cli.profiles {
        Some(path) => {
            let yaml = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let custom = ProviderRegistry::from_yaml(&yaml, &ParserCatalog::new())
                .with_context(|| format!("Failed to load profiles from {}", path.display()))?;
            custom.lookup(&cli.provider_type)?.clone()
        }
        None => registry()?.lookup(&cli.provider_type)?.clone(),
    };
    Ok(provider)
}

fn run(cli: &Cli) -> Result<()> {
    let data = load_data(cli)?;
    let provider = load_provider(cli)?;
    tracing::info!(
        provider = %provider.name(),
        data_types = ?data.data_types(),
        "Parsing notification"
    );

    let maintenances = provider.get_maintenances(&data)?;
    for (index, maintenance) in maintenances.iter().enumerate() {
        println!("Circuit Maintenance Notification #{}", index);
        println!("{}", maintenance.to_json()?);
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["maintnote", "--data-file", "n.ics"]);
        assert_eq!(cli.data_type, "ical");
        assert_eq!(cli.provider_type, GENERIC_PROVIDER);
        assert_eq!(cli.verbose, 0);
        assert!(cli.profiles.is_none());
    }

    #[test]
    fn test_verbose_count() {
        let cli = Cli::parse_from(["maintnote", "--data-file", "n.eml", "--data-type", "email", "-vv"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.data_type, "email");
    }

    #[test]
    fn test_load_provider_from_builtin() {
        let cli = Cli::parse_from(["maintnote", "--data-file", "n.ics", "--provider-type", "Telia"]);
        assert_eq!(load_provider(&cli).unwrap().name(), "telia");
    }
}
