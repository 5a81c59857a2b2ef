use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use polydeploy_tools::{config, logging, Config, Environment, ProcessEnv, Template};

#[derive(Parser)]
#[command(name = "polydeploy")]
#[command(about = "Compiler and network configuration for contract builds and deployments")]
struct Cli {
    /// Template file (defaults to $POLYDEPLOY_TEMPLATE, ./deploy.toml, then built-in)
    #[arg(short, long, global = true)]
    template: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration with secrets redacted
    Show {
        /// Resolve only this network
        #[arg(short, long)]
        network: Option<String>,
    },
    /// Write the resolved configuration as JSON for the build tool
    Export {
        /// Resolve only this network
        #[arg(short, long)]
        network: Option<String>,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration
    Check {
        /// Resolve only this network
        #[arg(short, long)]
        network: Option<String>,
    },
    /// List the environment variables the template reads
    Vars,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Before logging, so RUST_LOG may come from .env
    config::load_dotenv();
    logging::init(cli.verbose);

    let template = cli.template.as_deref();

    match cli.command {
        Commands::Show { network } => {
            let config = resolve(template, network.as_deref())?;
            config.print_summary();
            Ok(())
        }
        Commands::Export { network, output } => {
            let config = resolve(template, network.as_deref())?;
            let json = config.to_json().context("serializing configuration")?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json + "\n")
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "configuration exported");
                }
                None => println!("{}", json),
            }
            Ok(())
        }
        Commands::Check { network } => {
            let config = resolve(template, network.as_deref())?;
            let names: Vec<&str> = config.network_names().collect();
            let compilers: Vec<&str> = config
                .compilers
                .iter()
                .map(|c| c.version.as_str())
                .collect();
            println!(
                "Configuration OK: compiler {}, networks: {}",
                compilers.join(", "),
                names.join(", ")
            );
            Ok(())
        }
        Commands::Vars => {
            let template = Template::locate(template, &ProcessEnv).context("loading template")?;
            for var in template.env_vars() {
                let state = if ProcessEnv.non_empty(var).is_some() {
                    "set"
                } else {
                    "missing"
                };
                println!("{:<28} {}", var, state);
            }
            Ok(())
        }
    }
}

fn resolve(template: Option<&Path>, network: Option<&str>) -> Result<Config> {
    let config = match (template, network) {
        (None, None) => Config::load()?,
        _ => Config::load_with(template, network)?,
    };
    Ok(config)
}
