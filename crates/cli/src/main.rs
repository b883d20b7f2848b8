mod config;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::ParleyConfig;

/// Parley question-and-answer marketplace.
#[derive(Parser)]
#[command(name = "parley", version, about = "Parley question-and-answer marketplace")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP JSON API
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
        /// Path to a parley.toml config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Use the local sandbox payment gateway instead of the HTTP one
        #[arg(long)]
        sandbox: bool,
        /// TLS certificate file (PEM). Requires the `tls` feature.
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// TLS private key file (PEM). Requires the `tls` feature.
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Validate a parley.toml config file
    CheckConfig {
        /// Path to the config file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Serve {
            port,
            config,
            sandbox,
            tls_cert,
            tls_key,
        } => {
            if tls_cert.is_some() != tls_key.is_some() {
                eprintln!("error: --tls-cert and --tls-key must both be provided");
                process::exit(1);
            }
            let mut settings = match ParleyConfig::load(config.as_deref()) {
                Ok(settings) => settings,
                Err(e) => {
                    eprintln!("error: {}", e);
                    process::exit(1);
                }
            };
            if let Some(port) = port {
                settings.server.port = port;
            }
            let options = serve::ServeOptions {
                config: settings,
                sandbox,
                tls_cert,
                tls_key,
            };
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("error: failed to create tokio runtime: {}", e);
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(options)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        Commands::CheckConfig { file } => cmd_check_config(&file),
    }
}

fn cmd_check_config(file: &std::path::Path) {
    match ParleyConfig::from_file(file) {
        Ok(config) => {
            println!("{}: ok", file.display());
            println!("  port: {}", config.server.port);
            println!("  currency: {}", config.market.currency);
            println!(
                "  minimum transfer: {}",
                config.market.min_transfer_amount
            );
            println!(
                "  gateway: {}",
                config
                    .market
                    .gateway
                    .base_url
                    .as_deref()
                    .unwrap_or("(not configured)")
            );
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `parley=info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parley=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}
