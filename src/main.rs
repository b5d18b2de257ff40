use std::path::PathBuf;

use chatbridge::common::config::{self, ConfigOverrides};
use chatbridge::server::runtime;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatbridge")]
#[command(about = "Multi-tenant messaging bridge", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge HTTP server
    Serve {
        /// Listen port (overrides config)
        #[arg(long)]
        port: Option<u16>,
        /// Path to a config file (defaults to the platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Session storage directory (overrides config)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve {
        port: None,
        config: None,
        data_dir: None,
    });

    match command {
        Commands::Serve {
            port,
            config: config_path,
            data_dir,
        } => {
            let loaded = config::load_config(config_path.as_deref())?;
            let config = config::apply_overrides(
                loaded,
                &ConfigOverrides {
                    port,
                    data_dir,
                    api_key: None,
                },
            );
            runtime::serve(config).await
        }
    }
}
