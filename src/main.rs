use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use codefab::agent::server::{ServerConfig, start_server};
use codefab::config::Config;

#[derive(Parser)]
#[command(name = "codefab")]
#[command(version, about = "AI project generation service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the generation server
    Serve {
        /// Port to serve on
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Path to the SQLite database (defaults to $CODEFAB_DB_PATH)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Directory for materialized project files (defaults to $CODEFAB_DATA_DIR)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Skip sandbox provisioning even when configured
        #[arg(long)]
        no_sandbox: bool,

        /// Bind on all interfaces with permissive CORS
        #[arg(long)]
        dev: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            port,
            db_path,
            data_dir,
            no_sandbox,
            dev,
        } => {
            let env = Config::from_env()?;
            let config = ServerConfig {
                port,
                db_path: db_path.unwrap_or_else(|| env.db_path.clone()),
                data_dir: data_dir.unwrap_or_else(|| env.data_dir.clone()),
                no_sandbox,
                dev_mode: dev,
            };
            start_server(config, env).await
        }
    }
}
