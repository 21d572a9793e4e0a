mod domain;
mod infrastructure;
mod presentation;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use domain::settings::SettingsService;
use infrastructure::bluetooth::connection::Peer;
use presentation::app::RemoteApp;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "bluetooth-remote")]
#[command(about = "Drive an HC-05 robot from the terminal", long_about = None)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and drive the robot from the keyboard
    Connect {
        /// Device path (e.g. /dev/rfcomm0) or tcp://host:port; defaults to the last peer
        peer: Option<String>,
    },
    /// Connect, send a command script, then disconnect
    Send {
        peer: String,
        /// Wire letters ("FFLR") or labels ("forward,left")
        commands: String,
        /// Pause between commands in milliseconds
        #[arg(long, default_value_t = 250)]
        gap_ms: u64,
    },
    /// Print the effective settings
    Config {
        /// Print only the settings file location
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_service = match cli.config {
        Some(path) => SettingsService::with_path(path),
        None => SettingsService::new()?,
    };

    let _logging_guard =
        infrastructure::logging::init_logger(&settings_service.get().log_settings)
            .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
            .ok();

    tracing::info!("Starting Bluetooth Remote");

    match cli.command {
        Commands::Connect { peer } => {
            let peer = match peer.or_else(|| settings_service.get().last_peer.clone()) {
                Some(peer) => peer,
                None => anyhow::bail!("No peer given and no previous peer in settings"),
            };
            let peer: Peer = peer.parse()?;
            let mut app = RemoteApp::new(Arc::new(Mutex::new(settings_service)));
            app.run_interactive(&peer).await?;
        }
        Commands::Send {
            peer,
            commands,
            gap_ms,
        } => {
            let peer: Peer = peer.parse()?;
            let commands = presentation::input::parse_script(&commands)?;
            let mut app = RemoteApp::new(Arc::new(Mutex::new(settings_service)));
            app.run_script(&peer, &commands, Duration::from_millis(gap_ms))
                .await?;
        }
        Commands::Config { path } => {
            if path {
                println!("{}", settings_service.path().display());
            } else {
                let json = serde_json::to_string_pretty(settings_service.get())
                    .context("Failed to serialize settings")?;
                println!("{}", json);
            }
        }
    }

    Ok(())
}
