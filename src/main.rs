// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use etabla::{audio, catalog::AssetCatalog, config, cycles::CycleRegistry};

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=tabla and tanpura practice player

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/etabla
ExecStart=/usr/local/bin/etabla start "$ETABLA_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=etabla.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A looping tabla and tanpura practice player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the taals, keys and tempos in a manifest or recording directory.
    Catalog {
        /// A JSON manifest or a directory of recordings.
        path: String,
        /// The extension of the recordings.
        #[arg[short, long, default_value = "flac"]]
        extension: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Start will start the player and read commands from the keyboard.
    Start {
        /// The path to the player config.
        player_path: String,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog { path, extension } => {
            let catalog = AssetCatalog::load(&PathBuf::from(&path), &extension)?;

            if catalog.is_empty() {
                println!("No recordings found in {}.", path.as_str());
                return Ok(());
            }

            let registry = CycleRegistry::new();
            println!("Taals (recordings: {}):", catalog.len());
            print!("{}", catalog);

            let unknown: Vec<&str> = catalog
                .cycles()
                .into_iter()
                .filter(|cycle| registry.beat_count(cycle).is_none())
                .collect();
            if !unknown.is_empty() {
                println!("\nNo beat count for: {}", unknown.join(", "));
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Start { player_path } => {
            let mut controller = config::init_controller(&PathBuf::from(&player_path))?;
            controller.join().await?;
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE);
        }
    }

    Ok(())
}
