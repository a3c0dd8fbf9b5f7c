//! `vocalis`: command-line host for the pitch engine.
//!
//! ```text
//! vocalis listen [--device NAME] [--reference HZ] [--range NAME]
//! vocalis analyze <file.wav> [--json] [--range NAME]
//! vocalis devices
//! vocalis config [--save]
//! ```

mod analyze;
mod listen;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use vocalis_core::{list_input_devices, PitchEngine};

use settings::{default_settings_path, load_settings, save_settings};

#[derive(Parser, Debug)]
#[command(name = "vocalis", version, about = "Live vocal pitch detection and tuning")]
struct Cli {
    /// Settings file (defaults to the platform data directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture from a microphone and print pitches as they stabilize
    Listen {
        /// Input device name (overrides the saved preference)
        #[arg(short, long)]
        device: Option<String>,
        /// A4 reference frequency in Hz (400-480)
        #[arg(short, long)]
        reference: Option<f32>,
        /// Fix the voice range instead of detecting it (Bass, Tenor, Alto, Soprano, Full Range)
        #[arg(long)]
        range: Option<String>,
    },
    /// Analyze a WAV file offline
    Analyze {
        file: PathBuf,
        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,
        /// Fix the voice range instead of detecting it
        #[arg(long)]
        range: Option<String>,
    },
    /// List audio input devices
    Devices,
    /// Print the effective settings
    Config {
        /// Write the (normalized) settings back to the settings file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vocalis=info")),
        )
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    info!(path = %settings_path.display(), "settings loaded");

    match cli.command {
        Command::Listen {
            device,
            reference,
            range,
        } => {
            let engine = Arc::new(
                PitchEngine::new(settings.analysis.clone()).context("invalid analysis settings")?,
            );
            listen::run(
                engine,
                listen::ListenOptions {
                    device: device.or(settings.preferred_input_device.clone()),
                    reference,
                    voice_range: range,
                },
            )
            .await
        }
        Command::Analyze { file, json, range } => {
            let audio = analyze::read_wav_mono(&file)?;
            let name = file.display().to_string();
            let report =
                analyze::analyze_samples(&name, &audio, settings.analysis.clone(), range.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                analyze::print_report(&report);
            }
            Ok(())
        }
        Command::Devices => {
            let devices = list_input_devices();
            if devices.is_empty() {
                println!("no input devices found");
            }
            for d in devices {
                println!(
                    "{} {}  ({} ch @ {} Hz)",
                    if d.is_default { "*" } else { " " },
                    d.name,
                    d.channels,
                    d.default_sample_rate
                );
            }
            Ok(())
        }
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if save {
                save_settings(&settings_path, &settings)
                    .with_context(|| format!("writing {}", settings_path.display()))?;
                println!("saved to {}", settings_path.display());
            }
            Ok(())
        }
    }
}
