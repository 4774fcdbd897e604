//! voicekey - play a virtual keyboard with your voice
//!
//! Subcommands:
//! - `voicekey listen` - Capture the microphone and print note events; record sessions
//! - `voicekey replay <file>` - Print the playback schedule of a saved session
//! - `voicekey print-config` - Print the default configuration as TOML

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use voicekey_core::{EngineConfig, NoteEventKind};

mod console;
mod listen;
mod sessions;

#[derive(Parser)]
#[command(name = "voicekey")]
#[command(about = "Voice-driven virtual keyboard")]
#[command(version)]
struct Cli {
    /// Log filter when RUST_LOG is unset (e.g. "info", "voicekey_core=debug")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen to the microphone and turn the voice into notes
    Listen {
        /// TOML configuration file; defaults are used for missing keys
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory completed recordings are written to
        #[arg(long, default_value = "sessions")]
        sessions_dir: PathBuf,

        /// Override the configured sensitivity
        #[arg(short, long)]
        sensitivity: Option<f32>,

        /// Override the configured microphone gain
        #[arg(short, long)]
        gain: Option<f32>,
    },

    /// Print the playback schedule of a saved session
    Replay {
        /// Session JSON file
        file: PathBuf,
    },

    /// Print the default configuration
    PrintConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Listen {
            config,
            sessions_dir,
            sensitivity,
            gain,
        } => {
            let mut config = match config {
                Some(path) => EngineConfig::load(&path)?,
                None => EngineConfig::default(),
            };
            if let Some(sensitivity) = sensitivity {
                config.sensitivity = sensitivity;
            }
            if let Some(gain) = gain {
                config.gain = gain;
            }
            config.validate()?;
            listen::run(config, &sessions_dir)?;
        }
        Commands::Replay { file } => {
            replay(&file)?;
        }
        Commands::PrintConfig => {
            print!("{}", EngineConfig::default().to_toml()?);
        }
    }

    Ok(())
}

fn replay(path: &Path) -> Result<()> {
    let session = sessions::load_session(path)?;
    println!(
        "session {} recorded {} ({} notes, {:.2}s)",
        session.id(),
        session.timestamp().format("%Y-%m-%d %H:%M:%S UTC"),
        session.notes().len(),
        session.duration()
    );
    if let Some(asset) = session.audio_asset() {
        println!("audio: {}", asset);
    }

    let events = session
        .playback_events()
        .with_context(|| format!("invalid note in {}", path.display()))?;
    for event in events {
        let verb = match event.kind {
            NoteEventKind::Attack => "attack ",
            NoteEventKind::Release => "release",
        };
        println!(
            "{:>9.3}s  {}  {:<4} {:>8.2} Hz",
            event.time,
            verb,
            event.label(),
            event.pitch.frequency()
        );
    }
    Ok(())
}
