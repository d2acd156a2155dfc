//! CLI interface for Myco

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use myco::synth::Waveform;

/// Play a polyphonic synth from the computer keyboard
#[derive(Parser)]
#[command(name = "myco")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults apply when it does not exist)
    #[arg(short, long, global = true, default_value = "myco.yaml")]
    pub config: PathBuf,

    /// Log every note and scheduling decision
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play from the computer keyboard
    Play,

    /// Play A4 through the output device
    TestTone {
        /// Waveform to use instead of the configured one
        #[arg(short, long)]
        waveform: Option<Waveform>,
    },

    /// Render a note script to a WAV file
    Record {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Steps of NOTES:MS, e.g. "C4:400 E4:400 -:200 C4+E4+G4:1200"
        #[arg(short, long, default_value = "C4:400 E4:400 G4:400 -:200 C4+E4+G4:1200")]
        script: String,

        /// Waveform to use instead of the configured one
        #[arg(short, long)]
        waveform: Option<Waveform>,
    },

    /// List available audio output devices
    Devices,

    /// Show the keyboard layout and controls
    Keys,

    /// Validate a configuration file
    Check,

    /// Generate an example configuration file
    Init,
}
