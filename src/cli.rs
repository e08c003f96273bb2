//! Command-line interface for voxflow
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Live speech translation for the terminal
#[derive(Parser, Debug)]
#[command(name = "voxflow", version, about = "Live speech translation for the terminal")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress live hypothesis output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: live hypotheses, -vv: channel diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (see `voxflow devices`)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Translation target language code (e.g., it, pt, de)
    #[arg(long, short = 't', value_name = "LANG")]
    pub target: Option<String>,

    /// Inactivity threshold before a segment is cut. Examples: 500ms, 1s, 2s500ms
    #[arg(long, value_name = "DURATION", value_parser = parse_threshold_ms)]
    pub threshold: Option<u32>,

    /// Read audio from a 16-bit PCM WAV file instead of the microphone
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// External TTS command for playback (default: espeak-ng)
    #[arg(long, value_name = "PROGRAM")]
    pub tts: Option<String>,

    /// Disable audible playback of translations
    #[arg(long)]
    pub mute: bool,
}

/// Parse a threshold duration string into milliseconds.
///
/// Supports any duration format accepted by `humantime` plus bare numbers,
/// which are taken as milliseconds.
pub fn parse_threshold_ms(s: &str) -> Result<u32, String> {
    let s = s.trim();
    // Bare number → milliseconds
    if let Ok(ms) = s.parse::<u32>() {
        return Ok(ms);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_millis().min(u32::MAX as u128) as u32)
        .map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let cli = Cli::parse_from(["voxflow"]);
        assert!(cli.command.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.threshold.is_none());
    }

    #[test]
    fn parses_devices_subcommand() {
        let cli = Cli::parse_from(["voxflow", "devices"]);
        assert!(matches!(cli.command, Some(Commands::Devices)));
    }

    #[test]
    fn threshold_accepts_bare_millis_and_durations() {
        assert_eq!(parse_threshold_ms("750"), Ok(750));
        assert_eq!(parse_threshold_ms("1s"), Ok(1000));
        assert_eq!(parse_threshold_ms("2s 500ms"), Ok(2500));
        assert!(parse_threshold_ms("soon").is_err());
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::parse_from([
            "voxflow",
            "--target",
            "pt",
            "--threshold",
            "1s",
            "--mute",
            "-vv",
        ]);
        assert_eq!(cli.target.as_deref(), Some("pt"));
        assert_eq!(cli.threshold, Some(1000));
        assert!(cli.mute);
        assert_eq!(cli.verbose, 2);
    }
}
