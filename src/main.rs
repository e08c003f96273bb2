use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use voxflow::app;
use voxflow::cli::{Cli, Commands};
use voxflow::config::{clamp_silence_threshold, Config};
use voxflow::session::SessionOptions;

fn main() -> Result<()> {
    voxflow::audio::capture::suppress_audio_warnings();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        None => {
            let config = load_config(cli.config.as_deref())?;
            let config = apply_cli_overrides(config, &cli);
            let options = SessionOptions {
                input_wav: cli.input,
                tts_program: cli.tts,
                mute: cli.mute,
                translator_program: None,
            };
            app::run(config, options, cli.quiet, cli.verbose)?;
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/voxflow/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

fn apply_cli_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(device) = &cli.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(target) = &cli.target {
        config.translation.target_language = target.clone();
    }
    if let Some(threshold) = cli.threshold {
        config.orchestrator.silence_threshold_ms = clamp_silence_threshold(threshold);
    }
    config
}

fn list_audio_devices() -> Result<()> {
    let devices = voxflow::audio::capture::list_devices()?;
    if devices.is_empty() {
        println!("{}", "No audio input devices found".yellow());
        return Ok(());
    }
    println!("{}", "Available audio input devices:".bold());
    for device in devices {
        println!("  {}", device);
    }
    Ok(())
}
