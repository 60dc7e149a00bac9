//! face_tone — interactive entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use face_tone::app;
use face_tone::config::{AppConfig, ProviderKind};

/// Face and hand gesture tone controller
#[derive(Parser)]
#[command(name = "face_tone", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "FACE_TONE_CONFIG")]
    config: Option<PathBuf>,

    /// Initial pitch multiplier (0.5–2.0)
    #[arg(long)]
    pitch: Option<f32>,

    /// Play back a JSON-lines landmark recording instead of simulating
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Restart the recording when it ends
    #[arg(long = "loop")]
    loop_replay: bool,

    /// Artificial detection latency in milliseconds
    #[arg(long)]
    latency_ms: Option<u64>,

    /// Start with audio enabled instead of waiting for a click
    #[arg(long)]
    no_unlock: bool,

    /// Run without a window
    #[arg(long)]
    headless: bool,

    /// How long a headless run lasts
    #[arg(long, default_value = "10")]
    duration_secs: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,face_tone=info",
        1 => "info,face_tone=debug,tone_map=debug",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Layer command-line flags over the file settings.  Values are taken as
/// given; `validate` judges them the same way as file values.
fn apply_overrides(cfg: &mut AppConfig, cli: &Cli) {
    if let Some(p) = cli.pitch {
        cfg.mapping.pitch_multiplier = p;
    }
    if let Some(path) = &cli.replay {
        cfg.provider.kind = ProviderKind::Replay;
        cfg.provider.replay_path = Some(path.clone());
    }
    if cli.loop_replay {
        cfg.provider.loop_replay = true;
    }
    if let Some(ms) = cli.latency_ms {
        cfg.provider.latency_ms = ms;
    }
    if cli.no_unlock {
        cfg.audio.require_unlock = false;
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    apply_overrides(&mut cfg, &cli);
    cfg.validate().context("invalid settings")?;

    tracing::info!(
        provider = ?cfg.provider.kind,
        hand = cfg.mapping.hand.name(),
        pitch = cfg.mapping.pitch_multiplier,
        fps = cfg.video.fps,
        "starting"
    );

    if cli.headless {
        let stats = app::run_headless(&cfg, Duration::from_secs(cli.duration_secs))?;
        println!(
            "cycles {}  mapped {}  held {}  failed {}",
            stats.cycles, stats.mapped, stats.held, stats.failed
        );
        Ok(())
    } else {
        app::run(&cfg).context("visualizer")
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn overridden(args: &[&str]) -> AppConfig {
        let cli = Cli::parse_from(std::iter::once("face_tone").chain(args.iter().copied()));
        let mut cfg = AppConfig::default();
        apply_overrides(&mut cfg, &cli);
        cfg
    }

    #[test]
    fn out_of_range_pitch_flag_is_rejected() {
        assert!(overridden(&["--pitch", "3.5"]).validate().is_err());
        assert!(overridden(&["--pitch", "0.1"]).validate().is_err());
        assert!(overridden(&["--pitch", "NaN"]).validate().is_err());
    }

    #[test]
    fn in_range_flags_override_file_values() {
        let cfg = overridden(&["--pitch", "1.5", "--replay", "take.jsonl", "--loop", "--latency-ms", "40", "--no-unlock"]);
        cfg.validate().unwrap();
        assert_eq!(cfg.mapping.pitch_multiplier, 1.5);
        assert_eq!(cfg.provider.kind, ProviderKind::Replay);
        assert_eq!(cfg.provider.replay_path.as_deref(), Some(std::path::Path::new("take.jsonl")));
        assert!(cfg.provider.loop_replay);
        assert_eq!(cfg.provider.latency_ms, 40);
        assert!(!cfg.audio.require_unlock);
    }
}
