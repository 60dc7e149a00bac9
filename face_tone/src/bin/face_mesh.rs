//! face_mesh — draws tracked face landmarks, nothing else.
//!
//! Detection runs inline once per window frame: the next frame is only
//! requested after the previous detection returned.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use face_tone::frames::Frame;
use face_tone::provider::{LandmarkProvider, ProviderOptions, ReplayProvider, SimProvider};
use face_tone::visualizer::{MeshView, OVERLAY_H, OVERLAY_W};
use tone_map::HandSide;

/// Face-mesh landmark viewer
#[derive(Parser)]
#[command(name = "face_mesh", version, about)]
struct Cli {
    /// Show a JSON-lines recording instead of the simulated face
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
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

fn run(cli: Cli) -> anyhow::Result<()> {
    // One face, iris refinement on.
    let options = ProviderOptions { max_faces: 1, refine_landmarks: true, ..ProviderOptions::default() };

    let (sim_tx, sim_rx) = mpsc::channel();
    let mut provider: Box<dyn LandmarkProvider> = match &cli.replay {
        Some(path) => Box::new(
            ReplayProvider::open(path, options, true)
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(SimProvider::new(sim_rx, options, HandSide::Right)),
    };

    let mut view = MeshView::new()?;
    let t0 = Instant::now();
    let mut seq = 0u64;

    loop {
        let (inputs, quit) = view.poll_input();
        if quit || !view.is_open() {
            break;
        }
        for input in inputs {
            let _ = sim_tx.send(input);
        }

        let frame = Frame::blank(seq, OVERLAY_W as u32, OVERLAY_H as u32, t0.elapsed());
        let result = match provider.detect(&frame) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(seq, error = %e, "detection failed");
                Default::default()
            }
        };
        let points = result.face.as_ref().map_or(0, Vec::len);
        view.render(&result, &format!("{} {} POINTS", provider.name(), points))?;
        seq += 1;
    }

    tracing::info!(frames = seq, "face mesh closed");
    Ok(())
}
