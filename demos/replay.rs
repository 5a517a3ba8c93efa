use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crosstrack::{Config, Frame, FrameProcessor, ManualClock};

/// Replays a detection dump through the tracker and prints the events
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON lines: {"timestamp": ms, "detections": [...]} per frame
    input: PathBuf,

    /// Pipeline configuration (JSON); defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also print the track list of every frame
    #[arg(long)]
    tracks: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    let clock = Arc::new(ManualClock::new(0));
    let mut processor = FrameProcessor::new(config, Vec::new()).with_clock(clock.clone());

    let input = File::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;

    for (lineno, line) in BufReader::new(input).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let frame: Frame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(err) => {
                eprintln!("line {}: skipped, {}", lineno + 1, err);
                continue;
            }
        };

        clock.set(frame.timestamp);
        let output = processor.process_frame(&frame, None);

        if args.tracks {
            println!("{}", serde_json::to_string(&output.tracks)?);
        }

        for event in &output.events {
            println!("{}", serde_json::to_string(event)?);
        }
    }

    Ok(())
}
