//! Batch renderer
//!
//! Loads a project file and exports one pattern or the whole song.
//!
//! ```text
//! render_project <project.json> <output.wav|output.mp3> [--pattern <id> | --song]
//!                [--samples <dir>] [--config <config.ron>] [--metronome]
//! ```

use beatgrid::audio::export::{self, ExportFormat, ExportSource, ExportTarget};
use beatgrid::config::SessionConfig;
use beatgrid::project::{ProjectLoadOptions, ProjectManager};
use beatgrid::sampler::SampleCache;
use beatgrid::sequencer::timeline::{Swing, Tempo};
use beatgrid::store::PatternBank;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

struct Args {
    project: PathBuf,
    output: PathBuf,
    target: ExportTarget,
    samples: Option<PathBuf>,
    config: Option<PathBuf>,
    metronome: bool,
}

const USAGE: &str = "usage: render_project <project.json> <output.wav|output.mp3> \
[--pattern <id> | --song] [--samples <dir>] [--config <config.ron>] [--metronome]";

fn parse_args() -> Result<Args, String> {
    let mut positional = Vec::new();
    let mut target = ExportTarget::Song;
    let mut samples = None;
    let mut config = None;
    let mut metronome = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--pattern" => {
                let id = args.next().ok_or("--pattern needs an id")?;
                target = ExportTarget::Pattern(id);
            }
            "--song" => target = ExportTarget::Song,
            "--samples" => samples = Some(PathBuf::from(args.next().ok_or("--samples needs a directory")?)),
            "--config" => config = Some(PathBuf::from(args.next().ok_or("--config needs a path")?)),
            "--metronome" => metronome = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if other.starts_with("--") => return Err(format!("unknown option {other}\n{USAGE}")),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    match (positional.next(), positional.next(), positional.next()) {
        (Some(project), Some(output), None) => Ok(Args {
            project,
            output,
            target,
            samples,
            config,
            metronome,
        }),
        _ => Err(USAGE.to_string()),
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::load_default()?,
    };
    let sample_root = args.samples.clone().unwrap_or_else(|| {
        args.project
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| config.sample_root.clone())
    });

    let manager = ProjectManager::new(&sample_root);
    let state = manager.load_project(&args.project, &ProjectLoadOptions::default())?;
    let bank = PatternBank::new(state.patterns);
    let arrangement = state.arrangement;

    let mut samples = SampleCache::new();
    let wanted = export::referenced_samples(&bank, &arrangement, &args.target);
    let failures = samples.load_missing(&wanted, &sample_root);
    for (key, e) in &failures {
        warn!(sample = %key, error = %e, "sample renders as silence");
    }
    info!(loaded = samples.len(), failed = failures.len(), "samples ready");

    let mut settings = config.export.clone();
    settings.include_metronome |= args.metronome;
    let format = ExportFormat::from_path(&args.output).unwrap_or_default();
    let source = ExportSource {
        patterns: &bank,
        arrangement: &arrangement,
        tempo: Tempo::new(state.bpm),
        swing: Swing::new(state.swing),
        samples: &samples,
    };

    let mut next_report = 0.25f32;
    let mut progress = |fraction: f32| {
        if fraction >= next_report {
            info!(percent = (fraction * 100.0).round() as u32, "rendering");
            next_report += 0.25;
        }
    };
    let output = export::export_to_file(
        &source,
        &args.target,
        format,
        &settings,
        &args.output,
        &mut progress,
    )?;
    info!(
        path = %args.output.display(),
        seconds = output.audio.duration_seconds(),
        peak = output.audio.peak(),
        bytes = output.bytes.len(),
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "render failed");
            ExitCode::FAILURE
        }
    }
}
