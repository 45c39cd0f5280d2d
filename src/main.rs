//! `scorewav [-l|--log] <score.json>+` (spec.md §6 EXTERNAL INTERFACES):
//! renders each score file to a `.wav` of the same basename alongside it.
//!
//! Grounded on the teacher's `src/main.rs`, which drove a `for` loop over
//! `env::args()` calling `render_score` per playbook path and mapped
//! failures to process exit codes; generalized here from the teacher's
//! `DruidicScore`/`Preset` pipeline to `score::load_score_from_file` ->
//! `interpreter::interpret` -> `wav::write_wav`.

use scorewav::cli::{self, ExitCode};
use scorewav::error::RenderError;
use scorewav::interpreter;
use scorewav::score;
use scorewav::wav;
use scorewav::SAMPLE_RATE;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let cli = match cli::parse_args(&args) {
        Ok(cli) => cli,
        Err(ExitCode::MissingArgument) => {
            eprintln!("usage: scorewav [-l|--log] <score.json>+");
            process::exit(ExitCode::MissingArgument as i32);
        }
        Err(_) => unreachable!("parse_args only returns MissingArgument on failure"),
    };

    if cli.log {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    for path in &cli.scores {
        if let Err(code) = render_one(path, cli.log) {
            process::exit(code as i32);
        }
    }
}

fn render_one(path: &str, log: bool) -> Result<(), ExitCode> {
    if log {
        log::info!("loading score {path}");
    }

    let parsed = score::load_score_from_file(path).map_err(|err| {
        eprintln!("{path}: {err}");
        match err {
            RenderError::Parse(_) => ExitCode::ParseFailure,
            _ => ExitCode::RenderFailure,
        }
    })?;

    if log {
        log::info!("interpreting score {path}");
    }

    let interpreted = interpreter::interpret(&parsed).map_err(|err| {
        eprintln!("{path}: {err}");
        ExitCode::RenderFailure
    })?;

    let nframes = wav::total_frames(interpreted.length_seconds, SAMPLE_RATE);
    let out_path = cli::output_path_for(path);

    if log {
        log::info!("rendering {nframes} frames to {out_path}");
    }

    wav::write_wav(&out_path, &interpreted.graph, interpreted.root, 2, nframes, SAMPLE_RATE).map_err(|err| {
        eprintln!("{path}: {err}");
        ExitCode::RenderFailure
    })?;

    Ok(())
}
