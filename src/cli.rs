//! Command-line argument parsing for the `scorewav` binary (spec.md §6).
//! Grounded on the teacher's `src/main.rs`, which walked `env::args()` by
//! hand rather than reaching for `clap` — kept here since the grammar is
//! small (one flag, N positional paths) and none of the pack's dependency
//! stacks carry an arg-parsing crate for this teacher.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    MissingArgument = -1,
    ParseFailure = -2,
    RenderFailure = 1,
}

pub struct Cli {
    pub log: bool,
    pub scores: Vec<String>,
}

pub fn parse_args(args: &[String]) -> Result<Cli, ExitCode> {
    let mut log = false;
    let mut scores = Vec::new();

    for arg in args {
        match arg.as_str() {
            "-l" | "--log" => log = true,
            path => scores.push(path.to_string()),
        }
    }

    if scores.is_empty() {
        return Err(ExitCode::MissingArgument);
    }

    Ok(Cli { log, scores })
}

/// `<dir>/<basename-without-extension>.wav` alongside the input score.
pub fn output_path_for(score_path: &str) -> String {
    let path = std::path::Path::new(score_path);
    path.with_extension("wav").to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_positional_argument_is_rejected() {
        let result = parse_args(&["--log".to_string()]);
        assert_eq!(result.unwrap_err(), ExitCode::MissingArgument);
    }

    #[test]
    fn log_flag_and_multiple_scores_parse() {
        let cli = parse_args(&["-l".to_string(), "a.json".to_string(), "b.json".to_string()]).unwrap();
        assert!(cli.log);
        assert_eq!(cli.scores, vec!["a.json", "b.json"]);
    }

    #[test]
    fn output_path_swaps_extension_for_wav() {
        assert_eq!(output_path_for("songs/demo.json"), "songs/demo.wav");
    }
}
