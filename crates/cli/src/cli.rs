use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::{Path, PathBuf};

/// session-replay: feed recorded sensor samples through the recording engine
///
/// Samples are read as JSON lines (`{"metric":"power","value":212.0,
/// "timestamp_ms":1000,"source_id":"pm"}`) and replayed against a simulated
/// clock, so an hour-long ride replays in moments. The resulting submission
/// payload is written as JSON.
///
/// Send SIGUSR1 to log the current metrics snapshot, SIGUSR2 to skip to the
/// next plan step, and Ctrl-C to finish the session early.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// JSON-lines file of sensor samples.
    #[arg(short, long, value_parser = validate_file, required_unless_present = "dump_config")]
    pub samples: Option<PathBuf>,

    /// Structured workout plan (JSON) to execute during the replay.
    #[arg(short, long, value_parser = validate_file)]
    pub plan: Option<PathBuf>,

    /// Path to configuration file.
    #[arg(short, long, value_parser = validate_file)]
    pub config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub dump_config: bool,

    /// Chunk database to record into. Overrides `persistence.store_path`.
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Keep the session's chunks after the submission is built.
    #[arg(long)]
    pub keep_chunks: bool,

    /// Where to write the submission payload. Defaults to stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Profile the session is recorded for.
    #[arg(long, default_value = "replay")]
    pub profile: String,

    /// Activity category, e.g. `ride` or `run`.
    #[arg(long, default_value = "ride")]
    pub activity: String,

    /// Functional threshold power in watts.
    #[arg(long, value_parser = validate_positive)]
    pub ftp: Option<f64>,

    /// Threshold heart rate in bpm.
    #[arg(long, value_parser = validate_positive)]
    pub threshold_hr: Option<f64>,

    /// Maximum heart rate in bpm.
    #[arg(long, value_parser = validate_positive)]
    pub max_hr: Option<f64>,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

/// Thresholds must be positive numbers.
#[inline(always)]
fn validate_positive(value: &str) -> Result<f64, String> {
    let value: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err("Threshold must be greater than zero".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_config_needs_no_samples() {
        let cli = Cli::try_parse_from(["session-replay", "--dump-config"]).unwrap();
        assert!(cli.dump_config);
        assert!(cli.samples.is_none());
    }

    #[test]
    fn samples_are_required_otherwise() {
        assert!(Cli::try_parse_from(["session-replay", "--ftp", "250"]).is_err());
    }

    #[test]
    fn thresholds_must_be_positive() {
        assert!(validate_positive("250").is_ok());
        assert!(validate_positive("0").is_err());
        assert!(validate_positive("fast").is_err());
    }
}
