use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "srkf",
    version,
    about = "Square-root Kalman filter bank for 14-channel EEG recordings",
    long_about = "Run one of nine square-root Kalman filter variants over a 14-channel EEG CSV,\n\
                  split by a winning-channel mask, and report amplitudes and Welch spectra.\n\
                  Engine settings come from --config (or $SRKF_CONFIG) and per-flag overrides."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Filter one recording with one variant
    Run(RunArgs),
    /// Filter many recordings with many variants
    Batch(BatchArgs),
    /// Show version, engine defaults and artifact directory
    Info(InfoArgs),
    /// List the nine filter variants
    Variants(VariantsArgs),
    /// Validate a recording without filtering it
    Validate(ValidateArgs),
    /// Signed-rank tests between saved spectra of consecutive sessions
    Wilcoxon(WilcoxonArgs),
}

/// Engine configuration: a JSON file plus flag overrides
#[derive(Args, Clone, Default)]
pub struct ConfigArgs {
    /// Engine configuration file (JSON)
    #[arg(long, env = "SRKF_CONFIG")]
    pub config: Option<String>,

    /// Sampling rate in Hz
    #[arg(long)]
    pub fs: Option<f64>,

    /// Welch segment length in samples
    #[arg(long)]
    pub segment: Option<usize>,

    /// Welch overlap fraction in [0, 1)
    #[arg(long)]
    pub overlap: Option<f64>,

    /// Process noise standard deviation
    #[arg(long)]
    pub process_noise: Option<f64>,

    /// Measurement noise variance
    #[arg(long)]
    pub measurement_noise: Option<f64>,

    /// Abort a run after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<f64>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Input recording (CSV with the 14 EEG channel columns)
    #[arg(long)]
    pub file: String,

    /// Filter variant, e.g. Potter_GramSchmidt
    #[arg(long, default_value = "Potter_GramSchmidt")]
    pub variant: String,

    /// Winning-channel mask: 14 comma-separated 0/1 flags
    #[arg(long)]
    pub mask: String,

    #[command(flatten)]
    pub engine: ConfigArgs,

    /// Write CSV tables and the JSON report into this directory
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Session identifier (default: random UUID)
    #[arg(long)]
    pub session_id: Option<String>,

    /// Report file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern selecting input recordings
    #[arg(long, conflicts_with = "files")]
    pub glob: Option<String>,

    /// Explicit list of input recordings
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<String>>,

    /// Variants to run on every file ("all" for the nine)
    #[arg(long, default_values_t = vec!["all".to_string()], num_args = 1..)]
    pub variants: Vec<String>,

    /// Winning-channel mask: 14 comma-separated 0/1 flags
    #[arg(long)]
    pub mask: String,

    #[command(flatten)]
    pub engine: ConfigArgs,

    /// Write per-session artifacts into this directory
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Parallel sessions (default: rayon's thread count)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Keep going after a failed session
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Print the session list and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Emit the summary as JSON instead of a table
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Write a WC signed-rank table per variant across files (needs --output-dir)
    #[arg(long, default_value_t = false)]
    pub wilcoxon: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct VariantsArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Input recording
    #[arg(long)]
    pub file: String,

    /// Sampling rate used to build the time axis
    #[arg(long)]
    pub fs: Option<f64>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct WilcoxonArgs {
    /// Glob pattern selecting saved `*_welch.csv` tables (sorted by name)
    #[arg(long, conflicts_with = "files")]
    pub glob: Option<String>,

    /// Saved spectrum tables in session order
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<String>>,

    /// Power column to compare: Original, All, WC or NWC
    #[arg(long, default_value = "WC")]
    pub series: String,

    /// Comparison table (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Output as JSON instead of CSV
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Expand "all" and split comma-separated entries into variant names.
pub fn expand_variants(requested: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for entry in requested.iter().flat_map(|s| s.split(',')) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if entry.eq_ignore_ascii_case("all") {
            names.extend(srkf_rs::VariantId::all().map(|v| v.name()));
        } else {
            names.push(entry.to_string());
        }
    }
    let mut seen = std::collections::HashSet::new();
    names.retain(|n| seen.insert(n.to_ascii_lowercase()));
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_all() {
        let names = expand_variants(&["all".to_string()]);
        assert_eq!(names.len(), 9);
        assert_eq!(names[0], "Potter_GramSchmidt");
    }

    #[test]
    fn test_expand_comma_list_dedups() {
        let names = expand_variants(&[
            "Potter_Givens,Carlson_Givens".to_string(),
            "potter_givens".to_string(),
        ]);
        assert_eq!(names, vec!["Potter_Givens", "Carlson_Givens"]);
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "srkf",
            "run",
            "--file",
            "a.csv",
            "--mask",
            "1,0,1,0,1,0,1,0,1,0,1,0,1,0",
            "--segment",
            "64",
        ])
        .unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.variant, "Potter_GramSchmidt");
                assert_eq!(args.engine.segment, Some(64));
            }
            _ => panic!("expected run"),
        }
    }
}
