use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "spikesort",
    version,
    about = "Threshold-based spike sorting and correlation analysis",
    long_about = "Detect and sort spikes in multichannel recordings (WAV or JSON session snapshots)\n\
                  by amplitude thresholds, then compute correlograms, histograms and averages.\n\
                  Markers are read from <stem>-events.txt next to a WAV recording."
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
    /// Show recording metadata and marker summary
    Info(InfoArgs),
    /// Validate a recording file
    Validate(ValidateArgs),
    /// Sort spikes by threshold and write the clusters
    Sort(SortArgs),
    /// Sort spikes and compute correlograms, histograms and averages
    Analyze(AnalyzeArgs),
    /// Sort many recordings, optionally with several threshold sets
    Batch(BatchArgs),
}

#[derive(Args)]
pub struct InfoArgs {
    /// Recording file (WAV or JSON snapshot)
    #[arg(long)]
    pub file: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Recording file path
    #[arg(long)]
    pub file: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Signal conditioning applied before sorting
#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// Notch frequency in Hz (e.g. 50 or 60)
    #[arg(long)]
    pub notch: Option<f64>,

    /// Notch quality factor
    #[arg(long, default_value_t = 30.0)]
    pub notch_q: f64,

    /// Lower band cutoff in Hz (highpass, or bandpass with --high)
    #[arg(long)]
    pub low: Option<f64>,

    /// Upper band cutoff in Hz (lowpass, or bandpass with --low)
    #[arg(long)]
    pub high: Option<f64>,

    /// Butterworth order of the band filter
    #[arg(long, default_value_t = 2)]
    pub order: usize,
}

/// Channel, window and threshold selection shared by the sorting commands
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Channel numbers starting at 1 (default: all)
    #[arg(long, num_args = 1..)]
    pub channels: Vec<usize>,

    /// Time windows, e.g. "0 to 10 and m1 to m2" (default: whole recording)
    #[arg(long)]
    pub interval: Option<String>,

    /// Subthreshold ratio of the peak hysteresis
    #[arg(long, default_value_t = 0.8)]
    pub subthresh: f64,

    /// Artifact level; detections beyond it are excluded from every cluster
    #[arg(long, allow_hyphen_values = true)]
    pub cutoff: Option<f64>,
}

#[derive(Args)]
pub struct SortArgs {
    /// Recording file (WAV or JSON snapshot)
    #[arg(long)]
    pub file: String,

    /// Thresholds, e.g. "700 1200" or "-300, 500" (default: 1)
    #[arg(long, allow_hyphen_values = true)]
    pub thresholds: Option<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Write per-cluster spike-time CSVs into this directory
    #[arg(long, env = "SPIKESORT_OUTPUT_DIR")]
    pub export_dir: Option<String>,

    /// Save the session (recording, clusters, history) as a JSON snapshot
    #[arg(long)]
    pub snapshot: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Recording file (WAV or JSON snapshot)
    #[arg(long)]
    pub file: String,

    /// Thresholds, e.g. "700 1200" or "-300, 500" (default: 1)
    #[arg(long, allow_hyphen_values = true)]
    pub thresholds: Option<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Correlogram interval after each reference event, in ms
    #[arg(long, default_value_t = 100.0)]
    pub interval_ms: f64,

    /// Correlogram interval before each reference event, in ms
    #[arg(long, default_value_t = 0.0)]
    pub preinterval_ms: f64,

    /// Also correlate every cluster against this marker key
    #[arg(long, allow_hyphen_values = true)]
    pub marker: Option<i64>,

    /// Event-related average window before each marker, in seconds
    #[arg(long, default_value_t = 0.5)]
    pub era_pre: f64,

    /// Event-related average window after each marker, in seconds
    #[arg(long, default_value_t = 1.0)]
    pub era_post: f64,

    /// Spike waveform window before each peak, in ms
    #[arg(long, default_value_t = 5.0)]
    pub waveform_pre_ms: f64,

    /// Spike waveform window after each peak, in ms
    #[arg(long, default_value_t = 10.0)]
    pub waveform_post_ms: f64,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Write spike-time and event-average CSVs into this directory
    #[arg(long, env = "SPIKESORT_OUTPUT_DIR")]
    pub export_dir: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args, Clone)]
pub struct BatchArgs {
    /// Glob pattern for input files (e.g. "data/*.wav")
    #[arg(long, conflicts_with_all = ["files", "plan"])]
    pub glob: Option<String>,

    /// Explicit list of input files
    #[arg(long, num_args = 1.., conflicts_with = "plan")]
    pub files: Option<Vec<String>>,

    /// JSON plan file listing jobs with per-file overrides
    #[arg(long)]
    pub plan: Option<String>,

    /// Threshold sets; "[700 800;1200]" runs every file once per set
    #[arg(long, allow_hyphen_values = true)]
    pub thresholds: Option<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Output directory for per-job JSON and CSV files (default: JSONL on stdout)
    #[arg(long, env = "SPIKESORT_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    /// Number of parallel jobs (default: number of CPUs)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Keep going after a failed job
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// List the jobs without running them
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}
