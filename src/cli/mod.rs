use crate::data::graph::AssemblerConfig;
use crate::data::mapping::UnmappedPolicy;
use crate::data::{CancerType, DatasetPaths, DEFAULT_MAX_LINKS};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// drivergcn: driver/passenger gene classification with graph convolutions
#[derive(Parser, Debug)]
#[command(name = "drivergcn")]
#[command(about = "Driver gene classification on gene interaction graphs")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assemble the gene graph, export the mapping and draw the graph
    Build(BuildArgs),

    /// Train the classifier on the labeled genes
    Train(TrainArgs),

    /// Classify every gene with a trained model
    Predict(PredictArgs),
}

/// Input tables and graph assembly options shared by all subcommands
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory containing one sub-directory per cancer type
    #[arg(short, long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Cancer cohort to load
    #[arg(short, long, value_enum, default_value_t = CancerType::Blca)]
    pub cancer: CancerType,

    /// Number of link rows to use (0 = all)
    #[arg(long, default_value_t = DEFAULT_MAX_LINKS)]
    pub max_links: usize,

    /// Add the reverse of every link
    #[arg(long)]
    pub undirected: bool,

    /// Z-score standardize feature columns
    #[arg(long)]
    pub standardize: bool,

    /// Skip genes missing from the feature table instead of failing
    #[arg(long)]
    pub lenient: bool,
}

impl DataArgs {
    /// Locations of the cohort's tables
    pub fn paths(&self) -> DatasetPaths {
        DatasetPaths::for_cancer(&self.data_dir, self.cancer)
    }

    /// Graph assembly settings
    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            max_links: self.max_links,
            undirected: self.undirected,
            standardize: self.standardize,
            unmapped: if self.lenient {
                UnmappedPolicy::Skip
            } else {
                UnmappedPolicy::Error
            },
        }
    }
}

/// Build arguments
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Output file for the gene identifier mapping
    #[arg(short, long, default_value = crate::data::MAPPING_FILE)]
    pub mapping_out: PathBuf,

    /// Draw the graph to this file (.svg or .png)
    #[arg(short, long)]
    pub graph_plot: Option<PathBuf>,
}

/// Training arguments
#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Output directory for model, mapping and history
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// Training configuration file (JSON); command-line values override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of training epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log the loss every N epochs
    #[arg(long)]
    pub log_every: Option<usize>,

    /// Render the embedding every N epochs into <output>/snapshots
    #[arg(long)]
    pub snapshot_every: Option<usize>,

    /// Save a checkpoint every N epochs into <output>/checkpoints
    #[arg(long)]
    pub checkpoint_every: Option<usize>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Prediction output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

/// Prediction arguments
#[derive(Args, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Model file written by `train`
    #[arg(short, long, required = true)]
    pub model: PathBuf,

    /// Gene mapping the model was trained with
    #[arg(long)]
    pub mapping: Option<PathBuf>,

    /// Output file for predictions
    #[arg(short, long, default_value = "predictions.csv")]
    pub output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Number of most confident predicted drivers to log (0 = none)
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity; `RUST_LOG` takes precedence
pub fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
