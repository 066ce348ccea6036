use clap::{Args, Subcommand};
use engine_config::settings::ConfigOverrides;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Apply the configured mutation to every selected document
    Run {
        #[command(flatten)]
        target: ConfigArgs,

        #[command(flatten)]
        overrides: RunOverrides,

        #[arg(
            long,
            help = "Print the full report as JSON instead of the summary"
        )]
        json: bool,
    },
    /// Resolve the selection and report how many documents it covers
    Count {
        #[command(flatten)]
        target: ConfigArgs,

        #[arg(long, help = "Read identifiers from this file instead of the configured selection")]
        id_file: Option<PathBuf>,
    },
    /// Group an exported JSON array by a field and list duplicated values
    Dedupe {
        #[arg(long, help = "JSON file holding an array of documents")]
        input: PathBuf,

        #[arg(long, help = "Field to group documents by")]
        field: String,

        #[arg(long, default_value = ".", help = "Directory the analysis files are written to")]
        output_dir: PathBuf,
    },
    /// Open a session against the database and ping it
    TestConn {
        /// Connection string; falls back to the MONGO_* environment variables
        #[arg(long)]
        uri: Option<String>,

        #[arg(long, help = "Load additional environment variables from this file")]
        env_file: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(long, help = "Run file path (JSON)")]
    pub config: PathBuf,

    #[arg(long, help = "Load additional environment variables from this file")]
    pub env_file: Option<PathBuf>,
}

#[derive(Args, Default)]
pub struct RunOverrides {
    #[arg(long, help = "Documents per batch")]
    pub batch_size: Option<usize>,

    #[arg(long, help = "Maximum number of batches processed at once")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Compute and report every change without writing")]
    pub dry_run: bool,

    #[arg(long, help = "Exit with status 2 when any document failed")]
    pub fail_on_error: bool,

    #[arg(long, help = "Directory run reports are written to")]
    pub report_dir: Option<PathBuf>,

    #[arg(
        long,
        help = "Select documents from this id file, e.g. the failed_ids.txt of a previous run"
    )]
    pub id_file: Option<PathBuf>,
}

impl From<RunOverrides> for ConfigOverrides {
    fn from(args: RunOverrides) -> Self {
        ConfigOverrides {
            batch_size: args.batch_size,
            concurrency: args.concurrency,
            dry_run: args.dry_run,
            fail_on_error: args.fail_on_error,
            report_dir: args.report_dir,
            id_file: args.id_file,
        }
    }
}
