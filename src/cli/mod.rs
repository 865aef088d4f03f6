//! CLI command implementations

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::identifier::PartitionKey;
use crate::output::PartitionLayout;

pub mod error;
pub mod harvest;
pub mod platforms;
pub mod state;
pub mod validate;

pub use error::CliError;
pub use harvest::HarvestArgs;
pub use platforms::PlatformsCommand;
pub use state::{ExportArgs, ResetArgs, StatusArgs};
pub use validate::ValidateCommand;

/// Default data root
pub const DEFAULT_DATA_DIR: &str = "data";

/// Match Harvester CLI
#[derive(Parser, Debug)]
#[command(name = "match-harvester")]
#[command(about = "Harvest ranked match records within the API's rate limits", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Data root; each partition gets its own directory below it
    #[arg(long, global = true, env = "HARVEST_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// File layout of `partition` under the data root
    pub fn layout(&self, partition: PartitionKey) -> PartitionLayout {
        PartitionLayout::new(self.data_dir.clone(), partition)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Harvest match records (resumes from the last snapshot)
    Harvest(HarvestArgs),

    /// Forget processed units so they are visited again
    Reset(ResetArgs),

    /// Show progress counters of a partition
    Status(StatusArgs),

    /// Export stored records as CSV
    Export(ExportArgs),

    /// List supported platforms and their routing regions
    Platforms(PlatformsCommand),

    /// Validate match ids or progress files
    Validate(ValidateCommand),
}

/// Selects the partition a command works on
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct PartitionArgs {
    /// Use only the API key at this index, in its own partition
    #[arg(long)]
    pub api_key_index: Option<usize>,
}

impl PartitionArgs {
    /// Selected partition
    pub fn partition(&self) -> PartitionKey {
        PartitionKey::from_index(self.api_key_index)
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}
