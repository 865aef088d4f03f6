//! Progress state commands: reset, status and export

use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use super::{Cli, CliError, OutputFormat, PartitionArgs};
use crate::fetcher::riot_config::EloScope;
use crate::identifier::PartitionKey;
use crate::output::csv::write_export;
use crate::output::jsonl::JsonlSink;
use crate::output::{PartitionLayout, RecordSink};
use crate::resume::{PartitionLock, ProgressSnapshot, ProgressStore};

/// Arguments of `reset`
#[derive(Parser, Debug)]
pub struct ResetArgs {
    /// Partition selection
    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Delete the progress file entirely (collected ids and counters too)
    #[arg(long, conflicts_with_all = ["scope", "tier"])]
    pub all: bool,

    /// Forget only units discovered in this part of the ladder
    #[arg(long, conflicts_with = "tier")]
    pub scope: Option<EloScope>,

    /// Forget only units discovered in these tiers (e.g. MASTER)
    #[arg(long, value_delimiter = ',')]
    pub tier: Vec<String>,
}

impl ResetArgs {
    /// Execute the reset command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let partition = self.partition.partition();
        let layout = cli.layout(partition);
        let mut lock = PartitionLock::open(&layout.dir())?;
        let _held = lock.try_hold()?;
        let store = ProgressStore::new(layout.progress_path());

        let outcome = if self.all {
            let deleted = store.delete()?;
            json!({ "partition": partition.to_string(), "deleted": deleted })
        } else if let Some(tiers) = self.selected_tiers() {
            let cleared = store.clear_tiers(&tiers)?;
            info!(partition = %partition, ?tiers, cleared, "Tier progress cleared");
            json!({ "partition": partition.to_string(), "tiers": tiers, "units_cleared": cleared })
        } else {
            let snapshot = store.reset_progress()?;
            json!({
                "partition": partition.to_string(),
                "units_cleared": "all",
                "collected_kept": snapshot.collected().len(),
            })
        };

        match cli.output_format {
            OutputFormat::Json => println!("{outcome}"),
            OutputFormat::Human => {
                if self.all {
                    println!("{partition}: progress file deleted");
                } else if let Some(cleared) = outcome["units_cleared"].as_u64() {
                    println!("{partition}: {cleared} unit(s) will be visited again");
                } else {
                    println!("{partition}: all units will be visited again");
                }
            }
        }
        Ok(())
    }

    /// Tiers to clear, `None` for a full progress reset
    fn selected_tiers(&self) -> Option<Vec<String>> {
        if !self.tier.is_empty() {
            return Some(self.tier.iter().map(|t| t.trim().to_uppercase()).collect());
        }
        match self.scope {
            Some(EloScope::All) | None => None,
            Some(scope) => Some(scope.tiers()),
        }
    }
}

/// Arguments of `status`
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Partition selection
    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Report every partition found under the data root
    #[arg(long, conflicts_with = "api_key_index")]
    pub all_partitions: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let partitions = if self.all_partitions {
            PartitionLayout::discover(&cli.data_dir)
        } else {
            vec![self.partition.partition()]
        };

        let mut reports = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let layout = cli.layout(partition);
            let path = layout.progress_path();
            let snapshot = if path.exists() {
                Some(ProgressStore::inspect(&path)?)
            } else {
                None
            };
            reports.push((partition, snapshot));
        }

        match cli.output_format {
            OutputFormat::Json => {
                let value: Vec<_> = reports
                    .iter()
                    .map(|(partition, snapshot)| status_json(*partition, snapshot.as_ref()))
                    .collect();
                println!("{}", serde_json::Value::Array(value));
            }
            OutputFormat::Human => {
                if reports.is_empty() {
                    println!("No partitions under {}", cli.data_dir.display());
                }
                for (partition, snapshot) in &reports {
                    print_status(*partition, snapshot.as_ref());
                }
            }
        }
        Ok(())
    }
}

fn status_json(partition: PartitionKey, snapshot: Option<&ProgressSnapshot>) -> serde_json::Value {
    match snapshot {
        None => json!({ "partition": partition.to_string(), "started": false }),
        Some(s) => json!({
            "partition": partition.to_string(),
            "started": true,
            "processed_units": s.processed().len(),
            "collected": s.collected().len(),
            "cursor": { "page": s.cursor().page, "unit_index": s.cursor().unit_index },
            "counters": s.counters(),
            "discovery": s.discovery_counters(),
            "created_at": s.created_at().to_rfc3339(),
            "updated_at": s.updated_at().to_rfc3339(),
        }),
    }
}

fn print_status(partition: PartitionKey, snapshot: Option<&ProgressSnapshot>) {
    let Some(s) = snapshot else {
        println!("{partition}: not started");
        return;
    };
    println!("{partition}:");
    println!("  Processed units: {}", s.processed().len());
    println!("  Collected ids:   {}", s.collected().len());
    println!("  Cursor:          {}", s.cursor());
    println!("  Detail requests: {}", s.counters());
    println!("  Discovery:       {}", s.discovery_counters());
    println!("  Updated:         {}", s.updated_at().to_rfc3339());
}

/// Arguments of `export`
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Partition selection
    #[command(flatten)]
    pub partition: PartitionArgs,

    /// CSV destination (defaults to matches.csv in the partition directory)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

impl ExportArgs {
    /// Execute the export command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let partition = self.partition.partition();
        let layout = cli.layout(partition);
        let records = layout.records_path();
        if !records.exists() {
            return Err(CliError::InvalidArgument(format!(
                "no records stored for {partition} ({})",
                records.display()
            )));
        }

        let mut lock = PartitionLock::open(&layout.dir())?;
        let _held = lock.try_hold()?;
        let sink = JsonlSink::open(&records)?;
        let rows = sink.export_snapshot()?;
        let output = self.output.clone().unwrap_or_else(|| layout.export_path());
        let written = write_export(&output, &rows)?;
        info!(partition = %partition, rows = written, path = %output.display(), "Export written");

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                json!({
                    "partition": partition.to_string(),
                    "rows": written,
                    "path": output.display().to_string(),
                })
            ),
            OutputFormat::Human => {
                println!("{partition}: {written} row(s) written to {}", output.display())
            }
        }
        Ok(())
    }
}
