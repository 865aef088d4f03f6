//! Harvest command implementation

use clap::Parser;
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};

use super::{Cli, CliError, OutputFormat, PartitionArgs};
use crate::fetcher::riot::RiotSource;
use crate::fetcher::riot_config::{EloScope, DEFAULT_MAX_PAGES};
use crate::filter::{AcceptAll, CategoryFilter, QueueFilter};
use crate::harvester::config::{
    DEFAULT_BATCH_PAUSE_SECS, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_IDS_PER_UNIT,
    DEFAULT_REFRESH_HOURS, DEFAULT_SNAPSHOT_EVERY, DEFAULT_UNITS_PER_BATCH, MAX_IDS_PER_UNIT,
};
use crate::harvester::{BudgetTracker, HarvestConfig, Harvester, RunSummary};
use crate::identifier::PartitionKey;
use crate::output::jsonl::JsonlSink;
use crate::resume::{PartitionLock, ProgressStore};
use crate::shutdown::SharedShutdown;

/// Arguments of `harvest`
#[derive(Parser, Debug)]
pub struct HarvestArgs {
    /// Platform to harvest (e.g. kr, euw1, na1)
    #[arg(long, env = "HARVEST_PLATFORM", default_value = "kr")]
    pub platform: String,

    /// API key(s); repeat the flag or pass a comma-separated list
    #[arg(
        long = "api-key",
        env = "RIOT_API_KEYS",
        value_delimiter = ',',
        hide_env_values = true
    )]
    pub api_keys: Vec<String>,

    /// Partition selection
    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Run one independent harvester per API key, concurrently
    #[arg(long, conflicts_with = "api_key_index")]
    pub all_keys: bool,

    /// Ladder scope: all, apex or diamond
    #[arg(long, default_value = "all")]
    pub elo: EloScope,

    /// Ceiling on diamond ladder pages
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: u32,

    /// Units processed per batch
    #[arg(long, default_value_t = DEFAULT_UNITS_PER_BATCH)]
    pub units_per_batch: usize,

    /// Candidate match ids requested per unit
    #[arg(
        long,
        default_value_t = DEFAULT_IDS_PER_UNIT,
        value_parser = clap::value_parser!(u32).range(1..=MAX_IDS_PER_UNIT as i64)
    )]
    pub ids_per_unit: u32,

    /// Persist progress after this many units
    #[arg(long, default_value_t = DEFAULT_SNAPSHOT_EVERY)]
    pub snapshot_every: usize,

    /// Re-process units older than this many hours (0 = never)
    #[arg(long, default_value_t = DEFAULT_REFRESH_HOURS)]
    pub refresh_hours: u64,

    /// Keep sweeping until interrupted
    #[arg(long)]
    pub continuous: bool,

    /// Pause between batches in continuous mode, in seconds
    #[arg(long, default_value_t = DEFAULT_BATCH_PAUSE_SECS)]
    pub batch_pause_secs: u64,

    /// Timeout of a single remote call, in seconds
    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    pub call_timeout_secs: u64,

    /// Keep records of every queue, not only ranked solo/duo
    #[arg(long)]
    pub all_queues: bool,

    /// Forget processed units before starting (collected ids are kept)
    #[arg(long)]
    pub reset: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl HarvestArgs {
    /// Tunables for each harvester
    pub fn harvest_config(&self) -> HarvestConfig {
        HarvestConfig::default()
            .with_units_per_batch(self.units_per_batch)
            .with_ids_per_unit(self.ids_per_unit)
            .with_snapshot_every(self.snapshot_every)
            .with_refresh_hours(self.refresh_hours)
            .with_continuous(self.continuous)
            .with_batch_pause(Duration::from_secs(self.batch_pause_secs))
            .with_call_timeout(Duration::from_secs(self.call_timeout_secs))
    }

    /// Non-empty, trimmed API keys
    pub fn keys(&self) -> Result<Vec<String>, CliError> {
        let keys: Vec<String> = self
            .api_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(CliError::ConfigurationError(
                "no API key given: set RIOT_API_KEYS or pass --api-key".to_string(),
            ));
        }
        Ok(keys)
    }

    /// Partitions to run and the keys each one rotates through
    pub fn partitions(&self) -> Result<Vec<(PartitionKey, Vec<String>)>, CliError> {
        let keys = self.keys()?;
        if self.all_keys {
            return Ok(keys
                .into_iter()
                .enumerate()
                .map(|(i, key)| (PartitionKey::Key(i), vec![key]))
                .collect());
        }
        match self.partition.api_key_index {
            Some(index) => {
                let key = keys.get(index).cloned().ok_or_else(|| {
                    CliError::InvalidArgument(format!(
                        "--api-key-index {index} out of range: {} key(s) configured",
                        keys.len()
                    ))
                })?;
                Ok(vec![(PartitionKey::Key(index), vec![key])])
            }
            None => Ok(vec![(PartitionKey::Shared, keys)]),
        }
    }

    /// Execute the harvest command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = self.harvest_config();
        config.validate().map_err(CliError::InvalidArgument)?;
        let partitions = self.partitions()?;

        info!(
            platform = %self.platform,
            elo = %self.elo,
            partitions = partitions.len(),
            continuous = self.continuous,
            "Starting harvest"
        );

        let multi = (!self.no_progress).then(MultiProgress::new);
        let runs = partitions.into_iter().map(|(partition, keys)| {
            let bar = multi
                .as_ref()
                .map(|m| m.add(create_progress_bar(partition, &config)));
            let config = config.clone();
            let shutdown = shutdown.clone();
            async move {
                let result = self
                    .run_partition(cli, partition, keys, config, bar, shutdown)
                    .await;
                (partition, result)
            }
            .instrument(info_span!("partition", partition = %partition))
        });
        let results = join_all(runs).await;

        let mut first_error = None;
        for (partition, result) in results {
            match result {
                Ok(summary) => print_summary(cli.output_format, partition, &summary),
                Err(e) => {
                    error!(partition = %partition, error = %e, "Partition failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn run_partition(
        &self,
        cli: &Cli,
        partition: PartitionKey,
        keys: Vec<String>,
        config: HarvestConfig,
        bar: Option<ProgressBar>,
        shutdown: SharedShutdown,
    ) -> Result<RunSummary, CliError> {
        let layout = cli.layout(partition);
        let mut lock = PartitionLock::open(&layout.dir())?;
        // Held until the run returns
        let _held = lock.try_hold()?;

        let source = RiotSource::builder(&self.platform, keys.clone())
            .scope(self.elo)
            .max_pages(self.max_pages)
            .build()?;
        let sink = JsonlSink::open(layout.records_path())?;
        let store = ProgressStore::new(layout.progress_path());
        if self.reset {
            let snapshot = store.reset_progress()?;
            info!(collected = snapshot.collected().len(), "Processed units cleared");
        }

        let filter: Arc<dyn CategoryFilter> = if self.all_queues {
            Arc::new(AcceptAll)
        } else {
            Arc::new(QueueFilter::ranked_solo())
        };

        let mut harvester = Harvester::new(Arc::new(source), Box::new(sink), store, config)?
            .with_filter(filter)
            .with_budget(BudgetTracker::for_keys(keys.len()))
            .with_shutdown(shutdown);
        if let Some(bar) = bar {
            harvester = harvester.with_progress_bar(bar);
        }

        Ok(harvester.run().await?)
    }
}

fn print_summary(format: OutputFormat, partition: PartitionKey, summary: &RunSummary) {
    match format {
        OutputFormat::Human => {
            println!("{partition}: {}", summary.format_summary());
            println!("  Requests: {}", summary.counters);
        }
        OutputFormat::Json => {
            let output = json!({
                "partition": partition.to_string(),
                "batches": summary.batches,
                "units_processed": summary.units_processed,
                "records_appended": summary.records_appended,
                "records_filtered": summary.records_filtered,
                "interrupted": summary.interrupted,
                "elapsed_secs": summary.elapsed.as_secs_f64(),
                "counters": summary.counters,
            });
            println!("{output}");
        }
    }
}

/// Create progress bar with style
fn create_progress_bar(partition: PartitionKey, config: &HarvestConfig) -> ProgressBar {
    let pb = if config.continuous {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::new(config.units_per_batch as u64)
    };
    let template = if config.continuous {
        "{spinner:.green} [{elapsed_precise}] {prefix} {pos} units {msg}"
    } else {
        "{spinner:.green} [{elapsed_precise}] {prefix} [{bar:40.cyan/blue}] {pos}/{len} units {msg}"
    };
    let style = ProgressStyle::default_bar()
        .template(template)
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(partition.to_string());
    pb
}
