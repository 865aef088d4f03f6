//! # Match Harvester Library
//!
//! A resilient, rate-governed harvester for ranked match records. It pulls
//! match payloads from a remote, rate-limited HTTP API, obeys the server's
//! sliding-window budgets, survives interruption without losing or duplicating
//! work, and persists results incrementally.
//!
//! ## Features
//!
//! - **Sliding-window budgets**: per endpoint class, several windows at once
//! - **Classified retries**: rate limits wait as long as the server asks,
//!   transient faults back off with a bounded number of attempts, fatal
//!   failures are skipped
//! - **Crash-safe progress**: checksummed snapshots written by atomic replace
//! - **Idempotent raw store**: append-only JSON lines keyed by match id
//! - **Partitions**: one progress file, raw store and budget per API key
//!
//! ## Quick Start
//!
//! ```no_run
//! use match_harvester::fetcher::riot::RiotSource;
//! use match_harvester::harvester::{HarvestConfig, Harvester};
//! use match_harvester::output::jsonl::JsonlSink;
//! use match_harvester::resume::ProgressStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = RiotSource::builder("kr", vec!["RGAPI-...".to_string()]).build()?;
//! let sink = JsonlSink::open("data/shared/matches.jsonl")?;
//! let store = ProgressStore::new("data/shared/progress.json");
//!
//! let mut harvester = Harvester::new(
//!     Arc::new(source),
//!     Box::new(sink),
//!     store,
//!     HarvestConfig::default(),
//! )?;
//! let summary = harvester.run().await?;
//! println!("{}", summary.counters);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`harvester`] - Orchestration: budget tracker, retry policy, run loop
//! - [`resume`] - Progress snapshots, atomic store and partition locks
//! - [`fetcher`] - The remote source trait and its HTTP implementation
//! - [`output`] - Raw record sink and tabular export
//! - [`filter`] - Category filter applied to fetched records
//! - [`identifier`] - Match id and partition key parsing
//! - [`registry`] - Supported platforms and their regional routing

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// CLI command implementations
pub mod cli;

/// Record category filters
pub mod filter;

/// Remote match sources
pub mod fetcher;

/// Harvest orchestration
pub mod harvester;

/// Match id and partition key parsing
pub mod identifier;

/// Production observability metrics
pub mod metrics;

/// Raw record sinks and exports
pub mod output;

/// Platform registry with regional routing
pub mod registry;

/// Durable, resumable progress
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

// Re-export commonly used types
pub use identifier::{MatchId, PartitionKey};

/// A discovery unit: one ladder player whose match history is harvested.
///
/// Ladder entries normally carry the player's `puuid`. Older entries only
/// carry a `summoner_id`, which must be resolved before candidates can be
/// listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRef {
    /// Player UUID, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puuid: Option<String>,
    /// Legacy summoner id, if the entry predates puuids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summoner_id: Option<String>,
    /// Ladder tier the unit was discovered in (e.g. "CHALLENGER")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

impl UnitRef {
    /// Unit identified by its puuid
    pub fn from_puuid(puuid: impl Into<String>, tier: Option<String>) -> Self {
        Self {
            puuid: Some(puuid.into()),
            summoner_id: None,
            tier,
        }
    }

    /// Unit identified only by a legacy summoner id
    pub fn from_summoner_id(summoner_id: impl Into<String>, tier: Option<String>) -> Self {
        Self {
            puuid: None,
            summoner_id: Some(summoner_id.into()),
            tier,
        }
    }

    /// Stable key used in the processed-unit set.
    ///
    /// Returns `None` for a unit that carries neither identifier.
    pub fn key(&self) -> Option<String> {
        match (&self.puuid, &self.summoner_id) {
            (Some(puuid), _) => Some(puuid.clone()),
            (None, Some(sid)) => Some(format!("summoner:{sid}")),
            (None, None) => None,
        }
    }

    /// Whether a summoner lookup is needed before listing candidates
    pub fn needs_resolution(&self) -> bool {
        self.puuid.is_none() && self.summoner_id.is_some()
    }

    /// Short label for log lines
    pub fn label(&self) -> String {
        let key = self.key().unwrap_or_else(|| "<anonymous>".to_string());
        if key.chars().count() > 16 {
            let short: String = key.chars().take(16).collect();
            format!("{short}...")
        } else {
            key
        }
    }
}

/// One fetched match payload, tagged with its id and the fields the
/// category filter and exports look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    /// Globally unique match id
    pub id: MatchId,
    /// Queue the match was played in (420 = ranked solo/duo)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<u32>,
    /// Game client version (e.g. "14.3.558.106")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_version: Option<String>,
    /// Game creation time (Unix milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_creation: Option<i64>,
    /// Raw payload as returned by the remote source
    pub payload: serde_json::Value,
}

impl DetailRecord {
    /// Build a record from a raw match payload, extracting the tag fields
    /// from its `info` object when present.
    pub fn from_payload(id: MatchId, payload: serde_json::Value) -> Self {
        let info = payload.get("info");
        let queue_id = info
            .and_then(|i| i.get("queueId"))
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok());
        let game_version = info
            .and_then(|i| i.get("gameVersion"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let game_creation = info
            .and_then(|i| i.get("gameCreation"))
            .and_then(|v| v.as_i64());

        Self {
            id,
            queue_id,
            game_version,
            game_creation,
            payload,
        }
    }

    /// Number of participants listed in the payload
    pub fn participant_count(&self) -> usize {
        self.payload
            .get("info")
            .and_then(|i| i.get("participants"))
            .and_then(|p| p.as_array())
            .map(|p| p.len())
            .unwrap_or(0)
    }

    /// Team id of the winning side, if the payload records one
    pub fn winning_team(&self) -> Option<i64> {
        self.payload
            .get("info")?
            .get("teams")?
            .as_array()?
            .iter()
            .find(|team| team.get("win").and_then(|w| w.as_bool()) == Some(true))
            .and_then(|team| team.get("teamId"))
            .and_then(|id| id.as_i64())
    }
}
