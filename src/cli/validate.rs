//! Validation subcommand

use clap::Parser;
use std::path::PathBuf;

use super::CliError;
use crate::identifier::MatchId;
use crate::registry::PlatformRegistry;
use crate::resume::ProgressStore;

/// Validate command for checking match ids and progress files
#[derive(Parser, Debug)]
pub struct ValidateCommand {
    /// What to validate
    #[command(subcommand)]
    pub target: ValidateTarget,
}

/// Target type for validation
#[derive(clap::Subcommand, Debug)]
pub enum ValidateTarget {
    /// Validate a match id (e.g. KR_7212345678)
    MatchId {
        /// Match id to validate
        id: String,
    },
    /// Verify a progress file's checksum, schema and invariants
    Progress {
        /// Path to progress.json
        path: PathBuf,
    },
}

impl ValidateCommand {
    /// Execute the validation command
    pub fn execute(&self) -> Result<(), CliError> {
        match &self.target {
            ValidateTarget::MatchId { id } => self.validate_match_id(id),
            ValidateTarget::Progress { path } => self.validate_progress(path),
        }
    }

    fn validate_match_id(&self, id: &str) -> Result<(), CliError> {
        let id = MatchId::parse(id)?;
        let registry =
            PlatformRegistry::load().map_err(|e| CliError::ConfigurationError(e.to_string()))?;

        println!("Valid match id: {id}");
        println!("  Prefix: {}", id.platform());
        println!("  Number: {}", id.number());
        match registry.platform_of(&id) {
            Some(entry) => println!(
                "  Platform: {} ({}, region {})",
                entry.platform(),
                entry.name(),
                entry.region()
            ),
            None => println!("  Platform: unknown prefix"),
        }
        Ok(())
    }

    fn validate_progress(&self, path: &PathBuf) -> Result<(), CliError> {
        if !path.exists() {
            return Err(CliError::InvalidArgument(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let snapshot = ProgressStore::inspect(path)?;
        println!("Valid progress file: {}", path.display());
        println!("  Processed units: {}", snapshot.processed().len());
        println!("  Collected ids: {}", snapshot.collected().len());
        println!("  Cursor: {}", snapshot.cursor());
        println!("  Detail requests: {}", snapshot.counters());
        Ok(())
    }
}
