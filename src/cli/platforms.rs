//! CLI command for listing supported platforms

use clap::Args;
use serde_json::json;

use super::{CliError, OutputFormat};
use crate::registry::PlatformRegistry;

/// Platforms subcommand
#[derive(Debug, Args)]
pub struct PlatformsCommand {
    /// Only show platforms routed through this region (e.g. asia)
    #[arg(long)]
    pub region: Option<String>,
}

impl PlatformsCommand {
    /// Execute the platforms command
    pub fn execute(&self, format: OutputFormat) -> Result<(), CliError> {
        let registry =
            PlatformRegistry::load().map_err(|e| CliError::ConfigurationError(e.to_string()))?;

        let entries: Vec<_> = registry
            .entries()
            .filter(|entry| {
                self.region
                    .as_deref()
                    .map_or(true, |r| entry.region().eq_ignore_ascii_case(r.trim()))
            })
            .collect();

        match format {
            OutputFormat::Json => {
                let value: Vec<_> = entries
                    .iter()
                    .map(|entry| {
                        json!({
                            "platform": entry.platform(),
                            "region": entry.region(),
                            "match_prefix": entry.match_prefix(),
                            "name": entry.name(),
                        })
                    })
                    .collect();
                let output = serde_json::to_string_pretty(&value)
                    .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
                println!("{output}");
            }
            OutputFormat::Human => {
                println!("Found {} platform(s):\n", entries.len());
                for entry in entries {
                    println!(
                        "{:<6} | {:<8} | {:<5} | {}",
                        entry.platform(),
                        entry.region(),
                        entry.match_prefix(),
                        entry.name()
                    );
                }
            }
        }
        Ok(())
    }
}
