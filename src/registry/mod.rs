//! Platform registry with regional routing
//!
//! Ladder and summoner endpoints are served per platform (`kr`, `euw1`, ...),
//! match endpoints per routing region (`asia`, `europe`, ...). The registry
//! maps one to the other and knows the platform prefix of match ids.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::identifier::MatchId;

/// Embedded registry data
const REGISTRY_JSON: &str = include_str!("platforms.json");

/// Global registry instance (loaded once)
static REGISTRY: Lazy<Result<PlatformRegistry, RegistryError>> =
    Lazy::new(|| PlatformRegistry::from_json(REGISTRY_JSON));

/// Registry of supported platforms
#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    schema_version: String,
    entries: BTreeMap<String, PlatformEntry>,
}

impl PlatformRegistry {
    /// The embedded registry, parsed once
    pub fn load() -> Result<&'static Self, &'static RegistryError> {
        REGISTRY.as_ref()
    }

    fn from_json(json: &str) -> Result<Self, RegistryError> {
        let raw: RawRegistry = serde_json::from_str(json)
            .map_err(|e| RegistryError::ParseError(format!("Failed to parse registry: {e}")))?;

        let entries = raw
            .platforms
            .into_iter()
            .map(|entry| (entry.platform.clone(), entry))
            .collect();

        Ok(Self {
            schema_version: raw.schema_version,
            entries,
        })
    }

    /// Registry schema version
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// All platforms, ordered by platform id
    pub fn entries(&self) -> impl Iterator<Item = &PlatformEntry> {
        self.entries.values()
    }

    /// Look up a platform (case-insensitive)
    pub fn get(&self, platform: &str) -> Result<&PlatformEntry, RegistryError> {
        self.entries
            .get(&platform.trim().to_lowercase())
            .ok_or_else(|| RegistryError::NotFound(format!("unknown platform '{platform}'")))
    }

    /// Platform whose match ids carry `id`'s prefix
    pub fn platform_of(&self, id: &MatchId) -> Option<&PlatformEntry> {
        self.entries
            .values()
            .find(|entry| entry.match_prefix == id.platform())
    }
}

/// A single platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEntry {
    platform: String,
    region: String,
    match_prefix: String,
    name: String,
}

impl PlatformEntry {
    /// Platform routing value (e.g. "kr")
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Regional routing value for match endpoints (e.g. "asia")
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Prefix of match ids played on this platform (e.g. "KR")
    pub fn match_prefix(&self) -> &str {
        &self.match_prefix
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URL of platform-routed endpoints
    pub fn platform_base_url(&self) -> String {
        format!("https://{}.api.riotgames.com", self.platform)
    }

    /// Base URL of region-routed endpoints
    pub fn regional_base_url(&self) -> String {
        format!("https://{}.api.riotgames.com", self.region)
    }
}

#[derive(Debug, Deserialize)]
struct RawRegistry {
    schema_version: String,
    platforms: Vec<PlatformEntry>,
}

/// Errors that can occur when working with the registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Failed to parse registry JSON
    #[error("registry parse error: {0}")]
    ParseError(String),

    /// Platform not found in registry
    #[error("platform not found: {0}")]
    NotFound(String),
}
