//! [`MatchSource`] over the ranked ladder

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

use crate::fetcher::riot_config::{
    match_detail_path, match_ids_path, summoner_path, EloScope, LadderPage, DEFAULT_MAX_PAGES,
};
use crate::fetcher::riot_http::RiotHttpClient;
use crate::fetcher::riot_parser::RiotParser;
use crate::fetcher::shared_resources::global_http_client;
use crate::fetcher::{FetcherError, FetcherResult, MatchSource};
use crate::harvester::config::MAX_IDS_PER_UNIT;
use crate::registry::PlatformRegistry;
use crate::{DetailRecord, MatchId, UnitRef};

/// Ranked ladder source for one platform.
///
/// Ladder and summoner calls go to the platform host, match calls to the
/// platform's regional host.
pub struct RiotSource {
    http: RiotHttpClient,
    platform: String,
    platform_base: String,
    regional_base: String,
    scope: EloScope,
    max_pages: u32,
}

impl RiotSource {
    /// Start building a source for `platform` authenticated with `keys`
    pub fn builder(platform: impl Into<String>, keys: Vec<String>) -> RiotSourceBuilder {
        RiotSourceBuilder {
            platform: platform.into(),
            keys,
            scope: EloScope::default(),
            max_pages: DEFAULT_MAX_PAGES,
            platform_base: None,
            regional_base: None,
            client: None,
        }
    }

    /// Ladder scope being swept
    pub fn scope(&self) -> EloScope {
        self.scope
    }

    /// Number of keys rotating through this source
    pub fn key_count(&self) -> usize {
        self.http.key_count()
    }
}

/// Builder for [`RiotSource`]
pub struct RiotSourceBuilder {
    platform: String,
    keys: Vec<String>,
    scope: EloScope,
    max_pages: u32,
    platform_base: Option<String>,
    regional_base: Option<String>,
    client: Option<Arc<Client>>,
}

impl RiotSourceBuilder {
    /// Ladder scope (default: all)
    pub fn scope(mut self, scope: EloScope) -> Self {
        self.scope = scope;
        self
    }

    /// Ceiling on diamond ladder pages
    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Override the platform host (tests, proxies)
    pub fn platform_base_url(mut self, url: impl Into<String>) -> Self {
        self.platform_base = Some(url.into());
        self
    }

    /// Override the regional host (tests, proxies)
    pub fn regional_base_url(mut self, url: impl Into<String>) -> Self {
        self.regional_base = Some(url.into());
        self
    }

    /// Use a specific HTTP client instead of the shared one
    pub fn client(mut self, client: Arc<Client>) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the source.
    ///
    /// # Errors
    /// Unknown platform, no usable key, or HTTP client construction failure.
    pub fn build(self) -> FetcherResult<RiotSource> {
        let registry = PlatformRegistry::load().map_err(|e| FetcherError::Config(e.to_string()))?;
        let entry = registry
            .get(&self.platform)
            .map_err(|e| FetcherError::Config(e.to_string()))?;

        let client = match self.client {
            Some(client) => client,
            None => global_http_client()?,
        };
        let http = RiotHttpClient::new(client, self.keys)?;

        Ok(RiotSource {
            http,
            platform: entry.platform().to_string(),
            platform_base: trim_base(self.platform_base.unwrap_or_else(|| entry.platform_base_url())),
            regional_base: trim_base(self.regional_base.unwrap_or_else(|| entry.regional_base_url())),
            scope: self.scope,
            max_pages: self.max_pages,
        })
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[async_trait]
impl MatchSource for RiotSource {
    async fn list_discovery_units(&self, page: u32) -> FetcherResult<Vec<UnitRef>> {
        let Some(ladder) = LadderPage::for_page(self.scope, page, self.max_pages) else {
            debug!(page, scope = %self.scope, "Past the last ladder page");
            return Ok(Vec::new());
        };

        let url = format!("{}{}", self.platform_base, ladder.path());
        match ladder {
            LadderPage::Apex(_) => {
                let body = self.http.get_json(&url, &[]).await?;
                RiotParser::parse_league_list(body)
            }
            LadderPage::Diamond(n) => {
                let body = self.http.get_json(&url, &[("page", n.to_string())]).await?;
                RiotParser::parse_league_entries(body)
            }
        }
    }

    async fn resolve_unit(&self, unit: &UnitRef) -> FetcherResult<UnitRef> {
        let Some(summoner_id) = unit.summoner_id.as_deref().filter(|_| unit.needs_resolution())
        else {
            return Ok(unit.clone());
        };
        let url = format!("{}{}", self.platform_base, summoner_path(summoner_id));
        let body = self.http.get_json(&url, &[]).await?;
        let puuid = RiotParser::parse_summoner_puuid(body)?;
        Ok(UnitRef {
            puuid: Some(puuid),
            summoner_id: unit.summoner_id.clone(),
            tier: unit.tier.clone(),
        })
    }

    async fn list_candidate_identifiers(
        &self,
        unit: &UnitRef,
        count: u32,
    ) -> FetcherResult<Vec<MatchId>> {
        let puuid = unit.puuid.as_deref().ok_or_else(|| {
            FetcherError::InvalidIdentifier(format!("unit {} has no puuid", unit.label()))
        })?;
        let url = format!("{}{}", self.regional_base, match_ids_path(puuid));
        let count = count.clamp(1, MAX_IDS_PER_UNIT);
        let body = self
            .http
            .get_json(&url, &[("start", "0".to_string()), ("count", count.to_string())])
            .await?;
        RiotParser::parse_match_ids(body)
    }

    async fn fetch_detail(&self, id: &MatchId) -> FetcherResult<DetailRecord> {
        let url = format!("{}{}", self.regional_base, match_detail_path(&id.to_string()));
        let body = self.http.get_json(&url, &[]).await?;
        RiotParser::parse_match_detail(id, body)
    }

    fn describe(&self) -> String {
        format!(
            "ranked ladder {} ({} scope, {} key(s))",
            self.platform,
            self.scope,
            self.http.key_count()
        )
    }
}
