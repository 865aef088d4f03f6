//! Ranked API response parsing
//!
//! Stateless conversions from decoded JSON into [`UnitRef`], [`MatchId`] and
//! [`DetailRecord`].

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::fetcher::{FetcherError, FetcherResult};
use crate::{DetailRecord, MatchId, UnitRef};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeagueListDto {
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    entries: Vec<LeagueEntryDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeagueEntryDto {
    #[serde(default)]
    puuid: Option<String>,
    #[serde(default)]
    summoner_id: Option<String>,
    #[serde(default)]
    tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummonerDto {
    puuid: String,
}

/// Stateless parser for ranked API responses
pub struct RiotParser;

impl RiotParser {
    /// Parse an apex league (`{"tier": ..., "entries": [...]}`).
    ///
    /// Entries carrying neither a puuid nor a summoner id are dropped.
    pub fn parse_league_list(body: Value) -> FetcherResult<Vec<UnitRef>> {
        let league: LeagueListDto = serde_json::from_value(body)
            .map_err(|e| FetcherError::Parse(format!("Invalid league list: {e}")))?;
        let tier = league.tier;
        Ok(Self::collect_units(
            league
                .entries
                .into_iter()
                .map(|e| (e.puuid, e.summoner_id, e.tier.or_else(|| tier.clone()))),
        ))
    }

    /// Parse a paged entries array (`[{"puuid": ..., "tier": ...}, ...]`)
    pub fn parse_league_entries(body: Value) -> FetcherResult<Vec<UnitRef>> {
        let entries: Vec<LeagueEntryDto> = serde_json::from_value(body)
            .map_err(|e| FetcherError::Parse(format!("Invalid league entries: {e}")))?;
        Ok(Self::collect_units(
            entries.into_iter().map(|e| (e.puuid, e.summoner_id, e.tier)),
        ))
    }

    fn collect_units(
        entries: impl Iterator<Item = (Option<String>, Option<String>, Option<String>)>,
    ) -> Vec<UnitRef> {
        let mut dropped = 0usize;
        let units: Vec<UnitRef> = entries
            .filter_map(|(puuid, summoner_id, tier)| {
                let unit = UnitRef {
                    puuid: puuid.filter(|p| !p.is_empty()),
                    summoner_id: summoner_id.filter(|s| !s.is_empty()),
                    tier,
                };
                if unit.key().is_none() {
                    dropped += 1;
                    None
                } else {
                    Some(unit)
                }
            })
            .collect();
        if dropped > 0 {
            warn!(dropped, "Ladder entries without player identifiers skipped");
        }
        units
    }

    /// Parse a summoner lookup into its puuid
    pub fn parse_summoner_puuid(body: Value) -> FetcherResult<String> {
        let summoner: SummonerDto = serde_json::from_value(body)
            .map_err(|e| FetcherError::Parse(format!("Invalid summoner: {e}")))?;
        if summoner.puuid.is_empty() {
            return Err(FetcherError::Parse("Summoner has an empty puuid".to_string()));
        }
        Ok(summoner.puuid)
    }

    /// Parse a match id list.
    ///
    /// A malformed id is skipped with a warning; the rest of the list is kept.
    pub fn parse_match_ids(body: Value) -> FetcherResult<Vec<MatchId>> {
        let raw: Vec<String> = serde_json::from_value(body)
            .map_err(|e| FetcherError::Parse(format!("Invalid match id list: {e}")))?;
        Ok(raw
            .iter()
            .filter_map(|s| match MatchId::parse(s) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed match id");
                    None
                }
            })
            .collect())
    }

    /// Parse a match payload requested as `id`.
    ///
    /// A payload whose `metadata.matchId` names a different match is rejected.
    pub fn parse_match_detail(id: &MatchId, body: Value) -> FetcherResult<DetailRecord> {
        if !body.is_object() {
            return Err(FetcherError::Parse(format!(
                "Match {id}: payload is not an object"
            )));
        }
        if let Some(reported) = body
            .get("metadata")
            .and_then(|m| m.get("matchId"))
            .and_then(|v| v.as_str())
        {
            let reported = MatchId::parse(reported)
                .map_err(|e| FetcherError::InvalidIdentifier(e.to_string()))?;
            if &reported != id {
                return Err(FetcherError::Parse(format!(
                    "Requested {id} but payload is for {reported}"
                )));
            }
        }
        Ok(DetailRecord::from_payload(id.clone(), body))
    }
}
