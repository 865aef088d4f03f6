//! Ranked ladder endpoints and discovery page layout
//!
//! Discovery pages are logical: each maps to exactly one ladder request.
//!
//! | scope     | page 0     | page 1      | page 2 | page n (n >= 3)   |
//! |-----------|------------|-------------|--------|-------------------|
//! | `All`     | challenger | grandmaster | master | diamond I, n - 2  |
//! | `Apex`    | challenger | grandmaster | master | (end)             |
//! | `Diamond` | diamond 1  | diamond 2   | ...    | diamond I, n + 1  |
//!
//! Diamond paging stops after `max_pages` ladder pages.

use std::fmt;
use std::str::FromStr;

/// Ranked solo/duo queue name in ladder endpoints
pub const RANKED_SOLO_QUEUE: &str = "RANKED_SOLO_5x5";

/// Division paged below the apex tiers
pub const DIAMOND_DIVISION: &str = "I";

/// Default ceiling on diamond ladder pages
pub const DEFAULT_MAX_PAGES: u32 = 50;

/// Authentication header
pub const API_KEY_HEADER: &str = "X-Riot-Token";

/// Apex tiers, listed in ladder order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApexTier {
    /// Top tier
    Challenger,
    /// Second tier
    Grandmaster,
    /// Third tier
    Master,
}

impl ApexTier {
    /// Tiers in ladder order
    pub const ALL: [ApexTier; 3] = [Self::Challenger, Self::Grandmaster, Self::Master];

    /// Path segment of the league endpoint
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Challenger => "challengerleagues",
            Self::Grandmaster => "grandmasterleagues",
            Self::Master => "masterleagues",
        }
    }

    /// Tier name as the API reports it
    pub fn tier_name(&self) -> &'static str {
        match self {
            Self::Challenger => "CHALLENGER",
            Self::Grandmaster => "GRANDMASTER",
            Self::Master => "MASTER",
        }
    }
}

/// Which part of the ladder to sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EloScope {
    /// Apex leagues, then diamond pages
    #[default]
    All,
    /// Apex leagues only
    Apex,
    /// Diamond pages only
    Diamond,
}

impl EloScope {
    /// Tiers covered by the scope, as the API names them
    pub fn tiers(&self) -> Vec<String> {
        let apex = ApexTier::ALL.iter().map(|t| t.tier_name().to_string());
        match self {
            Self::All => apex.chain(std::iter::once("DIAMOND".to_string())).collect(),
            Self::Apex => apex.collect(),
            Self::Diamond => vec!["DIAMOND".to_string()],
        }
    }
}

impl fmt::Display for EloScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Apex => write!(f, "apex"),
            Self::Diamond => write!(f, "diamond"),
        }
    }
}

impl FromStr for EloScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "apex" | "high" => Ok(Self::Apex),
            "diamond" => Ok(Self::Diamond),
            other => Err(format!(
                "unknown elo scope '{other}': expected all, apex or diamond"
            )),
        }
    }
}

/// One ladder request behind a logical page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderPage {
    /// A whole apex league
    Apex(ApexTier),
    /// A diamond I entries page (1-based)
    Diamond(u32),
}

impl LadderPage {
    /// Ladder request for logical `page`, or `None` past the end
    pub fn for_page(scope: EloScope, page: u32, max_pages: u32) -> Option<Self> {
        let diamond = |n: u32| (n >= 1 && n <= max_pages).then_some(Self::Diamond(n));
        match scope {
            EloScope::All => match page {
                0..=2 => Some(Self::Apex(ApexTier::ALL[page as usize])),
                n => diamond(n - 2),
            },
            EloScope::Apex => ApexTier::ALL.get(page as usize).copied().map(Self::Apex),
            EloScope::Diamond => diamond(page.saturating_add(1)),
        }
    }

    /// Endpoint path
    pub fn path(&self) -> String {
        match self {
            Self::Apex(tier) => league_path(*tier),
            Self::Diamond(_) => entries_path("DIAMOND", DIAMOND_DIVISION),
        }
    }
}

/// `/lol/league/v4/{tier}leagues/by-queue/{queue}`
pub fn league_path(tier: ApexTier) -> String {
    format!(
        "/lol/league/v4/{}/by-queue/{RANKED_SOLO_QUEUE}",
        tier.path_segment()
    )
}

/// `/lol/league/v4/entries/{queue}/{tier}/{division}`
pub fn entries_path(tier: &str, division: &str) -> String {
    format!("/lol/league/v4/entries/{RANKED_SOLO_QUEUE}/{tier}/{division}")
}

/// `/lol/summoner/v4/summoners/{summoner_id}`
pub fn summoner_path(summoner_id: &str) -> String {
    format!("/lol/summoner/v4/summoners/{summoner_id}")
}

/// `/lol/match/v5/matches/by-puuid/{puuid}/ids`
pub fn match_ids_path(puuid: &str) -> String {
    format!("/lol/match/v5/matches/by-puuid/{puuid}/ids")
}

/// `/lol/match/v5/matches/{match_id}`
pub fn match_detail_path(match_id: &str) -> String {
    format!("/lol/match/v5/matches/{match_id}")
}
