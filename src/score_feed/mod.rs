pub mod espn;

pub use espn::EspnScoreFeed;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::FeedError;
use crate::store::models::{GameResult, Team};

/// One feed entry that could not be turned into a `GameResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub external_id: Option<String>,
    pub reason: String,
}

/// Normalized results for one season/week.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedBatch {
    pub results: Vec<GameResult>,
    pub skipped: Vec<SkippedEntry>,
}

/// Translates an external scores provider into canonical `GameResult`s.
///
/// Implementations never write anything. A transport failure is an `Err`; a
/// bad individual entry is skipped and reported in the batch.
#[async_trait]
pub trait ScoreFeedClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, season: i32, week: i32) -> Result<FeedBatch, FeedError>;
}

/// Feed abbreviations the provider uses that differ from our team codes
const CODE_ALIASES: &[(&str, &str)] = &[("WAS", "WSH"), ("JAC", "JAX"), ("LA", "LAR"), ("OAK", "LV")];

/// League teams in id order; mirrors the seed rows of the schema migration.
pub const NFL_TEAMS: &[(&str, &str)] = &[
    ("ARI", "Arizona Cardinals"),
    ("ATL", "Atlanta Falcons"),
    ("BAL", "Baltimore Ravens"),
    ("BUF", "Buffalo Bills"),
    ("CAR", "Carolina Panthers"),
    ("CHI", "Chicago Bears"),
    ("CIN", "Cincinnati Bengals"),
    ("CLE", "Cleveland Browns"),
    ("DAL", "Dallas Cowboys"),
    ("DEN", "Denver Broncos"),
    ("DET", "Detroit Lions"),
    ("GB", "Green Bay Packers"),
    ("HOU", "Houston Texans"),
    ("IND", "Indianapolis Colts"),
    ("JAX", "Jacksonville Jaguars"),
    ("KC", "Kansas City Chiefs"),
    ("LV", "Las Vegas Raiders"),
    ("LAC", "Los Angeles Chargers"),
    ("LAR", "Los Angeles Rams"),
    ("MIA", "Miami Dolphins"),
    ("MIN", "Minnesota Vikings"),
    ("NE", "New England Patriots"),
    ("NO", "New Orleans Saints"),
    ("NYG", "New York Giants"),
    ("NYJ", "New York Jets"),
    ("PHI", "Philadelphia Eagles"),
    ("PIT", "Pittsburgh Steelers"),
    ("SF", "San Francisco 49ers"),
    ("SEA", "Seattle Seahawks"),
    ("TB", "Tampa Bay Buccaneers"),
    ("TEN", "Tennessee Titans"),
    ("WSH", "Washington Commanders"),
];

pub fn nfl_teams() -> Vec<Team> {
    NFL_TEAMS
        .iter()
        .zip(1..)
        .map(|((code, name), id)| Team {
            id,
            code: code.to_string(),
            name: name.to_string(),
        })
        .collect()
}

/// Team code → local team id.
#[derive(Debug, Clone, Default)]
pub struct TeamRegistry {
    by_code: HashMap<String, i32>,
}

impl TeamRegistry {
    pub fn from_teams(teams: &[Team]) -> Self {
        let by_code = teams
            .iter()
            .map(|t| (t.code.to_ascii_uppercase(), t.id))
            .collect();
        Self { by_code }
    }

    pub fn resolve(&self, code: &str) -> Option<i32> {
        let code = code.trim().to_ascii_uppercase();
        if let Some(id) = self.by_code.get(&code) {
            return Some(*id);
        }
        CODE_ALIASES
            .iter()
            .find(|(alias, _)| *alias == code)
            .and_then(|(_, canonical)| self.by_code.get(*canonical).copied())
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_codes_and_aliases() {
        let registry = TeamRegistry::from_teams(&[
            Team {
                id: 32,
                code: "WSH".to_string(),
                name: "Washington Commanders".to_string(),
            },
            Team {
                id: 26,
                code: "PHI".to_string(),
                name: "Philadelphia Eagles".to_string(),
            },
        ]);

        assert_eq!(registry.resolve("phi"), Some(26));
        assert_eq!(registry.resolve("WAS"), Some(32));
        assert_eq!(registry.resolve("XYZ"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_seed_teams_have_migration_ids() {
        let registry = TeamRegistry::from_teams(&nfl_teams());
        assert_eq!(registry.len(), 32);
        assert_eq!(registry.resolve("ARI"), Some(1));
        assert_eq!(registry.resolve("KC"), Some(16));
        assert_eq!(registry.resolve("WAS"), Some(32));
    }
}
