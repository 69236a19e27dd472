use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{FeedBatch, ScoreFeedClient, SkippedEntry, TeamRegistry};
use crate::error::FeedError;
use crate::store::models::GameResult;

/// Regular-season type on the scoreboard endpoint
const REGULAR_SEASON: &str = "2";

/// Scoreboard client for the ESPN-style NFL endpoint.
pub struct EspnScoreFeed {
    base_url: String,
    client: Client,
    registry: Arc<TeamRegistry>,
}

impl EspnScoreFeed {
    pub fn new(base_url: String, timeout: Duration, registry: Arc<TeamRegistry>) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            registry,
        })
    }
}

#[async_trait]
impl ScoreFeedClient for EspnScoreFeed {
    fn name(&self) -> &'static str {
        "espn"
    }

    async fn fetch(&self, season: i32, week: i32) -> Result<FeedBatch, FeedError> {
        debug!("Fetching scoreboard season={} week={}", season, week);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("dates", season.to_string()),
                ("seasontype", REGULAR_SEASON.to_string()),
                ("week", week.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FeedError::HttpStatus(response.status().as_u16()));
        }

        let payload: Value = response.json().await?;
        let batch = normalize_scoreboard(&payload, &self.registry, season, week)?;

        info!(
            "📡 Scoreboard season={} week={}: {} results, {} skipped",
            season,
            week,
            batch.results.len(),
            batch.skipped.len()
        );
        Ok(batch)
    }
}

// ========== WIRE SHAPES ==========

#[derive(Debug, Deserialize)]
struct EspnEvent {
    id: String,
    date: Option<String>,
    competitions: Vec<EspnCompetition>,
}

#[derive(Debug, Deserialize)]
struct EspnCompetition {
    competitors: Vec<EspnCompetitor>,
    status: EspnStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EspnCompetitor {
    home_away: String,
    score: Option<String>,
    team: EspnTeam,
}

#[derive(Debug, Deserialize)]
struct EspnTeam {
    abbreviation: String,
}

#[derive(Debug, Deserialize)]
struct EspnStatus {
    #[serde(rename = "type")]
    kind: EspnStatusType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EspnStatusType {
    completed: bool,
    state: String,
    short_detail: Option<String>,
}

/// Turn a scoreboard payload into a batch. Only a missing `events` array
/// fails the whole payload; every other defect skips a single entry.
pub fn normalize_scoreboard(
    payload: &Value,
    registry: &TeamRegistry,
    season: i32,
    week: i32,
) -> Result<FeedBatch, FeedError> {
    let events = payload
        .get("events")
        .and_then(Value::as_array)
        .ok_or_else(|| FeedError::MalformedPayload("missing events array".to_string()))?;

    let mut batch = FeedBatch::default();
    for raw in events {
        let external_id = raw.get("id").and_then(Value::as_str).map(str::to_string);
        let outcome = serde_json::from_value::<EspnEvent>(raw.clone())
            .map_err(|e| format!("unreadable entry: {}", e))
            .and_then(|event| to_game_result(event, registry, season, week));

        match outcome {
            Ok(result) => batch.results.push(result),
            Err(reason) => {
                warn!("Skipping feed entry {:?}: {}", external_id, reason);
                batch.skipped.push(SkippedEntry {
                    external_id,
                    reason,
                });
            }
        }
    }

    Ok(batch)
}

fn to_game_result(
    event: EspnEvent,
    registry: &TeamRegistry,
    season: i32,
    week: i32,
) -> Result<GameResult, String> {
    let competition = event
        .competitions
        .into_iter()
        .next()
        .ok_or_else(|| "no competition".to_string())?;

    let side = |which: &str| {
        competition
            .competitors
            .iter()
            .find(|c| c.home_away.eq_ignore_ascii_case(which))
            .ok_or_else(|| format!("no {} competitor", which))
    };
    let home = side("home")?;
    let away = side("away")?;

    let home_team_id = registry
        .resolve(&home.team.abbreviation)
        .ok_or_else(|| format!("unknown team {}", home.team.abbreviation))?;
    let away_team_id = registry
        .resolve(&away.team.abbreviation)
        .ok_or_else(|| format!("unknown team {}", away.team.abbreviation))?;

    let status = &competition.status.kind;
    // Pre-game entries report "0"; treat them as no score yet.
    let started = status.state != "pre";
    let home_score = if started { parse_score(home.score.as_deref())? } else { None };
    let away_score = if started { parse_score(away.score.as_deref())? } else { None };

    let result = GameResult {
        season,
        week,
        external_id: Some(event.id),
        home_team_id,
        away_team_id,
        home_score,
        away_score,
        is_final: status.completed,
        status_text: status
            .short_detail
            .clone()
            .unwrap_or_else(|| status.state.clone()),
        kickoff: event.date.as_deref().and_then(parse_kickoff),
    };
    result.validate()?;
    Ok(result)
}

fn parse_score(raw: Option<&str>) -> Result<Option<i32>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<i32>()
            .map(Some)
            .map_err(|_| format!("bad score {:?}", text)),
    }
}

fn parse_kickoff(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%MZ")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::nfl_registry;
    use serde_json::json;

    fn event(id: &str, home: &str, away: &str, scores: (&str, &str), state: &str, completed: bool) -> Value {
        let detail = if completed { "Final" } else { "Q3 4:12" };
        json!({
            "id": id,
            "date": "2026-09-20T17:00Z",
            "competitions": [{
                "competitors": [
                    {"homeAway": "home", "score": scores.0, "team": {"abbreviation": home}},
                    {"homeAway": "away", "score": scores.1, "team": {"abbreviation": away}}
                ],
                "status": {"type": {"completed": completed, "state": state, "shortDetail": detail}}
            }]
        })
    }

    #[test]
    fn test_normalizes_final_and_live_games() {
        let registry = nfl_registry();
        let payload = json!({
            "events": [
                event("401", "PHI", "DAL", ("24", "10"), "post", true),
                event("402", "KC", "BUF", ("7", "3"), "in", false),
            ]
        });

        let batch = normalize_scoreboard(&payload, &registry, 2026, 3).unwrap();
        assert_eq!(batch.results.len(), 2);
        assert!(batch.skipped.is_empty());

        let final_game = &batch.results[0];
        assert_eq!(final_game.external_id.as_deref(), Some("401"));
        assert_eq!(final_game.home_team_id, registry.resolve("PHI").unwrap());
        assert_eq!(final_game.home_score, Some(24));
        assert_eq!(final_game.away_score, Some(10));
        assert!(final_game.is_final);
        assert!(final_game.kickoff.is_some());

        assert!(!batch.results[1].is_final);
        assert_eq!(batch.results[1].status_text, "Q3 4:12");
    }

    #[test]
    fn test_pre_game_has_no_scores() {
        let payload = json!({"events": [event("403", "NYG", "NYJ", ("0", "0"), "pre", false)]});
        let batch = normalize_scoreboard(&payload, &nfl_registry(), 2026, 3).unwrap();
        assert_eq!(batch.results[0].home_score, None);
        assert_eq!(batch.results[0].away_score, None);
    }

    #[test]
    fn test_unknown_team_and_malformed_entries_are_skipped() {
        let payload = json!({
            "events": [
                event("401", "PHI", "DAL", ("24", "10"), "post", true),
                event("404", "XXX", "DAL", ("1", "2"), "post", true),
                {"id": "405", "competitions": "garbage"},
                event("406", "SEA", "SF", ("abc", "3"), "in", false),
            ]
        });

        let batch = normalize_scoreboard(&payload, &nfl_registry(), 2026, 3).unwrap();
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.skipped.len(), 3);
        assert!(batch.skipped[0].reason.contains("unknown team"));
        assert_eq!(batch.skipped[1].external_id.as_deref(), Some("405"));
    }

    #[test]
    fn test_missing_events_is_malformed_payload() {
        let result = normalize_scoreboard(&json!({"leagues": []}), &nfl_registry(), 2026, 3);
        assert!(matches!(result, Err(FeedError::MalformedPayload(_))));
    }
}
