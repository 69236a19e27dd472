// Test fixtures shared across modules
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FeedError};
use crate::notifications::{ActivityEvent, ActivitySink};
use crate::score_feed::{nfl_teams, FeedBatch, ScoreFeedClient, TeamRegistry};
use crate::store::models::{GameResult, League, LeagueMember, Pick};
use crate::store::MemoryStore;

pub fn league(season: i32, lives: i32) -> League {
    League {
        id: Uuid::new_v4(),
        name: "Office Pool".to_string(),
        season,
        starting_lives: lives,
        created_at: Utc::now(),
    }
}

pub fn member(league: &League) -> LeagueMember {
    LeagueMember::new(league.id, Uuid::new_v4(), league.starting_lives)
}

pub fn final_result(season: i32, week: i32, home: i32, away: i32, home_score: i32, away_score: i32) -> GameResult {
    GameResult {
        season,
        week,
        external_id: Some(format!("{}-{}-{}-{}", season, week, home, away)),
        home_team_id: home,
        away_team_id: away,
        home_score: Some(home_score),
        away_score: Some(away_score),
        is_final: true,
        status_text: "Final".to_string(),
        kickoff: None,
    }
}

pub fn live_result(season: i32, week: i32, home: i32, away: i32, home_score: i32, away_score: i32) -> GameResult {
    GameResult {
        is_final: false,
        status_text: "Q2 8:00".to_string(),
        ..final_result(season, week, home, away, home_score, away_score)
    }
}

pub fn pending_result(season: i32, week: i32, home: i32, away: i32) -> GameResult {
    GameResult {
        home_score: None,
        away_score: None,
        is_final: false,
        status_text: "Sun 1:00 PM".to_string(),
        ..final_result(season, week, home, away, 0, 0)
    }
}

pub fn nfl_registry() -> TeamRegistry {
    TeamRegistry::from_teams(&nfl_teams())
}

/// One 2026 league in a fresh memory store seeded with the league's teams.
pub struct Scenario {
    pub store: Arc<MemoryStore>,
    pub league: League,
}

impl Scenario {
    pub async fn new(lives: i32) -> Self {
        let store = Arc::new(MemoryStore::new());
        for team in nfl_teams() {
            store.insert_team(team).await;
        }
        let league = league(2026, lives);
        store.insert_league(league.clone()).await;
        Self { store, league }
    }

    pub async fn add_league(&self, lives: i32) -> League {
        let league = league(self.league.season, lives);
        self.store.insert_league(league.clone()).await;
        league
    }

    pub async fn add_member(&self) -> Uuid {
        let m = member(&self.league);
        let user_id = m.user_id;
        self.store.insert_member(m).await;
        user_id
    }

    pub async fn pick(&self, user_id: Uuid, week: i32, team_id: i32) -> Pick {
        let pick = Pick::new(self.league.id, user_id, week, team_id, None);
        self.store
            .insert_pick(pick.clone())
            .await
            .expect("pick should insert");
        pick
    }
}

/// Feed that returns a canned answer, optionally after a delay.
pub struct ScriptedFeed {
    response: Result<FeedBatch, FeedError>,
    delay: Option<Duration>,
}

impl ScriptedFeed {
    pub fn ok(results: Vec<GameResult>) -> Self {
        Self {
            response: Ok(FeedBatch {
                results,
                skipped: Vec::new(),
            }),
            delay: None,
        }
    }

    pub fn failing(error: FeedError) -> Self {
        Self {
            response: Err(error),
            delay: None,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::ok(Vec::new())
        }
    }
}

#[async_trait]
impl ScoreFeedClient for ScriptedFeed {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(&self, _season: i32, _week: i32) -> Result<FeedBatch, FeedError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ActivityEvent>>,
}

impl RecordingSink {
    pub async fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl ActivitySink for RecordingSink {
    async fn record(&self, event: &ActivityEvent) -> AppResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

pub struct FailingSink;

#[async_trait]
impl ActivitySink for FailingSink {
    async fn record(&self, _event: &ActivityEvent) -> AppResult<()> {
        Err(AppError::Internal("activity outbox unavailable".to_string()))
    }
}
