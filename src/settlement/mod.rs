// Weekly settlement engine
//
// Feed -> GameStore -> PickResolver -> LifeLedger, driven by the
// SettlementOrchestrator. The LiveScorePoller shares the sync step and the
// resolver but never touches lives.
pub mod calendar;
pub mod life_ledger;
pub mod live_poller;
pub mod orchestrator;
pub mod resolver;
pub mod scheduler;
pub mod sync;

pub use calendar::SeasonCalendar;
pub use live_poller::{LivePollReport, LiveScorePoller};
pub use orchestrator::SettlementOrchestrator;
pub use scheduler::{SchedulerConfig, SettlementScheduler};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::store::models::{Game, LifeChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScope {
    Feed,
    Game,
    Pick,
    Member,
    Fatal,
}

/// One failure collected during a run. The run carries on past it unless
/// the scope is `Fatal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
    pub scope: ErrorScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub message: String,
}

impl RunError {
    pub fn new(scope: ErrorScope, entity_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            scope,
            entity_id,
            message: message.into(),
        }
    }

    pub fn feed(message: impl Into<String>) -> Self {
        Self::new(ErrorScope::Feed, None, message)
    }

    pub fn game(game_id: impl ToString, message: impl Into<String>) -> Self {
        Self::new(ErrorScope::Game, Some(game_id.to_string()), message)
    }

    pub fn pick(pick_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(ErrorScope::Pick, Some(pick_id.to_string()), message)
    }

    pub fn member(user_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(ErrorScope::Member, Some(user_id.to_string()), message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorScope::Fatal, None, message)
    }
}

/// Settlement state of one league-week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekState {
    /// Some games are not final (or none are known yet)
    Pending,
    /// All games final, picks or deductions outstanding
    Ready,
    /// Nothing left to resolve or deduct
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Games still pending; nothing resolved
    NotReady,
    Completed,
    CompletedWithErrors,
    /// Base data could not be loaded; nothing applied
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingGame {
    pub game_id: Uuid,
    pub home_team_id: i32,
    pub away_team_id: i32,
    pub status_text: String,
}

impl From<&Game> for PendingGame {
    fn from(game: &Game) -> Self {
        Self {
            game_id: game.id,
            home_team_id: game.home_team_id,
            away_team_id: game.away_team_id,
            status_text: game.status_text.clone(),
        }
    }
}

/// Report of one orchestration pass. A dry run fills in exactly what the
/// live run would have done.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementRun {
    pub run_id: Uuid,
    pub league_id: Uuid,
    pub season: i32,
    pub week: i32,
    pub dry_run: bool,
    pub status: RunStatus,
    pub week_state: Option<WeekState>,
    pub games_synced: usize,
    pub games_changed: usize,
    pub feed_entries_skipped: usize,
    pub pending_games: Vec<PendingGame>,
    pub picks_resolved: usize,
    pub deductions_applied: usize,
    pub members_eliminated: usize,
    pub life_changes: Vec<LifeChange>,
    pub errors: Vec<RunError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SettlementRun {
    pub fn new(league_id: Uuid, season: i32, week: i32, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            league_id,
            season,
            week,
            dry_run,
            status: RunStatus::Completed,
            week_state: None,
            games_synced: 0,
            games_changed: 0,
            feed_entries_skipped: 0,
            pending_games: Vec::new(),
            picks_resolved: 0,
            deductions_applied: 0,
            members_eliminated: 0,
            life_changes: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_change(&mut self, change: LifeChange) {
        if change.deducted() {
            self.deductions_applied += 1;
        }
        if change.eliminated {
            self.members_eliminated += 1;
        }
        self.life_changes.push(change);
    }

    fn finish(&mut self) {
        if self.status == RunStatus::Completed && !self.errors.is_empty() {
            self.status = RunStatus::CompletedWithErrors;
        }
        self.finished_at = Some(Utc::now());
    }
}

/// Read-only view of where a league-week stands.
#[derive(Debug, Clone, Serialize)]
pub struct WeekStatus {
    pub league_id: Uuid,
    pub season: i32,
    pub week: i32,
    pub state: WeekState,
    pub games_total: usize,
    pub pending_games: Vec<PendingGame>,
    pub unresolved_picks: usize,
    pub pending_deductions: usize,
    pub missing_picks: usize,
}
