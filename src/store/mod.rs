// Persistence layer: entity stores used by the settlement engine.
//
// Every write path is a conditional mutation so that overlapping runs are
// safe without a lock manager.
pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use models::*;

/// Result of one game upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameUpsert {
    pub game: Game,
    /// Score or finality differs from what was stored (true for new rows)
    pub changed: bool,
    pub became_final: bool,
}

#[async_trait]
pub trait GameStore: Send + Sync {
    /// Insert or update by external id, falling back to the natural key.
    /// The whole row is written at once; a final row stays final.
    async fn upsert_game(&self, result: &GameResult) -> AppResult<GameUpsert>;

    async fn games_for_week(&self, season: i32, week: i32) -> AppResult<Vec<Game>>;
}

#[async_trait]
pub trait PickStore: Send + Sync {
    /// Unresolved picks on `game`, including picks without a game link whose
    /// team played in it that week. `league_id` narrows to one league.
    async fn unresolved_picks_for_game(&self, game: &Game, league_id: Option<Uuid>) -> AppResult<Vec<Pick>>;

    /// Set `is_correct` only if it is still null. Returns whether this call
    /// performed the write.
    async fn resolve_pick(&self, pick_id: Uuid, game_id: Uuid, is_correct: bool) -> AppResult<bool>;

    async fn picks_for_week(&self, league_id: Uuid, week: i32) -> AppResult<Vec<Pick>>;
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn get_member(&self, league_id: Uuid, user_id: Uuid) -> AppResult<Option<LeagueMember>>;

    async fn members_for_league(&self, league_id: Uuid) -> AppResult<Vec<LeagueMember>>;

    /// Take `claim` and swap the member's standing from `expected` to `next`,
    /// both or neither.
    async fn commit_life_change(
        &self,
        league_id: Uuid,
        user_id: Uuid,
        claim: DeductionClaim,
        expected: Standing,
        next: Standing,
    ) -> AppResult<CommitOutcome>;

    /// Compare-and-swap on the standing alone. Returns whether it applied.
    async fn swap_standing(
        &self,
        league_id: Uuid,
        user_id: Uuid,
        expected: Standing,
        next: Standing,
    ) -> AppResult<bool>;
}

#[async_trait]
pub trait LeagueStore: Send + Sync {
    async fn get_league(&self, league_id: Uuid) -> AppResult<Option<League>>;

    async fn leagues_for_season(&self, season: i32) -> AppResult<Vec<League>>;
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn list_teams(&self) -> AppResult<Vec<Team>>;
}

/// Everything the engine needs from persistence.
pub trait Store: GameStore + PickStore + MemberStore + LeagueStore + TeamStore {
    fn backend_name(&self) -> &'static str;
}
