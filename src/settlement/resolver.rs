use std::sync::Arc;
use tracing::{debug, info, warn};

use super::RunError;
use crate::error::{AppError, AppResult};
use crate::store::models::Game;
use crate::store::Store;
use uuid::Uuid;

/// Tally of one `resolve` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub resolved: usize,
    pub correct: usize,
    pub incorrect: usize,
    /// Picks another run resolved between our read and our write
    pub already_resolved: usize,
    pub errors: Vec<RunError>,
}

/// Whether picking `team_id` in a final `game` was correct. A tie is a loss
/// for both sides.
pub fn pick_is_correct(game: &Game, team_id: i32) -> Result<bool, String> {
    let (picked, opponent) = game
        .scores_for(team_id)
        .ok_or_else(|| format!("team {} did not play in game {}", team_id, game.id))?;

    match (picked, opponent) {
        (Some(picked), Some(opponent)) => Ok(picked > opponent),
        _ => Err(format!("final game {} is missing a score", game.id)),
    }
}

/// Marks picks correct or incorrect once their game is final. Only ever
/// writes `is_correct` on picks where it is still null.
pub struct PickResolver {
    store: Arc<dyn Store>,
}

impl PickResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve every league's picks on `game`.
    pub async fn resolve(&self, game: &Game) -> AppResult<ResolveOutcome> {
        self.resolve_picks(game, None).await
    }

    /// Resolve only `league_id`'s picks on `game`.
    pub async fn resolve_for_league(&self, game: &Game, league_id: Uuid) -> AppResult<ResolveOutcome> {
        self.resolve_picks(game, Some(league_id)).await
    }

    async fn resolve_picks(&self, game: &Game, league_id: Option<Uuid>) -> AppResult<ResolveOutcome> {
        if !game.is_final {
            return Err(AppError::Precondition(format!(
                "game {} is not final ({})",
                game.id, game.status_text
            )));
        }

        let picks = self.store.unresolved_picks_for_game(game, league_id).await?;
        let mut outcome = ResolveOutcome::default();

        for pick in picks {
            let Some(team_id) = pick.team_id else {
                continue;
            };

            let correct = match pick_is_correct(game, team_id) {
                Ok(correct) => correct,
                Err(message) => {
                    warn!("Cannot resolve pick {}: {}", pick.id, message);
                    outcome.errors.push(RunError::pick(pick.id, message));
                    continue;
                }
            };

            match self.store.resolve_pick(pick.id, game.id, correct).await {
                Ok(true) => {
                    outcome.resolved += 1;
                    if correct {
                        outcome.correct += 1;
                    } else {
                        outcome.incorrect += 1;
                    }
                }
                Ok(false) => {
                    debug!("Pick {} already resolved", pick.id);
                    outcome.already_resolved += 1;
                }
                Err(e) => {
                    warn!("Failed to resolve pick {}: {}", pick.id, e);
                    outcome.errors.push(RunError::pick(pick.id, e.to_string()));
                }
            }
        }

        if outcome.resolved > 0 {
            info!(
                "✅ Game {}: resolved {} picks ({} correct, {} incorrect)",
                game.id, outcome.resolved, outcome.correct, outcome.incorrect
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::Pick;
    use crate::store::{GameStore, MemoryStore, PickStore};
    use crate::testing::{final_result, league, pending_result};

    async fn setup(result: crate::store::models::GameResult) -> (Arc<MemoryStore>, Game, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let league = league(2026, 2);
        store.insert_league(league.clone()).await;
        let game = store.upsert_game(&result).await.unwrap().game;
        (store, game, league.id)
    }

    #[test]
    fn test_winner_correct_loser_incorrect() {
        let game = Game::from_result(&final_result(2026, 3, 1, 2, 10, 24), chrono::Utc::now());
        assert_eq!(pick_is_correct(&game, 2), Ok(true));
        assert_eq!(pick_is_correct(&game, 1), Ok(false));
        assert!(pick_is_correct(&game, 9).is_err());
    }

    #[test]
    fn test_tie_is_loss_for_both() {
        let game = Game::from_result(&final_result(2026, 3, 1, 2, 17, 17), chrono::Utc::now());
        assert_eq!(pick_is_correct(&game, 1), Ok(false));
        assert_eq!(pick_is_correct(&game, 2), Ok(false));
    }

    #[tokio::test]
    async fn test_resolves_each_pick_once() {
        let (store, game, league_id) = setup(final_result(2026, 3, 1, 2, 10, 24)).await;
        let loser = Pick::new(league_id, Uuid::new_v4(), 3, 1, Some(game.id));
        let winner = Pick::new(league_id, Uuid::new_v4(), 3, 2, None);
        store.insert_pick(loser.clone()).await.unwrap();
        store.insert_pick(winner.clone()).await.unwrap();

        let resolver = PickResolver::new(store.clone());
        let first = resolver.resolve(&game).await.unwrap();
        assert_eq!(first.resolved, 2);
        assert_eq!(first.correct, 1);
        assert_eq!(first.incorrect, 1);

        let second = resolver.resolve(&game).await.unwrap();
        assert_eq!(second.resolved, 0);

        assert_eq!(store.get_pick(loser.id).await.unwrap().is_correct, Some(false));
        let winner = store.get_pick(winner.id).await.unwrap();
        assert_eq!(winner.is_correct, Some(true));
        assert_eq!(winner.game_id, Some(game.id));
    }

    #[tokio::test]
    async fn test_rejects_non_final_game() {
        let (store, game, league_id) = setup(pending_result(2026, 3, 1, 2)).await;
        store
            .insert_pick(Pick::new(league_id, Uuid::new_v4(), 3, 1, Some(game.id)))
            .await
            .unwrap();

        let resolver = PickResolver::new(store.clone());
        assert!(matches!(
            resolver.resolve(&game).await,
            Err(AppError::Precondition(_))
        ));
        assert_eq!(store.picks_for_week(league_id, 3).await.unwrap()[0].is_correct, None);
    }

    #[tokio::test]
    async fn test_league_scoped_resolution_leaves_other_leagues() {
        let (store, game, league_id) = setup(final_result(2026, 3, 1, 2, 10, 24)).await;
        let other = league(2026, 2);
        store.insert_league(other.clone()).await;
        let mine = Pick::new(league_id, Uuid::new_v4(), 3, 1, None);
        let theirs = Pick::new(other.id, Uuid::new_v4(), 3, 1, None);
        store.insert_pick(mine.clone()).await.unwrap();
        store.insert_pick(theirs.clone()).await.unwrap();

        let resolver = PickResolver::new(store.clone());
        let scoped = resolver.resolve_for_league(&game, league_id).await.unwrap();
        assert_eq!(scoped.resolved, 1);
        assert_eq!(store.get_pick(mine.id).await.unwrap().is_correct, Some(false));
        assert_eq!(store.get_pick(theirs.id).await.unwrap().is_correct, None);

        let everyone = resolver.resolve(&game).await.unwrap();
        assert_eq!(everyone.resolved, 1);
        assert_eq!(store.get_pick(theirs.id).await.unwrap().is_correct, Some(false));
    }
}
