use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::notifications::{announce, ActivitySink};
use crate::store::models::{
    CommitOutcome, DeductionClaim, League, LeagueMember, LifeChange, LossReason, Pick, Standing,
};
use crate::store::Store;

/// Retries when another writer moved the member row between read and write
const MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub deducted: bool,
    pub eliminated: bool,
    /// None when nothing was applied (claim already taken, or nothing owed)
    pub change: Option<LifeChange>,
}

/// Standing after one lost week. Lives floor at zero, and an elimination
/// week, once set, is kept.
pub fn standing_after_loss(current: Standing, week: i32) -> Standing {
    if current.is_eliminated {
        return current;
    }
    let lives_remaining = (current.lives_remaining - 1).max(0);
    if lives_remaining == 0 {
        Standing {
            lives_remaining,
            is_eliminated: true,
            eliminated_week: current.eliminated_week.or(Some(week)),
        }
    } else {
        Standing {
            lives_remaining,
            ..current
        }
    }
}

/// Standing after a manual adjustment by `delta`, clamped to
/// `0..=starting_lives`. Reaching zero eliminates; climbing out of zero
/// reinstates and clears the elimination week.
pub fn standing_after_adjustment(current: Standing, delta: i32, starting_lives: i32, week: i32) -> Standing {
    let lives_remaining = current
        .lives_remaining
        .saturating_add(delta)
        .clamp(0, starting_lives.max(0));
    if lives_remaining == 0 {
        Standing {
            lives_remaining,
            is_eliminated: true,
            eliminated_week: current.eliminated_week.or(Some(week)),
        }
    } else {
        Standing {
            lives_remaining,
            is_eliminated: false,
            eliminated_week: None,
        }
    }
}

/// The only writer of member lives. Each deduction is tied to a claim (an
/// incorrect pick or a missing-pick row) so it lands at most once no matter
/// how many runs overlap.
pub struct LifeLedger {
    store: Arc<dyn Store>,
    sink: Arc<dyn ActivitySink>,
}

impl LifeLedger {
    pub fn new(store: Arc<dyn Store>, sink: Arc<dyn ActivitySink>) -> Self {
        Self { store, sink }
    }

    /// Charge one life for an incorrect pick. Correct and unresolved picks
    /// are a no-op.
    pub async fn apply_result(&self, pick: &Pick) -> AppResult<LedgerOutcome> {
        if !pick.awaiting_deduction() {
            return Ok(LedgerOutcome::default());
        }
        let claim = DeductionClaim::ResolvedPick { pick_id: pick.id };
        self.charge(pick.league_id, pick.user_id, claim, pick.week, LossReason::IncorrectPick)
            .await
    }

    /// Charge one life to a member who made no pick for `week`.
    pub async fn apply_missing_pick(&self, member: &LeagueMember, week: i32) -> AppResult<LedgerOutcome> {
        let claim = DeductionClaim::MissingPick {
            league_id: member.league_id,
            user_id: member.user_id,
            week,
        };
        self.charge(member.league_id, member.user_id, claim, week, LossReason::MissingPick)
            .await
    }

    async fn charge(
        &self,
        league_id: Uuid,
        user_id: Uuid,
        claim: DeductionClaim,
        week: i32,
        reason: LossReason,
    ) -> AppResult<LedgerOutcome> {
        for attempt in 1..=MAX_ATTEMPTS {
            let member = self
                .store
                .get_member(league_id, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Member {} in league {}", user_id, league_id)))?;

            let expected = member.standing();
            let next = standing_after_loss(expected, week);

            match self
                .store
                .commit_life_change(league_id, user_id, claim, expected, next)
                .await?
            {
                CommitOutcome::Applied { pick_id } => {
                    let change = LifeChange {
                        league_id,
                        user_id,
                        pick_id: Some(pick_id),
                        week,
                        reason,
                        lives_before: expected.lives_remaining,
                        lives_after: next.lives_remaining,
                        eliminated: next.is_eliminated && !expected.is_eliminated,
                    };
                    if change.deducted() {
                        info!(
                            "💔 League {} user {} week {}: {} ({} -> {} lives)",
                            league_id, user_id, week, reason, change.lives_before, change.lives_after
                        );
                    }
                    if change.eliminated {
                        info!("☠️ League {} user {} eliminated in week {}", league_id, user_id, week);
                    }
                    announce(self.sink.as_ref(), &change).await;

                    return Ok(LedgerOutcome {
                        deducted: change.deducted(),
                        eliminated: change.eliminated,
                        change: Some(change),
                    });
                }
                CommitOutcome::AlreadyApplied => {
                    debug!("Deduction for {:?} already applied", claim);
                    return Ok(LedgerOutcome::default());
                }
                CommitOutcome::StandingChanged => {
                    debug!(
                        "Standing for user {} changed underneath us (attempt {}/{})",
                        user_id, attempt, MAX_ATTEMPTS
                    );
                }
            }
        }

        Err(AppError::Conflict(format!(
            "member {} in league {} kept changing; deduction not applied",
            user_id, league_id
        )))
    }

    /// Administrative correction of a member's lives. Not part of weekly
    /// settlement and not reachable over HTTP.
    pub async fn adjust_lives(&self, league: &League, user_id: Uuid, delta: i32, week: i32) -> AppResult<LifeChange> {
        for _ in 0..MAX_ATTEMPTS {
            let member = self
                .store
                .get_member(league.id, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Member {} in league {}", user_id, league.id)))?;

            let expected = member.standing();
            let next = standing_after_adjustment(expected, delta, league.starting_lives, week);
            let change = LifeChange {
                league_id: league.id,
                user_id,
                pick_id: None,
                week,
                reason: LossReason::ManualAdjustment,
                lives_before: expected.lives_remaining,
                lives_after: next.lives_remaining,
                eliminated: next.is_eliminated && !expected.is_eliminated,
            };
            if next == expected {
                return Ok(change);
            }

            if self.store.swap_standing(league.id, user_id, expected, next).await? {
                info!(
                    "🛠️ League {} user {}: lives adjusted {} -> {}",
                    league.id, user_id, change.lives_before, change.lives_after
                );
                announce(self.sink.as_ref(), &change).await;
                return Ok(change);
            }
        }

        Err(AppError::Conflict(format!(
            "member {} in league {} kept changing; adjustment not applied",
            user_id, league.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::ActivityKind;
    use crate::store::{MemberStore, MemoryStore, PickStore};
    use crate::testing::{league, member, FailingSink, RecordingSink};

    fn standing(lives: i32) -> Standing {
        Standing {
            lives_remaining: lives,
            is_eliminated: lives == 0,
            eliminated_week: None,
        }
    }

    #[test]
    fn test_loss_floors_at_zero() {
        let next = standing_after_loss(standing(1), 4);
        assert_eq!(next.lives_remaining, 0);
        assert!(next.is_eliminated);
        assert_eq!(next.eliminated_week, Some(4));

        let eliminated = Standing {
            eliminated_week: Some(4),
            ..next
        };
        assert_eq!(standing_after_loss(eliminated, 6), eliminated);
    }

    #[test]
    fn test_adjustment_clamps_and_reinstates() {
        let up = standing_after_adjustment(standing(2), 5, 3, 5);
        assert_eq!(up.lives_remaining, 3);

        let down = standing_after_adjustment(standing(2), -5, 3, 5);
        assert_eq!(down, Standing {
            lives_remaining: 0,
            is_eliminated: true,
            eliminated_week: Some(5),
        });

        let back = standing_after_adjustment(down, 1, 3, 6);
        assert_eq!(back, standing(1));
    }

    async fn setup(lives: i32) -> (Arc<MemoryStore>, League, LeagueMember) {
        let store = Arc::new(MemoryStore::new());
        let league = league(2026, lives);
        store.insert_league(league.clone()).await;
        let m = member(&league);
        store.insert_member(m.clone()).await;
        (store, league, m)
    }

    #[tokio::test]
    async fn test_incorrect_pick_deducts_once() {
        let (store, league, m) = setup(2).await;
        let mut pick = Pick::new(league.id, m.user_id, 3, 1, None);
        pick.is_correct = Some(false);
        store.insert_pick(pick.clone()).await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let ledger = LifeLedger::new(store.clone(), sink.clone());

        let first = ledger.apply_result(&pick).await.unwrap();
        assert!(first.deducted);
        assert!(!first.eliminated);

        // Same stale pick value handed in again: the claim is gone.
        let second = ledger.apply_result(&pick).await.unwrap();
        assert!(!second.deducted);

        let after = store.get_member(league.id, m.user_id).await.unwrap().unwrap();
        assert_eq!(after.lives_remaining, 1);
        assert!(store.get_pick(pick.id).await.unwrap().life_applied);

        let events = sink.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ActivityKind::LifeLost);
    }

    #[tokio::test]
    async fn test_correct_pick_is_noop() {
        let (store, league, m) = setup(2).await;
        let mut pick = Pick::new(league.id, m.user_id, 3, 1, None);
        pick.is_correct = Some(true);
        store.insert_pick(pick.clone()).await.unwrap();

        let ledger = LifeLedger::new(store.clone(), Arc::new(RecordingSink::default()));
        assert_eq!(ledger.apply_result(&pick).await.unwrap(), LedgerOutcome::default());
        assert_eq!(
            store.get_member(league.id, m.user_id).await.unwrap().unwrap().lives_remaining,
            2
        );
    }

    #[tokio::test]
    async fn test_missing_pick_eliminates_and_records_week() {
        let (store, league, m) = setup(1).await;
        let ledger = LifeLedger::new(store.clone(), Arc::new(FailingSink));

        let outcome = ledger.apply_missing_pick(&m, 4).await.unwrap();
        assert!(outcome.deducted);
        assert!(outcome.eliminated);
        assert_eq!(outcome.change.unwrap().reason, LossReason::MissingPick);

        let after = store.get_member(league.id, m.user_id).await.unwrap().unwrap();
        assert_eq!(after.lives_remaining, 0);
        assert!(after.is_eliminated);
        assert_eq!(after.eliminated_week, Some(4));

        let auto = store.picks_for_week(league.id, 4).await.unwrap();
        assert_eq!(auto.len(), 1);
        assert!(auto[0].auto_loss);

        assert_eq!(ledger.apply_missing_pick(&m, 4).await.unwrap(), LedgerOutcome::default());
    }

    #[tokio::test]
    async fn test_eliminated_week_is_never_overwritten() {
        let (store, league, m) = setup(1).await;
        let ledger = LifeLedger::new(store.clone(), Arc::new(RecordingSink::default()));
        ledger.apply_missing_pick(&m, 4).await.unwrap();

        // A later loss on an eliminated member keeps the floor and the week.
        let outcome = ledger.apply_missing_pick(&m, 6).await.unwrap();
        assert!(!outcome.deducted);
        assert!(!outcome.eliminated);

        let after = store.get_member(league.id, m.user_id).await.unwrap().unwrap();
        assert_eq!(after.lives_remaining, 0);
        assert_eq!(after.eliminated_week, Some(4));
    }

    #[tokio::test]
    async fn test_concurrent_deductions_apply_once_each() {
        let (store, league, m) = setup(3).await;
        let ledger = Arc::new(LifeLedger::new(store.clone(), Arc::new(RecordingSink::default())));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let m = m.clone();
            handles.push(tokio::spawn(async move { ledger.apply_missing_pick(&m, 2).await }));
        }
        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().deducted {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        let after = store.get_member(league.id, m.user_id).await.unwrap().unwrap();
        assert_eq!(after.lives_remaining, 2);
    }

    #[tokio::test]
    async fn test_adjust_lives_reinstates_member() {
        let (store, league, m) = setup(2).await;
        let sink = Arc::new(RecordingSink::default());
        let ledger = LifeLedger::new(store.clone(), sink.clone());

        let down = ledger.adjust_lives(&league, m.user_id, -2, 5).await.unwrap();
        assert!(down.eliminated);

        let up = ledger.adjust_lives(&league, m.user_id, 1, 5).await.unwrap();
        assert_eq!(up.lives_after, 1);

        let after = store.get_member(league.id, m.user_id).await.unwrap().unwrap();
        assert!(!after.is_eliminated);
        assert_eq!(after.eliminated_week, None);

        let kinds: Vec<_> = sink.events().await.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ActivityKind::LivesAdjusted, ActivityKind::Eliminated, ActivityKind::LivesAdjusted]
        );
    }
}
