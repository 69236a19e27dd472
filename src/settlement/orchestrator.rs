use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::life_ledger::LifeLedger;
use super::resolver::PickResolver;
use super::sync::sync_week;
use super::{PendingGame, RunError, RunStatus, SettlementRun, WeekState, WeekStatus};
use crate::error::{AppError, AppResult};
use crate::notifications::{ActivitySink, NoopActivitySink};
use crate::score_feed::ScoreFeedClient;
use crate::store::models::League;
use crate::store::{MemoryStore, Store};

/// Runs the weekly pipeline for one league: sync scores, check readiness,
/// resolve picks, apply lives.
///
/// Every step is idempotent, so `settle` can be re-run or run concurrently
/// for the same league-week without double-charging anyone.
pub struct SettlementOrchestrator {
    store: Arc<dyn Store>,
    feed: Arc<dyn ScoreFeedClient>,
    sink: Arc<dyn ActivitySink>,
    feed_timeout: Duration,
}

impl SettlementOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        feed: Arc<dyn ScoreFeedClient>,
        sink: Arc<dyn ActivitySink>,
        feed_timeout: Duration,
    ) -> Self {
        Self {
            store,
            feed,
            sink,
            feed_timeout,
        }
    }

    /// Settle `week` of `season` for one league. Always returns a report;
    /// failures that stop the run show up as `RunStatus::Aborted`.
    ///
    /// A dry run executes the same pipeline against a private copy of the
    /// league-week, so its report is exactly what a live run would produce
    /// and nothing is persisted or announced.
    pub async fn settle(&self, league_id: Uuid, season: i32, week: i32, dry_run: bool) -> SettlementRun {
        let mut run = SettlementRun::new(league_id, season, week, dry_run);
        info!(
            "🏈 Settlement {} starting: league={} season={} week={}{}",
            run.run_id,
            league_id,
            season,
            week,
            if dry_run { " (dry run)" } else { "" }
        );

        if let Err(e) = self.execute(&mut run).await {
            error!("❌ Settlement {} aborted: {}", run.run_id, e);
            run.status = RunStatus::Aborted;
            run.errors.push(RunError::fatal(e.to_string()));
        }
        run.finish();

        info!(
            "🏁 Settlement {} {:?}: {} picks resolved, {} lives deducted, {} eliminated, {} errors",
            run.run_id,
            run.status,
            run.picks_resolved,
            run.deductions_applied,
            run.members_eliminated,
            run.errors.len()
        );
        run
    }

    async fn execute(&self, run: &mut SettlementRun) -> AppResult<()> {
        let league = self
            .store
            .get_league(run.league_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("League {} not found", run.league_id)))?;

        if league.season != run.season {
            return Err(AppError::InvalidInput(format!(
                "league {} plays season {}, not {}",
                league.id, league.season, run.season
            )));
        }

        if run.dry_run {
            let sandbox = MemoryStore::snapshot(self.store.as_ref(), &league, run.week).await?;
            let rehearsal = SettlementOrchestrator::new(
                Arc::new(sandbox),
                self.feed.clone(),
                Arc::new(NoopActivitySink),
                self.feed_timeout,
            );
            rehearsal.run_pipeline(&league, run).await
        } else {
            self.run_pipeline(&league, run).await
        }
    }

    async fn run_pipeline(&self, league: &League, run: &mut SettlementRun) -> AppResult<()> {
        let week = run.week;

        // 1. Sync. A feed failure is recorded; games already final still settle.
        let sync = sync_week(
            self.store.as_ref(),
            self.feed.as_ref(),
            self.feed_timeout,
            league.season,
            week,
        )
        .await;
        run.games_synced = sync.games_synced;
        run.games_changed = sync.games_changed;
        run.feed_entries_skipped = sync.entries_skipped;
        run.errors.extend(sync.errors);

        // 2. Readiness
        let games = self.store.games_for_week(league.season, week).await?;
        if games.is_empty() {
            warn!("⏳ League {} week {}: no games known yet", league.id, week);
            run.status = RunStatus::NotReady;
            run.week_state = Some(WeekState::Pending);
            return Ok(());
        }
        let pending: Vec<PendingGame> = games
            .iter()
            .filter(|g| !g.is_final)
            .map(PendingGame::from)
            .collect();
        if !pending.is_empty() {
            warn!(
                "⏳ League {} week {}: {} of {} games not final",
                league.id,
                week,
                pending.len(),
                games.len()
            );
            run.status = RunStatus::NotReady;
            run.week_state = Some(WeekState::Pending);
            run.pending_games = pending;
            return Ok(());
        }

        // 3. Resolve picks
        let resolver = PickResolver::new(self.store.clone());
        for game in &games {
            match resolver.resolve_for_league(game, league.id).await {
                Ok(outcome) => {
                    run.picks_resolved += outcome.resolved;
                    run.errors.extend(outcome.errors);
                }
                Err(e) => run.errors.push(RunError::game(game.id, e.to_string())),
            }
        }

        // 4. Lives
        let ledger = LifeLedger::new(self.store.clone(), self.sink.clone());
        let picks = self.store.picks_for_week(league.id, week).await?;
        let members = self.store.members_for_league(league.id).await?;

        for pick in &picks {
            if pick.is_correct.is_none() {
                run.errors.push(RunError::pick(
                    pick.id,
                    format!("no final game for team {:?} in week {}", pick.team_id, week),
                ));
                continue;
            }
            if !pick.awaiting_deduction() {
                continue;
            }
            match ledger.apply_result(pick).await {
                Ok(outcome) => {
                    if let Some(change) = outcome.change {
                        run.record_change(change);
                    }
                }
                Err(e) => run.errors.push(RunError::member(pick.user_id, e.to_string())),
            }
        }

        let picked: HashSet<Uuid> = picks.iter().map(|p| p.user_id).collect();
        for member in members.iter().filter(|m| !m.is_eliminated && !picked.contains(&m.user_id)) {
            match ledger.apply_missing_pick(member, week).await {
                Ok(outcome) => {
                    if let Some(change) = outcome.change {
                        run.record_change(change);
                    }
                }
                Err(e) => run.errors.push(RunError::member(member.user_id, e.to_string())),
            }
        }

        // 5. Where the week stands now
        run.week_state = Some(self.assess(league, week).await?.state);
        Ok(())
    }

    /// Read-only status of a league-week.
    pub async fn week_status(&self, league_id: Uuid, week: i32) -> AppResult<WeekStatus> {
        let league = self
            .store
            .get_league(league_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("League {} not found", league_id)))?;
        self.assess(&league, week).await
    }

    async fn assess(&self, league: &League, week: i32) -> AppResult<WeekStatus> {
        let games = self.store.games_for_week(league.season, week).await?;
        let picks = self.store.picks_for_week(league.id, week).await?;
        let members = self.store.members_for_league(league.id).await?;

        let pending_games: Vec<PendingGame> = games
            .iter()
            .filter(|g| !g.is_final)
            .map(PendingGame::from)
            .collect();
        let unresolved_picks = picks.iter().filter(|p| p.is_correct.is_none()).count();
        let pending_deductions = picks.iter().filter(|p| p.awaiting_deduction()).count();
        let picked: HashSet<Uuid> = picks.iter().map(|p| p.user_id).collect();
        let missing_picks = members
            .iter()
            .filter(|m| !m.is_eliminated && !picked.contains(&m.user_id))
            .count();

        let state = if games.is_empty() || !pending_games.is_empty() {
            WeekState::Pending
        } else if unresolved_picks > 0 || pending_deductions > 0 || missing_picks > 0 {
            WeekState::Ready
        } else {
            WeekState::Settled
        };

        Ok(WeekStatus {
            league_id: league.id,
            season: league.season,
            week,
            state,
            games_total: games.len(),
            pending_games,
            unresolved_picks,
            pending_deductions,
            missing_picks,
        })
    }
}
