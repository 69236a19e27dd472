// Settlement Scheduler - drives the engine without an HTTP caller
//
// Weekly cycle:
// - Fires once a week at the configured weekday/hour (UTC), after the last
//   game of the week (Tuesday morning by default)
// - Settles the week that contained yesterday for every league of the season
// - Leagues run concurrently; each settlement is idempotent on its own
//
// Live cycle:
// - Polls the current week every `live_poll_interval`
// - Only resolves picks; lives are left to the weekly cycle

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc, Weekday};
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use super::{LiveScorePoller, RunStatus, SeasonCalendar, SettlementOrchestrator, SettlementRun};
use crate::error::AppResult;
use crate::store::Store;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub settle_weekday: Weekday,
    /// UTC hour to run weekly settlement (0-23)
    pub settle_hour: u32,
    pub live_poll_interval: Duration,
}

/// Background driver for weekly settlement and live polling
pub struct SettlementScheduler {
    config: SchedulerConfig,
    calendar: SeasonCalendar,
    store: Arc<dyn Store>,
    orchestrator: Arc<SettlementOrchestrator>,
    poller: Arc<LiveScorePoller>,
}

impl SettlementScheduler {
    pub fn new(
        config: SchedulerConfig,
        calendar: SeasonCalendar,
        store: Arc<dyn Store>,
        orchestrator: Arc<SettlementOrchestrator>,
        poller: Arc<LiveScorePoller>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            calendar,
            store,
            orchestrator,
            poller,
        })
    }

    /// Start both cycles (runs in background)
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let weekly = {
            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.run_weekly_scheduler().await })
        };
        let live = {
            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.run_live_scheduler().await })
        };
        vec![weekly, live]
    }

    async fn run_weekly_scheduler(&self) {
        loop {
            let now = Utc::now();
            let Some(next_execution) =
                calculate_next_weekly_execution(now, self.config.settle_weekday, self.config.settle_hour)
            else {
                error!("❌ Invalid settlement hour {}; weekly scheduler stopped", self.config.settle_hour);
                return;
            };

            let wait = next_execution.signed_duration_since(now);
            if wait.num_seconds() > 0 {
                info!(
                    "⏰ Next weekly settlement scheduled for: {} UTC",
                    next_execution.format("%a %Y-%m-%d %H:%M")
                );
                tokio::time::sleep(Duration::from_secs(wait.num_seconds() as u64)).await;
            }

            let week = self.calendar.completed_week(Utc::now());
            info!("🔄 Starting weekly settlement cycle for week {}", week);
            match self.settle_season_week(self.calendar.season, week).await {
                Ok(runs) => {
                    let not_ready = runs.iter().filter(|r| r.status == RunStatus::NotReady).count();
                    let failed = runs.iter().filter(|r| r.status == RunStatus::Aborted).count();
                    if not_ready > 0 {
                        warn!("⏳ {} leagues not ready for week {}; re-run once games are final", not_ready, week);
                    }
                    if failed > 0 {
                        error!("❌ {} league settlements aborted for week {}", failed, week);
                    }
                    info!("✓ Weekly settlement cycle completed ({} leagues)", runs.len());
                }
                Err(e) => error!("❌ Weekly settlement cycle failed: {:?}", e),
            }
        }
    }

    async fn run_live_scheduler(&self) {
        let mut interval = interval(self.config.live_poll_interval);

        loop {
            interval.tick().await;
            let week = self.calendar.current_week(Utc::now());
            self.poller.poll(self.calendar.season, week).await;
        }
    }

    /// Settle one week for every league in the season.
    pub async fn settle_season_week(&self, season: i32, week: i32) -> AppResult<Vec<SettlementRun>> {
        let leagues = self.store.leagues_for_season(season).await?;
        let runs = join_all(
            leagues
                .iter()
                .map(|league| self.orchestrator.settle(league.id, season, week, false)),
        )
        .await;
        Ok(runs)
    }
}

/// Next occurrence of `weekday` at `hour:00` UTC strictly after `now`.
pub fn calculate_next_weekly_execution(now: DateTime<Utc>, weekday: Weekday, hour: u32) -> Option<DateTime<Utc>> {
    let days_ahead = (7 + weekday.num_days_from_monday() as i64
        - now.weekday().num_days_from_monday() as i64)
        % 7;
    let date = now.date_naive() + ChronoDuration::days(days_ahead);
    let candidate = Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0)?);

    // Same weekday but the hour has passed: next week
    if candidate <= now {
        Some(candidate + ChronoDuration::days(7))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;
    use crate::notifications::NoopActivitySink;
    use crate::testing::{final_result, Scenario, ScriptedFeed};

    #[test]
    fn test_calculate_next_weekly_execution() {
        // Current time: Monday 2026-09-28 10:00:00 UTC
        let now = Utc.with_ymd_and_hms(2026, 9, 28, 10, 0, 0).unwrap();

        // Tuesday 10:00 is tomorrow
        let next = calculate_next_weekly_execution(now, Weekday::Tue, 10).unwrap();
        assert_eq!(next.weekday(), Weekday::Tue);
        assert_eq!(next.day(), 29);

        // Monday 14:00 is later today
        let next = calculate_next_weekly_execution(now, Weekday::Mon, 14).unwrap();
        assert_eq!(next.hour(), 14);
        assert_eq!(next.day(), 28);

        // Monday 09:00 already passed, so next week
        let next = calculate_next_weekly_execution(now, Weekday::Mon, 9).unwrap();
        assert_eq!(next.day(), 5);
        assert_eq!(next.month(), 10);

        assert!(calculate_next_weekly_execution(now, Weekday::Mon, 24).is_none());
    }

    #[tokio::test]
    async fn test_settles_every_league_of_the_season() {
        let first = Scenario::new(2).await;
        let user = first.add_member().await;
        first.pick(user, 3, 9).await;
        let second = first.add_league(1).await;
        let store: Arc<dyn Store> = first.store.clone();

        let feed = Arc::new(ScriptedFeed::ok(vec![final_result(2026, 3, 26, 9, 24, 10)]));
        let orchestrator = Arc::new(SettlementOrchestrator::new(
            store.clone(),
            feed.clone(),
            Arc::new(NoopActivitySink),
            Duration::from_secs(1),
        ));
        let poller = Arc::new(LiveScorePoller::new(store.clone(), feed, Duration::from_secs(1)));
        let calendar = SeasonCalendar::new(2026, chrono::NaiveDate::from_ymd_opt(2026, 9, 8).unwrap(), 18);
        let scheduler = SettlementScheduler::new(
            SchedulerConfig {
                settle_weekday: Weekday::Tue,
                settle_hour: 10,
                live_poll_interval: Duration::from_secs(300),
            },
            calendar,
            store,
            orchestrator,
            poller,
        );

        let runs = scheduler.settle_season_week(2026, 3).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.status == RunStatus::Completed));
        let league_ids: Vec<_> = runs.iter().map(|r| r.league_id).collect();
        assert!(league_ids.contains(&first.league.id));
        assert!(league_ids.contains(&second.id));
    }
}
