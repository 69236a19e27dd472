use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::resolver::PickResolver;
use super::sync::sync_week;
use super::RunError;
use crate::score_feed::ScoreFeedClient;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct LivePollReport {
    pub season: i32,
    pub week: i32,
    pub games_updated: usize,
    pub games_live: usize,
    pub games_completed: usize,
    pub picks_resolved: usize,
    pub feed_entries_skipped: usize,
    pub errors: Vec<RunError>,
}

/// Keeps game rows current during game windows and resolves picks as soon
/// as their game goes final. Lives are only ever touched by settlement.
pub struct LiveScorePoller {
    store: Arc<dyn Store>,
    feed: Arc<dyn ScoreFeedClient>,
    resolver: PickResolver,
    feed_timeout: Duration,
}

impl LiveScorePoller {
    pub fn new(store: Arc<dyn Store>, feed: Arc<dyn ScoreFeedClient>, feed_timeout: Duration) -> Self {
        Self {
            resolver: PickResolver::new(store.clone()),
            store,
            feed,
            feed_timeout,
        }
    }

    pub async fn poll(&self, season: i32, week: i32) -> LivePollReport {
        let sync = sync_week(self.store.as_ref(), self.feed.as_ref(), self.feed_timeout, season, week).await;

        let mut report = LivePollReport {
            season,
            week,
            games_updated: sync.games_changed,
            games_live: sync.games_live,
            games_completed: sync.newly_final.len(),
            picks_resolved: 0,
            feed_entries_skipped: sync.entries_skipped,
            errors: sync.errors,
        };

        for game in &sync.newly_final {
            match self.resolver.resolve(game).await {
                Ok(outcome) => {
                    report.picks_resolved += outcome.resolved;
                    report.errors.extend(outcome.errors);
                }
                Err(e) => report.errors.push(RunError::game(game.id, e.to_string())),
            }
        }

        info!(
            "📺 Live poll season={} week={}: {} updated, {} live, {} completed, {} picks resolved",
            season, week, report.games_updated, report.games_live, report.games_completed, report.picks_resolved
        );
        report
    }
}
