use std::time::Duration;
use tracing::{debug, warn};

use super::RunError;
use crate::error::FeedError;
use crate::score_feed::ScoreFeedClient;
use crate::store::models::Game;
use crate::store::Store;

/// Outcome of pulling one week from the feed into the game store.
#[derive(Debug, Default)]
pub struct WeekSync {
    pub games_synced: usize,
    pub games_changed: usize,
    pub games_live: usize,
    pub newly_final: Vec<Game>,
    pub entries_skipped: usize,
    pub errors: Vec<RunError>,
}

/// Fetch with a deadline and upsert every result. Feed failures and
/// per-game write failures are collected, never raised.
pub async fn sync_week(
    store: &dyn Store,
    feed: &dyn ScoreFeedClient,
    timeout: Duration,
    season: i32,
    week: i32,
) -> WeekSync {
    let mut sync = WeekSync::default();

    let batch = match tokio::time::timeout(timeout, feed.fetch(season, week)).await {
        Ok(Ok(batch)) => batch,
        Ok(Err(e)) => {
            warn!("⚠️ Feed {} failed for season={} week={}: {}", feed.name(), season, week, e);
            sync.errors.push(RunError::feed(e.to_string()));
            return sync;
        }
        Err(_) => {
            let e = FeedError::Timeout(timeout.as_millis() as u64);
            warn!("⚠️ Feed {} timed out for season={} week={}", feed.name(), season, week);
            sync.errors.push(RunError::feed(e.to_string()));
            return sync;
        }
    };

    sync.entries_skipped = batch.skipped.len();
    for skipped in &batch.skipped {
        sync.errors.push(RunError::new(
            super::ErrorScope::Feed,
            skipped.external_id.clone(),
            format!("skipped feed entry: {}", skipped.reason),
        ));
    }

    for result in &batch.results {
        match store.upsert_game(result).await {
            Ok(upsert) => {
                sync.games_synced += 1;
                if upsert.changed {
                    sync.games_changed += 1;
                }
                if upsert.game.is_live() {
                    sync.games_live += 1;
                }
                if upsert.became_final {
                    debug!("Game {} became final", upsert.game.id);
                    sync.newly_final.push(upsert.game);
                }
            }
            Err(e) => {
                let key = result
                    .external_id
                    .clone()
                    .unwrap_or_else(|| format!("{}@{}", result.away_team_id, result.home_team_id));
                warn!("Failed to upsert game {}: {}", key, e);
                sync.errors.push(RunError::game(key, e.to_string()));
            }
        }
    }

    sync
}
