use std::{sync::Arc, time::Duration};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, warn};
use crate::{
    api::handler::AppState,
    config::Config,
    error::AppResult,
    notifications::{ActivitySink, LogActivitySink, PgActivitySink},
    score_feed::{nfl_teams, EspnScoreFeed, ScoreFeedClient, TeamRegistry},
    settlement::{LiveScorePoller, SchedulerConfig, SeasonCalendar, SettlementOrchestrator, SettlementScheduler},
    store::{MemoryStore, PgStore, Store},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Persistence and activity outbox
    let (store, sink): (Arc<dyn Store>, Arc<dyn ActivitySink>) = match &config.database_url {
        Some(database_url) => {
            let pool = initialize_database(database_url).await?;
            (
                Arc::new(PgStore::new(pool.clone())),
                Arc::new(PgActivitySink::new(pool)),
            )
        }
        None => {
            warn!("⚠️  DATABASE_URL not set - using in-memory store, nothing survives a restart");
            let store = MemoryStore::new();
            for team in nfl_teams() {
                store.insert_team(team).await;
            }
            (Arc::new(store), Arc::new(LogActivitySink))
        }
    };
    info!("✅ {} store initialized", store.backend_name());

    // Score feed
    let registry = Arc::new(TeamRegistry::from_teams(&store.list_teams().await?));
    if registry.is_empty() {
        warn!("⚠️  Team registry is empty - every feed entry will be skipped");
    }
    let feed: Arc<dyn ScoreFeedClient> = Arc::new(EspnScoreFeed::new(
        config.score_feed_url.clone(),
        config.feed_timeout(),
        registry.clone(),
    )?);
    info!(
        "✅ Score feed {} initialized ({} teams, {}s timeout)",
        feed.name(),
        registry.len(),
        config.feed_timeout_secs
    );

    // Settlement engine
    let orchestrator = Arc::new(SettlementOrchestrator::new(
        store.clone(),
        feed.clone(),
        sink,
        config.feed_timeout(),
    ));
    let poller = Arc::new(LiveScorePoller::new(store.clone(), feed, config.feed_timeout()));
    let calendar = SeasonCalendar::new(config.season, config.season_start_date, config.regular_season_weeks);
    info!(
        "✅ Settlement engine initialized for season {} (currently week {})",
        calendar.season,
        calendar.current_week(chrono::Utc::now())
    );

    if config.scheduler_enabled {
        let scheduler = SettlementScheduler::new(
            SchedulerConfig {
                settle_weekday: config.settle_weekday,
                settle_hour: config.settle_hour,
                live_poll_interval: config.live_poll_interval(),
            },
            calendar,
            store.clone(),
            orchestrator.clone(),
            poller.clone(),
        );
        scheduler.start();
        info!(
            "✅ Scheduler started (settle {:?} {:02}:00 UTC, live poll every {}s)",
            config.settle_weekday, config.settle_hour, config.live_poll_interval_secs
        );
    } else {
        info!("Scheduler disabled - settlement runs on request only");
    }

    Ok(AppState {
        store,
        orchestrator,
        poller,
        calendar,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 20 max connections");

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
