// Activity notifications for life deductions and eliminations.
//
// Delivery (email, push) happens elsewhere and reads the activity_events
// outbox. A sink failure is logged and never rolls back a settlement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::store::models::LifeChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    LifeLost,
    Eliminated,
    LivesAdjusted,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::LifeLost => "life_lost",
            ActivityKind::Eliminated => "eliminated",
            ActivityKind::LivesAdjusted => "lives_adjusted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub league_id: Uuid,
    pub user_id: Uuid,
    pub kind: ActivityKind,
    pub week: i32,
    pub lives_before: i32,
    pub lives_after: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    /// Events describing one life change: a deduction, an elimination, or both.
    pub fn from_change(change: &LifeChange) -> Vec<ActivityEvent> {
        let event = |kind| ActivityEvent {
            id: Uuid::new_v4(),
            league_id: change.league_id,
            user_id: change.user_id,
            kind,
            week: change.week,
            lives_before: change.lives_before,
            lives_after: change.lives_after,
            reason: change.reason.to_string(),
            created_at: Utc::now(),
        };

        let mut events = Vec::new();
        if change.reason == crate::store::models::LossReason::ManualAdjustment {
            events.push(event(ActivityKind::LivesAdjusted));
        } else if change.deducted() {
            events.push(event(ActivityKind::LifeLost));
        }
        if change.eliminated {
            events.push(event(ActivityKind::Eliminated));
        }
        events
    }
}

#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, event: &ActivityEvent) -> AppResult<()>;
}

/// Emit the events for `change`, swallowing sink failures.
pub async fn announce(sink: &dyn ActivitySink, change: &LifeChange) {
    for event in ActivityEvent::from_change(change) {
        if let Err(e) = sink.record(&event).await {
            warn!(
                "⚠️ Activity sink failed for user {} ({}): {}",
                event.user_id,
                event.kind.as_str(),
                e
            );
        }
    }
}

/// Writes events to the `activity_events` outbox table
pub struct PgActivitySink {
    pool: PgPool,
}

impl PgActivitySink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivitySink for PgActivitySink {
    async fn record(&self, event: &ActivityEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_events
                (id, league_id, user_id, kind, week, lives_before, lives_after, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(event.league_id)
        .bind(event.user_id)
        .bind(event.kind.as_str())
        .bind(event.week)
        .bind(event.lives_before)
        .bind(event.lives_after)
        .bind(&event.reason)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Logs events only; used when no database is configured
pub struct LogActivitySink;

#[async_trait]
impl ActivitySink for LogActivitySink {
    async fn record(&self, event: &ActivityEvent) -> AppResult<()> {
        info!(
            "📣 {} league={} user={} week={} lives {} -> {} ({})",
            event.kind.as_str(),
            event.league_id,
            event.user_id,
            event.week,
            event.lives_before,
            event.lives_after,
            event.reason
        );
        Ok(())
    }
}

/// Discards events; used by dry runs
pub struct NoopActivitySink;

#[async_trait]
impl ActivitySink for NoopActivitySink {
    async fn record(&self, _event: &ActivityEvent) -> AppResult<()> {
        Ok(())
    }
}
