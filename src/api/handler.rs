use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    middleware::validate_params,
    settlement::{
        LivePollReport, LiveScorePoller, RunStatus, SeasonCalendar, SettlementOrchestrator, SettlementRun,
        WeekStatus,
    },
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub orchestrator: Arc<SettlementOrchestrator>,
    pub poller: Arc<LiveScorePoller>,
    pub calendar: SeasonCalendar,
}

/// Settle one week for a league
/// POST /leagues/:league_id/settle?season=&week=&dry_run=
///
/// Always answers with the run report. An aborted run is a 500 with the
/// report as body; a not-ready week is a normal 200.
pub async fn settle_league(
    State(state): State<AppState>,
    Path(league_id): Path<Uuid>,
    Query(params): Query<SettleParams>,
) -> AppResult<(StatusCode, Json<SettlementRun>)> {
    validate_params(&params)?;

    let league = state
        .store
        .get_league(league_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("League {} not found", league_id)))?;

    let season = params.season.unwrap_or(league.season);
    if season != league.season {
        return Err(AppError::InvalidInput(format!(
            "league {} plays season {}, not {}",
            league_id, league.season, season
        )));
    }
    let week = params
        .week
        .unwrap_or_else(|| state.calendar.completed_week(Utc::now()));

    info!(
        "Settle requested: league={} season={} week={} dry_run={}",
        league_id, season, week, params.dry_run
    );
    let run = state.orchestrator.settle(league_id, season, week, params.dry_run).await;

    let status = if run.status == RunStatus::Aborted {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok((status, Json(run)))
}

/// Refresh live scores for a season's week
/// POST /seasons/:season/live-scores/poll?week=
pub async fn poll_live_scores(
    State(state): State<AppState>,
    Path(season): Path<SeasonPath>,
    Query(params): Query<PollParams>,
) -> AppResult<Json<LivePollReport>> {
    validate_params(&season)?;
    validate_params(&params)?;

    let week = params
        .week
        .unwrap_or_else(|| state.calendar.current_week(Utc::now()));
    let report = state.poller.poll(season.season, week).await;
    Ok(Json(report))
}

/// GET /leagues/:league_id/weeks/:week/status
pub async fn get_week_status(
    State(state): State<AppState>,
    Path(path): Path<WeekPath>,
) -> AppResult<Json<WeekStatus>> {
    validate_params(&path)?;
    let status = state.orchestrator.week_status(path.league_id, path.week).await?;
    Ok(Json(status))
}

/// GET /leagues/:league_id/members
pub async fn list_members(
    State(state): State<AppState>,
    Path(league_id): Path<Uuid>,
) -> AppResult<Json<StandingsResponse>> {
    let league = state
        .store
        .get_league(league_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("League {} not found", league_id)))?;
    let members = state.store.members_for_league(league_id).await?;

    Ok(Json(StandingsResponse::new(league, members)))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        store: state.store.backend_name().to_string(),
        season: state.calendar.season,
        current_week: state.calendar.current_week(Utc::now()),
    })
}
