//! API routes for rankd

use crate::events::ActivityEvent;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use rank_common::api::{
    BindRoleRequest, ClaimRequest, ErrorResponse, HealthResponse, LeaderboardEntry,
    LeaderboardResponse, MemberRankResponse, SnapshotImportRequest, SnapshotImportResponse,
    DEFAULT_LEADERBOARD_LIMIT, MAX_LEADERBOARD_LIMIT,
};
use rank_common::ledger::LevelRoleBinding;
use rank_common::{
    ClaimReceipt, CommunityId, CommunitySettings, LevelingError, MemberId, RoleId, VERSION,
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

type AppStateArc = Arc<AppState>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Leveling(#[from] LevelingError),

    #[error("Role {0} is not bound to a level")]
    UnknownRole(RoleId),

    #[error("Event queue is full, retry later")]
    QueueFull,

    #[error("Event loop is not running")]
    QueueClosed,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Leveling(LevelingError::NotFound) | ApiError::UnknownRole(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Leveling(LevelingError::AlreadyClaimed) => StatusCode::CONFLICT,
            ApiError::Leveling(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Leveling(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::QueueFull | ApiError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Leveling(e) => e.code(),
            ApiError::UnknownRole(_) => "not_found",
            ApiError::QueueFull => "queue_full",
            ApiError::QueueClosed => "queue_closed",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Activity Ingest
// ============================================================================

pub fn activity_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/activity", post(ingest_activity))
}

async fn ingest_activity(
    State(state): State<AppStateArc>,
    Json(event): Json<ActivityEvent>,
) -> ApiResult<StatusCode> {
    let event = event.stamped(chrono::Utc::now().timestamp_millis());
    let kind = event.kind();

    match state.events.try_send(event) {
        Ok(()) => {
            debug!("Accepted {} event", kind);
            Ok(StatusCode::ACCEPTED)
        }
        Err(TrySendError::Full(_)) => {
            warn!("Event queue full, refusing {} event", kind);
            state.metrics.record_dropped("queue_full");
            Err(ApiError::QueueFull)
        }
        Err(TrySendError::Closed(_)) => Err(ApiError::QueueClosed),
    }
}

// ============================================================================
// Rank Query Routes
// ============================================================================

pub fn rank_routes() -> Router<AppStateArc> {
    Router::new()
        .route(
            "/v1/communities/:community/leaderboard",
            get(get_leaderboard),
        )
        .route(
            "/v1/communities/:community/members/:member",
            get(get_member),
        )
        .route("/v1/communities/:community/settings", get(get_settings))
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
}

async fn get_leaderboard(
    State(state): State<AppStateArc>,
    Path(community): Path<CommunityId>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<LeaderboardResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .min(MAX_LEADERBOARD_LIMIT);

    let accounts = state.engine.ledger().top_accounts(community, limit).await?;
    let entries = accounts
        .into_iter()
        .enumerate()
        .map(|(i, account)| LeaderboardEntry {
            rank: i as u64 + 1,
            member: account.member,
            total_xp: account.total_xp,
            level: account.level,
        })
        .collect();

    Ok(Json(LeaderboardResponse { community, entries }))
}

async fn get_member(
    State(state): State<AppStateArc>,
    Path((community, member)): Path<(CommunityId, MemberId)>,
) -> ApiResult<Json<MemberRankResponse>> {
    let ledger = state.engine.ledger();
    let account = ledger.get(community, member).await?;
    let rank = ledger.rank_of(community, member).await?;
    let progress = ledger.curve().progress_within_level(account.total_xp);

    Ok(Json(MemberRankResponse {
        account,
        progress,
        rank,
    }))
}

async fn get_settings(
    State(state): State<AppStateArc>,
    Path(community): Path<CommunityId>,
) -> Json<CommunitySettings> {
    Json(state.engine.settings_for(community).clone())
}

// ============================================================================
// Admin Routes
// ============================================================================

pub fn admin_routes() -> Router<AppStateArc> {
    Router::new()
        .route(
            "/v1/communities/:community/level-roles",
            get(list_level_roles).post(bind_level_role),
        )
        .route(
            "/v1/communities/:community/level-roles/:role",
            delete(unbind_level_role),
        )
        .route("/v1/communities/:community/snapshot", post(import_snapshot))
        .route("/v1/communities/:community/claim", post(claim_snapshot))
}

async fn list_level_roles(
    State(state): State<AppStateArc>,
    Path(community): Path<CommunityId>,
) -> ApiResult<Json<Vec<LevelRoleBinding>>> {
    Ok(Json(state.engine.ledger().role_bindings(community).await?))
}

async fn bind_level_role(
    State(state): State<AppStateArc>,
    Path(community): Path<CommunityId>,
    Json(req): Json<BindRoleRequest>,
) -> ApiResult<Json<Vec<LevelRoleBinding>>> {
    let ledger = state.engine.ledger();
    ledger.bind_role(community, req.level, req.role).await?;
    Ok(Json(ledger.role_bindings(community).await?))
}

async fn unbind_level_role(
    State(state): State<AppStateArc>,
    Path((community, role)): Path<(CommunityId, RoleId)>,
) -> ApiResult<StatusCode> {
    if state.engine.ledger().unbind_role(community, role).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::UnknownRole(role))
    }
}

async fn import_snapshot(
    State(state): State<AppStateArc>,
    Path(community): Path<CommunityId>,
    Json(req): Json<SnapshotImportRequest>,
) -> ApiResult<Json<SnapshotImportResponse>> {
    let imported = state
        .engine
        .ledger()
        .import_snapshot(community, req.entries)
        .await?;
    Ok(Json(SnapshotImportResponse { imported }))
}

async fn claim_snapshot(
    State(state): State<AppStateArc>,
    Path(community): Path<CommunityId>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<Json<ClaimReceipt>> {
    let receipt = state.claims.claim(community, req.member, &req.names).await?;
    Ok(Json(receipt))
}

// ============================================================================
// Health & Metrics
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        voice_members: state.roster.len().await,
    })
}

pub fn metrics_routes() -> Router<AppStateArc> {
    Router::new().route("/metrics", get(export_metrics))
}

async fn export_metrics(State(state): State<AppStateArc>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export(),
    )
}
