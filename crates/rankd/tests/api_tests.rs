//! HTTP API tests
//!
//! Drive the axum router in-process with `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::{harness, harness_with_queue, GUILD, QUIET_GUILD};
use rank_common::api::{ErrorResponse, HealthResponse, LeaderboardResponse, MemberRankResponse};
use rank_common::ledger::{LegacyEntryInput, LevelRoleBinding};
use rank_common::{ClaimReceipt, CommunitySettings, MemberId, RoleId};
use rankd::events::ActivityEvent;
use rankd::server::build_router;
use serde::de::DeserializeOwned;
use serde_json::json;
use tower::ServiceExt;

async fn send(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).unwrap()
}

// ============================================================================
// Health & Metrics
// ============================================================================

#[tokio::test]
async fn test_health() {
    let h = harness().await;
    let app = build_router(h.state.clone());

    let (status, body) = send(&app, Method::GET, "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = decode(&body);
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, rank_common::VERSION);
    assert_eq!(health.voice_members, 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = harness().await;
    h.state.metrics.record_dropped("bot");
    let app = build_router(h.state.clone());

    let (status, body) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("rank_events_dropped_total"));
}

// ============================================================================
// Activity Ingest
// ============================================================================

#[tokio::test]
async fn test_activity_is_enqueued_and_stamped() {
    let mut h = harness().await;
    let app = build_router(h.state.clone());

    let event = json!({"type": "message", "community": 1, "member": 2, "channel": 3});
    let (status, _) = send(&app, Method::POST, "/v1/activity", Some(event)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    match h.events.try_recv().unwrap() {
        ActivityEvent::Message(payload) => {
            assert_eq!(payload.member, MemberId(2));
            assert!(payload.at_ms.is_some());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_activity_refused_when_queue_full() {
    let h = harness_with_queue(1).await;
    let app = build_router(h.state.clone());
    let event = json!({"type": "reaction", "community": 1, "member": 2, "channel": 3});

    let (first, _) = send(&app, Method::POST, "/v1/activity", Some(event.clone())).await;
    assert_eq!(first, StatusCode::ACCEPTED);

    let (second, body) = send(&app, Method::POST, "/v1/activity", Some(event)).await;
    assert_eq!(second, StatusCode::SERVICE_UNAVAILABLE);
    let error: ErrorResponse = decode(&body);
    assert_eq!(error.code, "queue_full");
}

#[tokio::test]
async fn test_malformed_activity_is_rejected() {
    let h = harness().await;
    let app = build_router(h.state.clone());

    let event = json!({"type": "typing", "community": 1, "member": 2});
    let (status, _) = send(&app, Method::POST, "/v1/activity", Some(event)).await;
    assert!(status.is_client_error());
}

// ============================================================================
// Rank Queries
// ============================================================================

#[tokio::test]
async fn test_leaderboard_order_and_limit() {
    let h = harness().await;
    h.ledger().add(GUILD, MemberId(1), 50).await.unwrap();
    h.ledger().add(GUILD, MemberId(2), 300).await.unwrap();
    h.ledger().add(GUILD, MemberId(3), 120).await.unwrap();
    let app = build_router(h.state.clone());

    let uri = format!("/v1/communities/{}/leaderboard?limit=2", GUILD);
    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let board: LeaderboardResponse = decode(&body);
    assert_eq!(board.community, GUILD);
    let members: Vec<_> = board.entries.iter().map(|e| (e.rank, e.member)).collect();
    assert_eq!(members, vec![(1, MemberId(2)), (2, MemberId(3))]);
    assert_eq!(board.entries[0].level, 2);
}

#[tokio::test]
async fn test_member_rank_and_progress() {
    let h = harness().await;
    h.ledger().add(GUILD, MemberId(1), 1000).await.unwrap();
    h.ledger().add(GUILD, MemberId(2), 500).await.unwrap();
    let app = build_router(h.state.clone());

    let uri = format!("/v1/communities/{}/members/2", GUILD);
    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let rank: MemberRankResponse = decode(&body);
    assert_eq!(rank.rank, 2);
    assert_eq!(rank.account.total_xp, 500);
    assert_eq!(rank.progress.level, 2);
    assert_eq!(rank.progress.xp_into_level, 230);
    assert_eq!(rank.progress.xp_needed_for_level, 280);
}

#[tokio::test]
async fn test_effective_settings() {
    let h = harness().await;
    let app = build_router(h.state.clone());

    let uri = format!("/v1/communities/{}/settings", QUIET_GUILD);
    let (_, body) = send(&app, Method::GET, &uri, None).await;
    let settings: CommunitySettings = decode(&body);
    assert_eq!(settings.voice_xp_per_minute, 0);
    assert_eq!(settings.message_xp_min, 20);

    let (_, body) = send(&app, Method::GET, "/v1/communities/5/settings", None).await;
    let settings: CommunitySettings = decode(&body);
    assert_eq!(settings.voice_xp_per_minute, 10);
}

#[tokio::test]
async fn test_non_numeric_community_is_rejected() {
    let h = harness().await;
    let app = build_router(h.state.clone());
    let (status, _) = send(&app, Method::GET, "/v1/communities/general/leaderboard", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn test_level_role_administration() {
    let h = harness().await;
    let app = build_router(h.state.clone());
    let base = format!("/v1/communities/{}/level-roles", GUILD);

    let (status, body) = send(
        &app,
        Method::POST,
        &base,
        Some(json!({"level": 5, "role": 900})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let bindings: Vec<LevelRoleBinding> = decode(&body);
    assert_eq!(bindings.len(), 1);

    send(&app, Method::POST, &base, Some(json!({"level": 10, "role": 901}))).await;
    let (_, body) = send(&app, Method::GET, &base, None).await;
    let bindings: Vec<LevelRoleBinding> = decode(&body);
    let roles: Vec<_> = bindings.iter().map(|b| (b.level, b.role)).collect();
    assert_eq!(roles, vec![(5, RoleId(900)), (10, RoleId(901))]);

    let (status, _) = send(&app, Method::DELETE, &format!("{}/900", base), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::DELETE, &format!("{}/900", base), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorResponse = decode(&body);
    assert_eq!(error.code, "not_found");
}

#[tokio::test]
async fn test_snapshot_import_and_claim() {
    let h = harness().await;
    let app = build_router(h.state.clone());
    h.ledger().add(GUILD, MemberId(7), 2000).await.unwrap();

    let entries = vec![
        LegacyEntryInput {
            name: "Bob".to_string(),
            xp: 500,
            level: 3,
        },
        LegacyEntryInput {
            name: "Ann".to_string(),
            xp: 20,
            level: 0,
        },
    ];
    let uri = format!("/v1/communities/{}/snapshot", GUILD);
    let (status, body) = send(&app, Method::POST, &uri, Some(json!({ "entries": entries }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decode::<serde_json::Value>(&body)["imported"], 2);

    let claim = format!("/v1/communities/{}/claim", GUILD);

    // Display name misses, username matches case-insensitively
    let (status, body) = send(
        &app,
        Method::POST,
        &claim,
        Some(json!({"member": 7, "names": ["Robert", "bob"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let receipt: ClaimReceipt = decode(&body);
    assert_eq!(receipt.entry_name, "Bob");
    assert_eq!(receipt.previous_total, 2000);
    assert_eq!(receipt.total_xp, 500);
    assert_eq!(receipt.level, 2);
    assert_eq!(h.ledger().get(GUILD, MemberId(7)).await.unwrap().total_xp, 500);

    let (status, body) = send(
        &app,
        Method::POST,
        &claim,
        Some(json!({"member": 8, "names": ["Bob"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(decode::<ErrorResponse>(&body).code, "already_claimed");

    let (status, body) = send(
        &app,
        Method::POST,
        &claim,
        Some(json!({"member": 8, "names": ["Nobody"]})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorResponse = decode(&body);
    assert_eq!(error.code, "not_found");
    assert!(error.error.contains("spelling"));
}
