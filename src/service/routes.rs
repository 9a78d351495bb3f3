//! Axum routes for the resolver service.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheStats, ReplayKey};
use crate::ordering::sort_resolutions;
use crate::partition::{partition_sessions, summarize_epochs, EpochSummary};
use crate::replay::{ReplayError, ReplayOptions, SkippedTransform};
use crate::store::{
    delete_session_cascade, ResolutionOptions, ResolutionStore, SessionStore, StoreError,
};
use crate::types::{Network, ProtocolId, Resolution, Session, SessionId, Transform};
use crate::RESOLVER_SCHEMA_VERSION;

use super::middleware::record_replay_metrics;
use super::state::ServiceState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Resolved network with replay diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    /// The canonical network.
    pub network: Network,
    /// Fingerprint of `network`.
    pub fingerprint: String,
    /// Transforms skipped because their sources were absent.
    pub skipped: Vec<SkippedTransform>,
    /// Number of resolutions folded.
    pub resolutions_applied: usize,
    /// Number of sessions merged.
    pub sessions_included: usize,
    /// Whether the result came from the replay cache.
    pub cache_hit: bool,
}

/// Resolution log with per-epoch session counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionListResponse {
    /// Resolutions, oldest first.
    pub resolutions: Vec<Resolution>,
    /// Epoch summaries, oldest first, then the unresolved bucket.
    pub epochs: Vec<EpochSummary>,
}

/// Request to record a new resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResolutionRequest {
    /// Accepted merges.
    pub transforms: Vec<Transform>,
    /// Resolution date; defaults to now.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    /// Matcher parameters.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Query for deleting resolutions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSinceQuery {
    /// Delete resolutions dated at or after this instant.
    pub since: DateTime<Utc>,
}

/// Count of deleted resolutions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResolutionsResponse {
    /// Number of resolutions removed.
    pub deleted: usize,
}

/// Result of a cascading session delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSessionResponse {
    /// The deleted session.
    pub session_id: SessionId,
    /// Resolutions removed with it.
    pub resolutions_deleted: usize,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "healthy" or "degraded".
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Serialized schema version.
    pub schema_version: String,
    /// Whether the store answered.
    pub store_healthy: bool,
    /// Replay cache entries.
    pub cache_entries: usize,
    /// Replay cache capacity; 0 when disabled.
    pub cache_capacity: usize,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always "alive".
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether the service can take traffic.
    pub ready: bool,
    /// Store reachability.
    pub store: bool,
    /// Failure details.
    pub details: Option<String>,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::DuplicateSession(id) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("DUPLICATE_SESSION", format!("Session already exists: {}", id))),
        ),
        other => {
            tracing::error!(error = %other, "Store operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("STORE_ERROR", other.to_string())),
            )
        }
    }
}

fn serialization_error(e: serde_json::Error) -> ApiError {
    tracing::error!(error = %e, "Replay input could not be serialized");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("SERIALIZATION_FAILED", e.to_string())),
    )
}

fn replay_error(e: ReplayError) -> ApiError {
    match e {
        ReplayError::ResolutionNotFound(not_found) => (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new("RESOLUTION_NOT_FOUND", not_found.to_string())
                    .with_details(not_found.0.to_string()),
            ),
        ),
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Replay the resolution log for a protocol.
///
/// Sessions and resolutions are loaded once before the fold begins.
async fn resolve_handler<S>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(protocol_id): Path<String>,
    Json(options): Json<ReplayOptions>,
) -> Result<Json<ResolveResponse>, ApiError>
where
    S: SessionStore + ResolutionStore + 'static,
{
    let start = Instant::now();
    let protocol = ProtocolId::new(protocol_id);

    let sessions = state.store.find_all(&protocol).await.map_err(store_error)?;
    let resolutions = state.store.list(&protocol).await.map_err(store_error)?;

    let key = ReplayKey::compute(&protocol, &options, &sessions, &resolutions)
        .map_err(serialization_error)?;
    let (outcome, cache_hit) = state
        .cache
        .get_or_try_insert(key, || state.replayer.replay(&sessions, &resolutions, &options))
        .map_err(replay_error)?;

    let fingerprint = outcome.fingerprint().map_err(serialization_error)?;

    record_replay_metrics(
        outcome.network.num_nodes(),
        outcome.network.num_edges(),
        outcome.skipped.len(),
        cache_hit,
        start.elapsed().as_millis() as u64,
    );

    Ok(Json(ResolveResponse {
        network: outcome.network.clone(),
        fingerprint,
        skipped: outcome.skipped.clone(),
        resolutions_applied: outcome.resolutions_applied,
        sessions_included: outcome.sessions_included,
        cache_hit,
    }))
}

/// List the resolution log with epoch summaries.
async fn list_resolutions_handler<S>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(protocol_id): Path<String>,
) -> Result<Json<ResolutionListResponse>, ApiError>
where
    S: SessionStore + ResolutionStore + 'static,
{
    let protocol = ProtocolId::new(protocol_id);
    let sessions = state.store.find_all(&protocol).await.map_err(store_error)?;
    let resolutions = state.store.list(&protocol).await.map_err(store_error)?;

    let ordered = sort_resolutions(&resolutions);
    let buckets = partition_sessions(&ordered, &sessions);
    let epochs = summarize_epochs(&ordered, &buckets);
    let resolutions = ordered.into_iter().cloned().collect();

    Ok(Json(ResolutionListResponse { resolutions, epochs }))
}

/// Record a new resolution.
async fn create_resolution_handler<S>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(protocol_id): Path<String>,
    Json(request): Json<CreateResolutionRequest>,
) -> Result<(StatusCode, Json<Resolution>), ApiError>
where
    S: SessionStore + ResolutionStore + 'static,
{
    let protocol = ProtocolId::new(protocol_id);
    let options = ResolutionOptions {
        date: request.date,
        parameters: request.parameters,
    };

    let resolution = state
        .store
        .insert_resolution(&protocol, request.transforms, options)
        .await
        .map_err(store_error)?;

    tracing::info!(
        protocol = %protocol,
        resolution_id = %resolution.id,
        transforms = resolution.transforms.len(),
        "Resolution recorded"
    );

    Ok((StatusCode::CREATED, Json(resolution)))
}

/// Delete resolutions dated at or after `since`.
async fn delete_resolutions_handler<S>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(protocol_id): Path<String>,
    Query(query): Query<DeleteSinceQuery>,
) -> Result<Json<DeleteResolutionsResponse>, ApiError>
where
    S: SessionStore + ResolutionStore + 'static,
{
    let protocol = ProtocolId::new(protocol_id);
    let deleted = state
        .store
        .delete_since(&protocol, query.since)
        .await
        .map_err(store_error)?;

    Ok(Json(DeleteResolutionsResponse { deleted }))
}

/// Import a session.
async fn import_session_handler<S>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(protocol_id): Path<String>,
    Json(session): Json<Session>,
) -> Result<StatusCode, ApiError>
where
    S: SessionStore + ResolutionStore + 'static,
{
    let protocol = ProtocolId::new(protocol_id);
    state
        .store
        .insert_session(&protocol, session)
        .await
        .map_err(store_error)?;

    Ok(StatusCode::CREATED)
}

/// Delete a session and every resolution that may depend on it.
async fn delete_session_handler<S>(
    State(state): State<Arc<ServiceState<S>>>,
    Path((protocol_id, session_id)): Path<(String, String)>,
) -> Result<Json<DeleteSessionResponse>, ApiError>
where
    S: SessionStore + ResolutionStore + 'static,
{
    let protocol = ProtocolId::new(protocol_id);
    let session_id = SessionId::new(session_id);

    let report = delete_session_cascade(state.store.as_ref(), &protocol, &session_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(
                    "SESSION_NOT_FOUND",
                    format!("Session not found: {}", session_id),
                )),
            )
        })?;

    Ok(Json(DeleteSessionResponse {
        session_id: report.session.id,
        resolutions_deleted: report.resolutions_deleted,
    }))
}

/// Health check endpoint (detailed).
async fn health_handler<S>(State(state): State<Arc<ServiceState<S>>>) -> Json<HealthResponse>
where
    S: SessionStore + ResolutionStore + 'static,
{
    let store_healthy = state.store.is_healthy().await;
    let CacheStats { len, capacity } = state.cache.stats();

    Json(HealthResponse {
        status: if store_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: RESOLVER_SCHEMA_VERSION.to_string(),
        store_healthy,
        cache_entries: len,
        cache_capacity: capacity,
    })
}

/// Liveness probe endpoint. Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the store is reachable, 503 otherwise.
async fn readiness_handler<S>(
    State(state): State<Arc<ServiceState<S>>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)>
where
    S: SessionStore + ResolutionStore + 'static,
{
    if state.store.is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            store: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                store: false,
                details: Some("Store connection failed".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the resolver service.
pub fn create_router<S>(state: ServiceState<S>) -> Router
where
    S: SessionStore + ResolutionStore + 'static,
{
    let state = Arc::new(state);

    Router::new()
        // Replay
        .route("/api/protocols/:protocol_id/resolve", post(resolve_handler::<S>))
        // Resolution log
        .route(
            "/api/protocols/:protocol_id/resolutions",
            get(list_resolutions_handler::<S>)
                .post(create_resolution_handler::<S>)
                .delete(delete_resolutions_handler::<S>),
        )
        // Sessions
        .route("/api/protocols/:protocol_id/sessions", post(import_session_handler::<S>))
        .route(
            "/api/protocols/:protocol_id/sessions/:session_id",
            delete(delete_session_handler::<S>),
        )
        // Health checks
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S>))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{Attributes, Edge, Node};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn seeded_state() -> ServiceState<InMemoryStore> {
        let store = InMemoryStore::new();
        let protocol = ProtocolId::new("p1");
        let d1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.add_session(
            &protocol,
            Session::new(
                "s1",
                d1,
                Network::new(vec![Node::bare("n1"), Node::bare("n2")], vec![Edge::new("n1", "n2")]),
            ),
        );
        store.add_resolution(
            &protocol,
            Resolution::new(
                "R1",
                d1 + chrono::Duration::days(1),
                vec![Transform::new("M", ["n1", "n2"], Attributes::new())],
            ),
        );
        ServiceState::new(store)
    }

    async fn send(router: Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn test_resolve_applies_resolution() {
        let router = create_router(seeded_state());
        let (status, body) = send(
            router,
            "POST",
            "/api/protocols/p1/resolve",
            json!({ "fromResolution": "R1" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["network"]["nodes"][0]["id"], "M");
        assert_eq!(body["network"]["edges"][0]["from"], "M");
        assert_eq!(body["network"]["edges"][0]["to"], "M");
        assert_eq!(body["cacheHit"], false);
    }

    #[tokio::test]
    async fn test_second_resolve_hits_cache() {
        let router = create_router(seeded_state());
        send(router.clone(), "POST", "/api/protocols/p1/resolve", json!({})).await;
        let (_, body) = send(router, "POST", "/api/protocols/p1/resolve", json!({})).await;
        assert_eq!(body["cacheHit"], true);
    }

    #[tokio::test]
    async fn test_unknown_resolution_is_client_error() {
        let router = create_router(seeded_state());
        let (status, body) = send(
            router,
            "POST",
            "/api/protocols/p1/resolve",
            json!({ "fromResolution": "nope" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "RESOLUTION_NOT_FOUND");
        assert_eq!(body["details"], "nope");
    }

    #[tokio::test]
    async fn test_list_resolutions_reports_epochs() {
        let router = create_router(seeded_state());
        let (status, body) = send(router, "GET", "/api/protocols/p1/resolutions", Value::Null).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resolutions"][0]["id"], "R1");
        assert_eq!(body["epochs"][0]["sessionCount"], 1);
        assert_eq!(body["epochs"][1]["bucket"], "_unresolved");
    }

    #[tokio::test]
    async fn test_delete_session_cascades() {
        let router = create_router(seeded_state());
        let (status, body) =
            send(router.clone(), "DELETE", "/api/protocols/p1/sessions/s1", Value::Null).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resolutionsDeleted"], 1);

        let (status, _) = send(router, "DELETE", "/api/protocols/p1/sessions/s1", Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reimported_session_is_not_served_from_cache() {
        let router = create_router(ServiceState::new(InMemoryStore::new()));
        let options = json!({ "includeUnresolved": true });
        let session = |node: &str| {
            json!({
                "id": "s1",
                "date": "2024-02-01T00:00:00Z",
                "network": { "nodes": [{ "id": node }], "edges": [] }
            })
        };

        send(router.clone(), "POST", "/api/protocols/p1/sessions", session("old")).await;
        let (_, body) = send(router.clone(), "POST", "/api/protocols/p1/resolve", options.clone()).await;
        assert_eq!(body["network"]["nodes"][0]["id"], "old");

        let (status, _) =
            send(router.clone(), "DELETE", "/api/protocols/p1/sessions/s1", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(router.clone(), "POST", "/api/protocols/p1/sessions", session("new")).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(router, "POST", "/api/protocols/p1/resolve", options).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["network"]["nodes"][0]["id"], "new");
        assert_eq!(body["cacheHit"], false);
    }

    #[tokio::test]
    async fn test_import_and_create_resolution() {
        let router = create_router(ServiceState::new(InMemoryStore::new()));

        let session = json!({
            "id": "s1",
            "date": "2024-02-01T00:00:00Z",
            "network": { "nodes": [{ "id": "a" }, { "id": "b" }], "edges": [] }
        });
        let (status, _) = send(router.clone(), "POST", "/api/protocols/p9/sessions", session.clone()).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(router.clone(), "POST", "/api/protocols/p9/sessions", session).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "DUPLICATE_SESSION");

        let (status, body) = send(
            router.clone(),
            "POST",
            "/api/protocols/p9/resolutions",
            json!({
                "transforms": [{ "id": "AB", "nodes": ["a", "b"], "attributes": {} }],
                "date": "2024-02-02T00:00:00Z"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["transforms"][0]["id"], "AB");

        let (_, body) = send(router, "POST", "/api/protocols/p9/resolve", json!({})).await;
        assert_eq!(body["network"]["nodes"].as_array().unwrap().len(), 1);
        assert_eq!(body["resolutionsApplied"], 1);
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let router = create_router(seeded_state());
        let (status, body) = send(router.clone(), "GET", "/health", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(router, "GET", "/health/ready", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
    }
}
