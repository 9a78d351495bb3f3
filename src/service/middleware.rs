//! Service middleware for metrics and request tracking.
//!
//! ## Metrics Emitted
//!
//! - `request` - path pattern, method, status and latency of every request
//! - `replay` - node/edge counts, skipped transforms and cache hits per replay

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use regex_lite::Regex;
use tracing::info;

/// Metrics middleware that records request counts and latency.
///
/// Uses tracing events; aggregate from logs.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "network_resolver::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Replaces protocol and session ids with placeholders.
fn normalize_path(path: &str) -> String {
    static ID_SEGMENT: OnceLock<Option<Regex>> = OnceLock::new();

    let Some(pattern) = ID_SEGMENT
        .get_or_init(|| Regex::new(r"/(protocols|sessions)/[^/]+").ok())
        .as_ref()
    else {
        return path.to_string();
    };

    pattern.replace_all(path, "/$1/:id").to_string()
}

/// Record replay metrics.
///
/// Call this after serving a resolve request.
pub fn record_replay_metrics(
    node_count: usize,
    edge_count: usize,
    skipped_transforms: usize,
    cache_hit: bool,
    latency_ms: u64,
) {
    info!(
        target: "network_resolver::metrics",
        metric_type = "replay",
        node_count = node_count,
        edge_count = edge_count,
        skipped_transforms = skipped_transforms,
        cache_hit = cache_hit,
        latency_ms = latency_ms,
        "replay_metric"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_replaces_ids() {
        let path = "/api/protocols/p-42/sessions/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/protocols/:id/sessions/:id");
    }

    #[test]
    fn test_normalize_path_preserves_regular_path() {
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
        assert_eq!(normalize_path("/api/protocols/p1/resolve"), "/api/protocols/:id/resolve");
    }
}
