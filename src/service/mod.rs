//! Resolver REST Service
//!
//! Exposes replay and the resolution log over HTTP.
//!
//! ## Endpoints
//!
//! - `POST /api/protocols/:protocol_id/resolve` - Replay resolutions into a canonical network
//! - `GET /api/protocols/:protocol_id/resolutions` - List the resolution log with epoch counts
//! - `POST /api/protocols/:protocol_id/resolutions` - Record a new resolution
//! - `DELETE /api/protocols/:protocol_id/resolutions?since=` - Delete resolutions from a date on
//! - `POST /api/protocols/:protocol_id/sessions` - Import a session
//! - `DELETE /api/protocols/:protocol_id/sessions/:session_id` - Delete a session and later resolutions
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_replay_metrics};
pub use routes::{create_router, ErrorResponse, ResolveResponse};
pub use state::ServiceState;
