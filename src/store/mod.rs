//! Session and resolution storage backends.
//!
//! The replay engine never touches a store; callers load sessions and
//! resolutions once up front and pass them in. Store handles are injected
//! explicitly into whatever needs them.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{ProtocolId, Resolution, Session, SessionId, Transform};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A session with this id already exists for the protocol.
    #[error("Session already exists: {0}")]
    DuplicateSession(SessionId),
    /// Stored data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A backend-specific error (connection, query, ...).
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a backend error from any error type.
    pub fn backend<E: std::error::Error>(e: E) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Options for recording a new resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolutionOptions {
    /// Resolution date. Defaults to now.
    pub date: Option<DateTime<Utc>>,
    /// Matcher parameters used to produce the transforms.
    pub parameters: serde_json::Value,
}

/// Storage for immutable interview sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All sessions for a protocol, ordered by `(date, id)`.
    async fn find_all(&self, protocol: &ProtocolId) -> Result<Vec<Session>, StoreError>;

    /// Import a session.
    async fn insert_session(&self, protocol: &ProtocolId, session: Session) -> Result<(), StoreError>;

    /// Delete a session, returning it if it existed.
    ///
    /// Leaves dependent resolutions in place; operators should use
    /// [`delete_session_cascade`].
    async fn delete_session(
        &self,
        protocol: &ProtocolId,
        id: &SessionId,
    ) -> Result<Option<Session>, StoreError>;

    /// Delete a session and every resolution dated at or after it, as one
    /// atomic operation. Returns `None` (and deletes nothing) if the session
    /// did not exist.
    async fn delete_session_cascade(
        &self,
        protocol: &ProtocolId,
        id: &SessionId,
    ) -> Result<Option<CascadeReport>, StoreError>;

    /// Whether the backend is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Storage for the append-only resolution log.
#[async_trait]
pub trait ResolutionStore: Send + Sync {
    /// The resolution log for a protocol, ordered by `(date, sequence)`.
    async fn list(&self, protocol: &ProtocolId) -> Result<Vec<Resolution>, StoreError>;

    /// Append a resolution, assigning its id and insertion sequence.
    async fn insert_resolution(
        &self,
        protocol: &ProtocolId,
        transforms: Vec<Transform>,
        options: ResolutionOptions,
    ) -> Result<Resolution, StoreError>;

    /// Delete every resolution dated at or after `date`; returns the count.
    async fn delete_since(&self, protocol: &ProtocolId, date: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Result of a cascading session delete.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeReport {
    /// The deleted session.
    pub session: Session,
    /// Number of resolutions removed with it.
    pub resolutions_deleted: usize,
}

/// Delete a session and every resolution dated at or after it.
///
/// Those resolutions may reference nodes that only the deleted session
/// explains. Either both deletions happen or neither does. Returns `None`
/// if the session did not exist.
pub async fn delete_session_cascade<S>(
    store: &S,
    protocol: &ProtocolId,
    id: &SessionId,
) -> Result<Option<CascadeReport>, StoreError>
where
    S: SessionStore + ?Sized,
{
    let report = store.delete_session_cascade(protocol, id).await?;

    if let Some(report) = &report {
        tracing::info!(
            protocol = %protocol,
            session_id = %report.session.id,
            session_date = %report.session.date,
            resolutions_deleted = report.resolutions_deleted,
            "Session deleted with cascading resolution cleanup"
        );
    }

    Ok(report)
}

pub use memory::InMemoryStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
