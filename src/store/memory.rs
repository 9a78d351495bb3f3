//! In-memory session and resolution store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::types::{ProtocolId, Resolution, ResolutionId, Session, SessionId, Transform};
use super::{CascadeReport, ResolutionOptions, ResolutionStore, SessionStore, StoreError};

#[derive(Debug, Default)]
struct ProtocolData {
    sessions: BTreeMap<SessionId, Session>,
    resolutions: Vec<Resolution>,
}

/// In-memory store for tests and single-process deployments.
///
/// Uses BTreeMap for deterministic iteration order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    protocols: RwLock<BTreeMap<ProtocolId, ProtocolData>>,
    next_sequence: RwLock<u64>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session (test helper; overwrites an existing id).
    pub fn add_session(&self, protocol: &ProtocolId, session: Session) {
        self.protocols
            .write()
            .entry(protocol.clone())
            .or_default()
            .sessions
            .insert(session.id.clone(), session);
    }

    /// Add a pre-built resolution (test helper).
    pub fn add_resolution(&self, protocol: &ProtocolId, resolution: Resolution) {
        self.protocols
            .write()
            .entry(protocol.clone())
            .or_default()
            .resolutions
            .push(resolution);
    }

    /// Number of sessions for a protocol.
    pub fn num_sessions(&self, protocol: &ProtocolId) -> usize {
        self.protocols
            .read()
            .get(protocol)
            .map(|p| p.sessions.len())
            .unwrap_or(0)
    }

    /// Number of resolutions for a protocol.
    pub fn num_resolutions(&self, protocol: &ProtocolId) -> usize {
        self.protocols
            .read()
            .get(protocol)
            .map(|p| p.resolutions.len())
            .unwrap_or(0)
    }

    fn take_sequence(&self) -> u64 {
        let mut next = self.next_sequence.write();
        *next += 1;
        *next
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn find_all(&self, protocol: &ProtocolId) -> Result<Vec<Session>, StoreError> {
        let protocols = self.protocols.read();
        let mut sessions: Vec<Session> = protocols
            .get(protocol)
            .map(|p| p.sessions.values().cloned().collect())
            .unwrap_or_default();
        sessions.sort_by(|a, b| (a.date, &a.id).cmp(&(b.date, &b.id)));
        Ok(sessions)
    }

    async fn insert_session(&self, protocol: &ProtocolId, session: Session) -> Result<(), StoreError> {
        let mut protocols = self.protocols.write();
        let data = protocols.entry(protocol.clone()).or_default();
        if data.sessions.contains_key(&session.id) {
            return Err(StoreError::DuplicateSession(session.id));
        }
        data.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete_session(
        &self,
        protocol: &ProtocolId,
        id: &SessionId,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .protocols
            .write()
            .get_mut(protocol)
            .and_then(|p| p.sessions.remove(id)))
    }

    async fn delete_session_cascade(
        &self,
        protocol: &ProtocolId,
        id: &SessionId,
    ) -> Result<Option<CascadeReport>, StoreError> {
        let mut protocols = self.protocols.write();
        let Some(data) = protocols.get_mut(protocol) else {
            return Ok(None);
        };
        let Some(session) = data.sessions.remove(id) else {
            return Ok(None);
        };

        let before = data.resolutions.len();
        data.resolutions.retain(|r| r.date < session.date);
        let resolutions_deleted = before - data.resolutions.len();

        Ok(Some(CascadeReport {
            session,
            resolutions_deleted,
        }))
    }
}

#[async_trait]
impl ResolutionStore for InMemoryStore {
    async fn list(&self, protocol: &ProtocolId) -> Result<Vec<Resolution>, StoreError> {
        let protocols = self.protocols.read();
        let mut resolutions: Vec<Resolution> = protocols
            .get(protocol)
            .map(|p| p.resolutions.clone())
            .unwrap_or_default();
        resolutions.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(resolutions)
    }

    async fn insert_resolution(
        &self,
        protocol: &ProtocolId,
        transforms: Vec<Transform>,
        options: ResolutionOptions,
    ) -> Result<Resolution, StoreError> {
        let resolution = Resolution {
            id: ResolutionId::new(Uuid::new_v4().to_string()),
            date: options.date.unwrap_or_else(Utc::now),
            sequence: self.take_sequence(),
            transforms,
            parameters: options.parameters,
        };

        self.protocols
            .write()
            .entry(protocol.clone())
            .or_default()
            .resolutions
            .push(resolution.clone());

        Ok(resolution)
    }

    async fn delete_since(&self, protocol: &ProtocolId, date: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut protocols = self.protocols.write();
        let Some(data) = protocols.get_mut(protocol) else {
            return Ok(0);
        };
        let before = data.resolutions.len();
        data.resolutions.retain(|r| r.date < date);
        Ok(before - data.resolutions.len())
    }
}
