//! Interview session snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::network::Network;
use super::node::{Attributes, SessionId};

/// One immutable interview-network snapshot with its own timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// When the session was captured.
    pub date: DateTime<Utc>,
    /// The captured network.
    #[serde(default)]
    pub network: Network,
    /// Session-level variables, merged into the ego by ego attachment.
    #[serde(default)]
    pub variables: Attributes,
}

impl Session {
    /// Create a session without session-level variables.
    pub fn new(id: impl Into<SessionId>, date: DateTime<Utc>, network: Network) -> Self {
        Self {
            id: id.into(),
            date,
            network,
            variables: Attributes::new(),
        }
    }

    /// Set the session-level variables.
    pub fn with_variables(mut self, variables: Attributes) -> Self {
        self.variables = variables;
        self
    }
}
