//! External duplicate-node matcher.
//!
//! Matching is not part of replay. A matcher takes a protocol codebook and a
//! network and streams candidate groups of nodes that may be the same
//! person. A reviewer accepts candidates, each becoming a [`Transform`], and
//! the batch is stored as a new resolution.
//!
//! ```text
//! Network ──► DuplicateMatcher ──► MatchCandidate* ──► review ──► Transform* ──► ResolutionStore
//! ```

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::types::{Attributes, Network, NodeId, Transform};

/// Error type for matcher operations.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    /// The matcher process could not be started.
    #[error("Failed to start matcher: {0}")]
    Spawn(#[source] std::io::Error),
    /// Reading from or writing to the matcher failed.
    #[error("Matcher I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The matcher emitted output that is not a candidate.
    #[error("Invalid matcher output: {0}")]
    Decode(#[from] serde_json::Error),
    /// The matcher exited unsuccessfully.
    #[error("Matcher exited with status {0:?}")]
    Exit(Option<i32>),
}

/// Input handed to a matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    /// Protocol codebook describing node types and variables.
    pub codebook: serde_json::Value,
    /// Network to search for duplicates.
    pub network: Network,
    /// Matcher-specific settings, recorded on the resulting resolution.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// A group of nodes the matcher believes are the same entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Node ids in the group.
    pub nodes: Vec<NodeId>,
    /// Match probability, if the matcher reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

impl MatchCandidate {
    /// Turn an accepted candidate into a transform.
    pub fn accept(self, id: impl Into<NodeId>, attributes: Attributes) -> Transform {
        Transform {
            id: id.into(),
            nodes: self.nodes,
            attributes,
        }
    }
}

/// A running match, yielding candidates until the matcher finishes.
///
/// Dropping the session aborts the matcher.
pub struct MatchSession {
    receiver: mpsc::Receiver<Result<MatchCandidate, MatcherError>>,
    abort: Option<oneshot::Sender<()>>,
}

impl MatchSession {
    /// Build a session from its channel halves.
    pub fn new(
        receiver: mpsc::Receiver<Result<MatchCandidate, MatcherError>>,
        abort: oneshot::Sender<()>,
    ) -> Self {
        Self {
            receiver,
            abort: Some(abort),
        }
    }

    /// Next candidate, or `None` once the matcher is done.
    pub async fn next(&mut self) -> Option<Result<MatchCandidate, MatcherError>> {
        self.receiver.recv().await
    }

    /// Stop the matcher and discard pending output.
    pub fn abort(&mut self) {
        if let Some(abort) = self.abort.take() {
            let _ = abort.send(());
        }
        self.receiver.close();
    }

    /// Drain every candidate, failing on the first error.
    pub async fn collect(mut self) -> Result<Vec<MatchCandidate>, MatcherError> {
        let mut candidates = Vec::new();
        while let Some(candidate) = self.next().await {
            candidates.push(candidate?);
        }
        Ok(candidates)
    }
}

/// Capability that produces duplicate candidates for a network.
#[async_trait]
pub trait DuplicateMatcher: Send + Sync {
    /// Start matching; candidates stream through the returned session.
    async fn start(&self, request: MatchRequest) -> Result<MatchSession, MatcherError>;
}

/// Runs an external matcher program.
///
/// The request is written to stdin as JSON; the program writes one JSON
/// [`MatchCandidate`] per line to stdout.
#[derive(Debug, Clone)]
pub struct CommandMatcher {
    program: PathBuf,
    args: Vec<String>,
    buffer: usize,
}

impl CommandMatcher {
    /// Create a matcher for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            buffer: 64,
        }
    }

    /// Set program arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the candidate channel capacity.
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

#[async_trait]
impl DuplicateMatcher for CommandMatcher {
    async fn start(&self, request: MatchRequest) -> Result<MatchSession, MatcherError> {
        let input = serde_json::to_vec(&request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(MatcherError::Spawn)?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            MatcherError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "matcher stdin unavailable"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            MatcherError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "matcher stdout unavailable"))
        })?;

        debug!(program = %self.program.display(), bytes = input.len(), "Matcher started");

        // Written separately so a matcher that streams before reading all of
        // stdin cannot deadlock against us.
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&input).await {
                warn!(error = %e, "Failed to write matcher input");
            }
            let _ = stdin.shutdown().await;
        });

        let (tx, rx) = mpsc::channel(self.buffer);
        let (abort_tx, mut abort_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();

            loop {
                tokio::select! {
                    _ = &mut abort_rx => {
                        let _ = child.kill().await;
                        debug!("Matcher aborted");
                        return;
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) if line.trim().is_empty() => continue,
                        Ok(Some(line)) => {
                            let candidate = serde_json::from_str(&line).map_err(MatcherError::from);
                            if tx.send(candidate).await.is_err() {
                                let _ = child.kill().await;
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ = tx.send(Err(MatcherError::Io(e))).await;
                            let _ = child.kill().await;
                            return;
                        }
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => debug!("Matcher finished"),
                Ok(status) => {
                    let _ = tx.send(Err(MatcherError::Exit(status.code()))).await;
                }
                Err(e) => {
                    let _ = tx.send(Err(MatcherError::Io(e))).await;
                }
            }
        });

        Ok(MatchSession::new(rx, abort_tx))
    }
}

/// Matcher returning a fixed list of candidates.
#[derive(Debug, Clone, Default)]
pub struct StaticMatcher {
    candidates: Vec<MatchCandidate>,
}

impl StaticMatcher {
    /// Create a matcher that always yields `candidates`.
    pub fn new(candidates: Vec<MatchCandidate>) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl DuplicateMatcher for StaticMatcher {
    async fn start(&self, _request: MatchRequest) -> Result<MatchSession, MatcherError> {
        let (tx, rx) = mpsc::channel(self.candidates.len().max(1));
        for candidate in &self.candidates {
            // Capacity covers every candidate.
            let _ = tx.try_send(Ok(candidate.clone()));
        }
        let (abort_tx, _abort_rx) = oneshot::channel();
        Ok(MatchSession::new(rx, abort_tx))
    }
}
