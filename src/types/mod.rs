//! Core types for the network resolver.

pub mod node;
pub mod edge;
pub mod network;
pub mod session;
pub mod resolution;

pub use node::{Attributes, NodeId, EdgeId, SessionId, ResolutionId, ProtocolId, Node, Ego};
pub use edge::Edge;
pub use network::Network;
pub use session::Session;
pub use resolution::{Transform, Resolution};
