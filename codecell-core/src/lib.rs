//! Intent-routed execution orchestrator: the thin seam between a parsed
//! `Intent` and either the protocol collaborator or the sandboxed code
//! path, chosen per the configured [`RoutingMode`].

pub mod cache;
pub mod concurrency;
pub mod config;
pub mod orchestrator;
pub mod protocol;
pub mod tokens;

pub use config::{ContextBackendKind, FeatureFlags, RoutingMode, SandboxBackendKind};
pub use orchestrator::Orchestrator;
pub use protocol::{ProtocolCollaborator, ProtocolError};
