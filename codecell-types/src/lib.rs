//! Shared wire types, error taxonomy, and identifiers for codecell.
//!
//! This is the one leaf crate every other codecell crate depends on; it
//! carries no behavior beyond what's needed to describe the wire contract.

pub mod capability;
pub mod error;
pub mod execution;
pub mod intent;
pub mod response;
pub mod trace;

pub use capability::{CapabilityEntry, Category, Complexity};
pub use error::{CodecellError, ErrorCode};
pub use execution::{ExecutionRequest, ExecutionResult, ExecutionStatus, FsPolicy, NetPolicy, ResourceKind};
pub use intent::{Intent, Request};
pub use response::{Metadata, Mode, Response, ResultPayload, PROTOCOL_VERSION};
pub use trace::{SessionId, TraceId};
