//! Telemetry spine: metrics registry plus the structured audit log.

pub mod audit;
pub mod metrics;

pub use audit::{AuditError, AuditEvent, AuditSink};
pub use metrics::{Metrics, TelemetryError};
