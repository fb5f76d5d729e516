//! The structured response returned to the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecellError;
use crate::trace::TraceId;

pub const PROTOCOL_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Protocol,
    CodeExecution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub tokens_used: u64,
    pub execution_time_ms: u64,
    pub cache_hit: bool,
    pub mode: Mode,
    pub trace_id: TraceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPayload {
    pub status: String,
    pub data: Value,
    pub metadata: Metadata,
}

/// `{ protocol: "2.0", result | error, metadata }`, modeled as an enum so
/// `result` and `error` stay mutually exclusive at the type level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success {
        protocol: String,
        result: ResultPayload,
        schema: Value,
    },
    Failure {
        protocol: String,
        error: CodecellError,
        metadata: Metadata,
    },
}

impl Response {
    pub fn success(status: &str, data: Value, metadata: Metadata, schema: Value) -> Self {
        Self::Success {
            protocol: PROTOCOL_VERSION.to_string(),
            result: ResultPayload {
                status: status.to_string(),
                data,
                metadata,
            },
            schema,
        }
    }

    pub fn failure(error: CodecellError, metadata: Metadata) -> Self {
        Self::Failure {
            protocol: PROTOCOL_VERSION.to_string(),
            error,
            metadata,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Success { result, .. } => &result.metadata,
            Self::Failure { metadata, .. } => metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn metadata() -> Metadata {
        Metadata {
            tokens_used: 10,
            execution_time_ms: 5,
            cache_hit: false,
            mode: Mode::CodeExecution,
            trace_id: TraceId::new(),
        }
    }

    #[test]
    fn success_round_trips_through_json() {
        let resp = Response::success(
            "completed",
            serde_json::json!({"stdout": "hi\n"}),
            metadata(),
            Value::Null,
        );
        let encoded = serde_json::to_string(&resp).unwrap();
        let decoded: Response = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.metadata().tokens_used, 10);
    }

    #[test]
    fn failure_carries_error_code() {
        let resp = Response::failure(CodecellError::unknown_intent("foo"), metadata());
        match resp {
            Response::Failure { error, .. } => assert_eq!(error.code, ErrorCode::UnknownIntent),
            Response::Success { .. } => panic!("expected failure"),
        }
    }
}
