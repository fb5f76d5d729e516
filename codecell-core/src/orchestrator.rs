//! `Orchestrator::execute_intent` — the one public operation. Built on the
//! teacher's `DistributedOrchestrator`/`ExecutorRegistry`/`Scheduler` shape:
//! the registry becomes a fixed three-way mode dispatch instead of an
//! open target registry, and the scheduler's FIFO queue becomes the
//! semaphore-bounded [`AdmissionGate`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use codecell_capability::{CapabilityIndex, MaterializeError, Materializer};
use codecell_context::{ContextStore, SessionRegistry};
use codecell_sandbox::SandboxBackend;
use codecell_telemetry::audit::{AuditEvent, AuditSink};
use codecell_telemetry::metrics::Metrics;
use codecell_types::execution::{ExecutionRequest, ExecutionResult, ExecutionStatus, FsPolicy, NetPolicy};
use codecell_types::response::Mode;
use codecell_types::{CodecellError, ErrorCode, Intent, Metadata, Response, SessionId, TraceId};
use tokio_util::sync::CancellationToken;

use crate::cache;
use crate::concurrency::AdmissionGate;
use crate::config::{FeatureFlags, RoutingMode};
use crate::protocol::{ProtocolCollaborator, ProtocolError};
use crate::tokens::estimate_tokens;

enum DispatchResult {
    Protocol(serde_json::Value),
    Sandbox(ExecutionResult),
    Error(CodecellError),
}

pub struct Orchestrator {
    flags: FeatureFlags,
    metrics: Arc<Metrics>,
    audit: AuditSink,
    context_store: Arc<ContextStore>,
    session_registry: Arc<SessionRegistry>,
    capability_index: Arc<CapabilityIndex>,
    sandbox: Arc<dyn SandboxBackend>,
    protocol: Arc<dyn ProtocolCollaborator>,
    admission: AdmissionGate,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flags: FeatureFlags,
        metrics: Arc<Metrics>,
        audit: AuditSink,
        context_store: Arc<ContextStore>,
        session_registry: Arc<SessionRegistry>,
        capability_index: Arc<CapabilityIndex>,
        sandbox: Arc<dyn SandboxBackend>,
        protocol: Arc<dyn ProtocolCollaborator>,
    ) -> Self {
        let admission = AdmissionGate::new(flags.concurrency_cap, flags.concurrency_cap * 4);
        Self {
            flags,
            metrics,
            audit,
            context_store,
            session_registry,
            capability_index,
            sandbox,
            protocol,
            admission,
        }
    }

    pub async fn execute_intent(&self, intent: Intent, session_id: Option<SessionId>) -> Response {
        let trace_id = TraceId::new();
        let started = Instant::now();
        let default_mode = match self.flags.mode {
            RoutingMode::ProtocolOnly => Mode::Protocol,
            _ => Mode::CodeExecution,
        };

        let Some(_permit) = self.admission.acquire().await else {
            let _ = self.metrics.incr_counter("overloaded_total", &[]);
            return Response::failure(
                CodecellError::overloaded(),
                self.metadata(0, started, false, default_mode, trace_id),
            );
        };

        if let Some(session_id) = session_id {
            self.session_registry.touch(session_id);
        }

        let tokens = estimate_tokens(intent.byte_len(), intent.name.len());
        if tokens > self.flags.max_tokens_per_request {
            return Response::failure(
                CodecellError::token_limit_exceeded(tokens, self.flags.max_tokens_per_request),
                self.metadata(tokens, started, false, default_mode, trace_id),
            );
        }

        if let Some(cached) = cache::lookup(&self.context_store, &intent).await {
            let response = with_fresh_metadata(cached, trace_id, started, true);
            let mode = response.metadata().mode;
            let _ = self.metrics.incr_counter("cache_hit_total", &[]);
            let _ = self.metrics.incr_counter("requests_total", &[mode_label(mode)]);
            let _ = self.audit.emit(
                AuditEvent::new("execute_intent", trace_id, response_outcome(&response))
                    .with_intent(intent.name.clone()),
            );
            return response;
        }

        let dispatch = match self.flags.mode {
            RoutingMode::ProtocolOnly => self.run_protocol_only(&intent).await,
            RoutingMode::CodeExecution => self.run_code_execution(&intent).await,
            RoutingMode::Hybrid => self.run_hybrid(&intent).await,
        };

        let (response, mode) = self.shape_response(dispatch, tokens, started, trace_id);

        let _ = self.metrics.incr_counter("requests_total", &[mode_label(mode)]);
        let _ = self
            .metrics
            .observe_histogram("execution_time_ms", &[mode_label(mode)], started.elapsed().as_millis() as f64);
        let _ = self.metrics.observe_histogram("tokens_used", &[], tokens as f64);

        if matches!(response, Response::Success { .. }) {
            cache::store_response(&self.context_store, &intent, &response, self.flags.cache_ttl_seconds).await;
        }

        let _ = self.audit.emit(
            AuditEvent::new("execute_intent", trace_id, response_outcome(&response))
                .with_intent(intent.name.clone()),
        );

        response
    }

    async fn run_protocol_only(&self, intent: &Intent) -> DispatchResult {
        let deadline = Duration::from_millis(self.flags.max_execution_time_ms);
        match self.call_protocol(intent, deadline).await {
            Ok(value) => DispatchResult::Protocol(value),
            Err(err) => DispatchResult::Error(protocol_error_to_codecell(err)),
        }
    }

    async fn run_code_execution(&self, intent: &Intent) -> DispatchResult {
        match self.run_sandbox(intent).await {
            Ok(result) => DispatchResult::Sandbox(result),
            Err(err) => DispatchResult::Error(err),
        }
    }

    async fn run_hybrid(&self, intent: &Intent) -> DispatchResult {
        let sandbox_result = self.run_sandbox(intent).await;
        let fallback_eligible = match &sandbox_result {
            Ok(result) => matches!(
                result.status,
                ExecutionStatus::Rejected | ExecutionStatus::InternalError
            ),
            Err(err) => err.code.is_fallback_eligible(),
        };

        if !fallback_eligible {
            return match sandbox_result {
                Ok(result) => DispatchResult::Sandbox(result),
                Err(err) => DispatchResult::Error(err),
            };
        }

        let _ = self.metrics.incr_counter("fallback_total", &[]);
        let deadline = Duration::from_millis(self.flags.max_execution_time_ms);
        match self.call_protocol(intent, deadline).await {
            Ok(value) => DispatchResult::Protocol(value),
            Err(err) => DispatchResult::Error(protocol_error_to_codecell(err)),
        }
    }

    async fn call_protocol(&self, intent: &Intent, deadline: Duration) -> Result<serde_json::Value, ProtocolError> {
        let cancellation = CancellationToken::new();
        let canceller = cancellation.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            canceller.cancel();
        });

        let result = tokio::select! {
            result = self.protocol.handle(intent, cancellation.clone()) => result,
            _ = cancellation.cancelled() => Err(ProtocolError::Unavailable(
                "protocol collaborator deadline exceeded".to_string(),
            )),
        };
        timer.abort();
        result
    }

    async fn run_sandbox(&self, intent: &Intent) -> Result<ExecutionResult, CodecellError> {
        let entry = self
            .capability_index
            .lookup(&intent.name)
            .ok_or_else(|| CodecellError::unknown_intent(&intent.name))?;
        let template = self.capability_index.template_for(entry).ok_or_else(|| {
            CodecellError::internal(format!("no template registered for {}", entry.template_id))
        })?;
        let code = Materializer::render(template, &intent.params).map_err(|err| match err {
            MaterializeError::MissingParameter(name) => {
                CodecellError::invalid_request(format!("missing parameter: {name}"))
            }
        })?;

        let scratch = tempfile::Builder::new()
            .prefix("codecell-")
            .tempdir()
            .map_err(|e| CodecellError::internal(e.to_string()))?;

        let request = ExecutionRequest {
            code,
            timeout_ms: self.flags.max_execution_time_ms,
            memory_bytes: self.flags.max_memory_bytes,
            process_limit: self.flags.max_process_count,
            fs_policy: FsPolicy {
                writable_scratch: scratch.path().to_path_buf(),
                mounts: Vec::new(),
                ..FsPolicy::default()
            },
            net_policy: NetPolicy::DenyAll,
            workdir: scratch.path().to_path_buf(),
        };

        let mut call = self
            .sandbox
            .launch(&request)
            .await
            .map_err(|e| CodecellError::internal(e.to_string()))?;
        let result = self
            .sandbox
            .wait(&mut call, Duration::from_millis(request.timeout_ms))
            .await;
        if let Err(err) = self.sandbox.reap(call).await {
            tracing::warn!(error = %err, "sandbox reap failed");
        }

        record_sandbox_outcome(&self.metrics, &result);
        Ok(result)
    }

    fn shape_response(
        &self,
        dispatch: DispatchResult,
        tokens: u64,
        started: Instant,
        trace_id: TraceId,
    ) -> (Response, Mode) {
        match dispatch {
            DispatchResult::Protocol(data) => {
                let metadata = self.metadata(tokens, started, false, Mode::Protocol, trace_id);
                (
                    Response::success("completed", data, metadata, serde_json::Value::Null),
                    Mode::Protocol,
                )
            }
            DispatchResult::Sandbox(result) => {
                let mode = Mode::CodeExecution;
                let metadata = self.metadata(tokens, started, false, mode, trace_id);
                let status = status_str(result.status);
                let data = serde_json::json!({
                    "status": status,
                    "exit_code": result.exit_code,
                    "resource_kind": result.resource_kind,
                    "stdout": String::from_utf8_lossy(&result.stdout),
                    "stderr": String::from_utf8_lossy(&result.stderr),
                    "stdout_truncated": result.stdout_truncated,
                    "stderr_truncated": result.stderr_truncated,
                    "wall_time_ms": result.wall_time_ms,
                    "peak_memory_bytes": result.peak_memory_bytes,
                });
                (Response::success(status, data, metadata, serde_json::Value::Null), mode)
            }
            DispatchResult::Error(err) => {
                let mode = default_mode_for(&self.flags.mode);
                let metadata = self.metadata(tokens, started, false, mode, trace_id);
                (Response::failure(err, metadata), mode)
            }
        }
    }

    fn metadata(
        &self,
        tokens: u64,
        started: Instant,
        cache_hit: bool,
        mode: Mode,
        trace_id: TraceId,
    ) -> Metadata {
        Metadata {
            tokens_used: tokens,
            execution_time_ms: started.elapsed().as_millis() as u64,
            cache_hit,
            mode,
            trace_id,
        }
    }
}

fn default_mode_for(mode: &RoutingMode) -> Mode {
    match mode {
        RoutingMode::ProtocolOnly => Mode::Protocol,
        _ => Mode::CodeExecution,
    }
}

fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Protocol => "protocol",
        Mode::CodeExecution => "code_execution",
    }
}

fn status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::TimedOut => "timed_out",
        ExecutionStatus::ResourceExceeded => "resource_exceeded",
        ExecutionStatus::Rejected => "rejected",
        ExecutionStatus::InternalError => "internal_error",
    }
}

fn protocol_error_to_codecell(err: ProtocolError) -> CodecellError {
    match err {
        ProtocolError::Unavailable(msg) => CodecellError::backend_unavailable(msg),
        ProtocolError::Rejected(msg) => CodecellError::new(ErrorCode::SandboxRejection, msg),
    }
}

fn record_sandbox_outcome(metrics: &Metrics, result: &ExecutionResult) {
    match result.status {
        ExecutionStatus::TimedOut => {
            let _ = metrics.incr_counter("timed_out_total", &[]);
        }
        ExecutionStatus::ResourceExceeded => {
            let kind = result
                .resource_kind
                .map(|k| match k {
                    codecell_types::execution::ResourceKind::Memory => "memory",
                    codecell_types::execution::ResourceKind::Processes => "processes",
                    codecell_types::execution::ResourceKind::Disk => "disk",
                })
                .unwrap_or("unknown");
            let _ = metrics.incr_counter("resource_exceeded_total", &[kind]);
        }
        _ => {}
    }
    let _ = metrics.observe_histogram("sandbox_wall_time_ms", &[], result.wall_time_ms as f64);
}

fn response_outcome(response: &Response) -> String {
    match response {
        Response::Success { result, .. } => result.status.clone(),
        Response::Failure { error, .. } => error.code.to_string(),
    }
}

fn with_fresh_metadata(response: Response, trace_id: TraceId, started: Instant, cache_hit: bool) -> Response {
    match response {
        Response::Success { protocol, mut result, schema } => {
            result.metadata = Metadata {
                tokens_used: result.metadata.tokens_used,
                execution_time_ms: started.elapsed().as_millis() as u64,
                cache_hit,
                mode: result.metadata.mode,
                trace_id,
            };
            Response::Success { protocol, result, schema }
        }
        failure => failure,
    }
}
