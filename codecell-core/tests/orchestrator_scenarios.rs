//! End-to-end scenarios for `Orchestrator::execute_intent`, covering one
//! request through each routing path: real sandboxed success (exercising
//! the capability index, materializer, and in-process tier together),
//! the resource-outcome classifications the container tier reports, and
//! hybrid-mode fallback to the protocol collaborator.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codecell_capability::{CapabilityIndex, Template};
use codecell_context::{ContextStore, InMemoryBackend, SessionRegistry};
use codecell_core::{FeatureFlags, Orchestrator, ProtocolCollaborator, ProtocolError, RoutingMode};
use codecell_sandbox::{ContainerBackend, ContainerRuntime, ContainerWaitOutcome, InProcessBackend, SandboxBackend, SandboxError};
use codecell_telemetry::audit::AuditSink;
use codecell_telemetry::metrics::Metrics;
use codecell_types::execution::ExecutionRequest;
use codecell_types::{Category, CapabilityEntry, Complexity, Intent, Response};
use parking_lot::Mutex;

struct AlwaysUnavailable;

#[async_trait]
impl ProtocolCollaborator for AlwaysUnavailable {
    async fn handle(
        &self,
        _intent: &Intent,
        _cancellation: tokio_util::sync::CancellationToken,
    ) -> Result<serde_json::Value, ProtocolError> {
        Err(ProtocolError::Unavailable("no collaborator wired up".to_string()))
    }
}

struct Echoing;

#[async_trait]
impl ProtocolCollaborator for Echoing {
    async fn handle(
        &self,
        intent: &Intent,
        _cancellation: tokio_util::sync::CancellationToken,
    ) -> Result<serde_json::Value, ProtocolError> {
        Ok(serde_json::json!({"handled_by": "protocol", "intent": intent.name}))
    }
}

/// A `ContainerRuntime` double that replays one queued outcome per
/// `create`/`wait` pair and records which containers were torn down, so
/// tests can assert no container is left running past its call.
struct QueuedRuntime {
    outcomes: Mutex<VecDeque<ContainerWaitOutcome>>,
    destroyed: Mutex<Vec<String>>,
    next_id: Mutex<u32>,
}

impl QueuedRuntime {
    fn new(outcomes: Vec<ContainerWaitOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            destroyed: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    fn destroyed_all(&self) -> bool {
        !self.destroyed.lock().is_empty()
    }
}

#[async_trait]
impl ContainerRuntime for QueuedRuntime {
    async fn create(&self, _request: &ExecutionRequest) -> Result<String, SandboxError> {
        let mut next = self.next_id.lock();
        *next += 1;
        Ok(format!("container-{next}"))
    }

    async fn spawn_quiescent(&self) -> Result<String, SandboxError> {
        self.create(&dummy_request()).await
    }

    async fn exec(&self, _container_id: &str, _request: &ExecutionRequest) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn wait(&self, _container_id: &str, _timeout: Duration) -> ContainerWaitOutcome {
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or(ContainerWaitOutcome::LaunchFailed("no outcome queued".into()))
    }

    async fn kill(&self, _container_id: &str) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn destroy(&self, container_id: &str) -> Result<(), SandboxError> {
        self.destroyed.lock().push(container_id.to_string());
        Ok(())
    }

    async fn peak_memory_bytes(&self, _container_id: &str) -> Option<u64> {
        None
    }
}

fn dummy_request() -> ExecutionRequest {
    ExecutionRequest {
        code: "true".to_string(),
        timeout_ms: 1000,
        memory_bytes: 1024 * 1024,
        process_limit: 4,
        fs_policy: codecell_types::execution::FsPolicy::default(),
        net_policy: codecell_types::execution::NetPolicy::DenyAll,
        workdir: std::env::temp_dir(),
    }
}

fn echo_capability_index() -> CapabilityIndex {
    CapabilityIndex::load(
        vec![CapabilityEntry {
            name: "echo".to_string(),
            category: Category::Query,
            complexity: Complexity::Simple,
            template_id: "echo_tpl".to_string(),
        }],
        vec![Template {
            id: "echo_tpl".to_string(),
            source: "echo {message}".to_string(),
        }],
    )
}

async fn new_audit() -> AuditSink {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _handle) = AuditSink::spawn(dir.path().join("audit.log")).await.unwrap();
    sink
}

fn new_context() -> Arc<ContextStore> {
    Arc::new(ContextStore::new(Box::new(InMemoryBackend::default())))
}

#[tokio::test]
async fn simple_success_runs_once_then_hits_cache() {
    let mut flags = FeatureFlags::with_mode(RoutingMode::CodeExecution);
    flags.max_execution_time_ms = 2000;

    let context = new_context();
    let orchestrator = Orchestrator::new(
        flags,
        Arc::new(Metrics::new().unwrap()),
        new_audit().await,
        context.clone(),
        Arc::new(SessionRegistry::new(context, Duration::from_secs(300))),
        Arc::new(echo_capability_index()),
        Arc::new(InProcessBackend::build(false).unwrap()),
        Arc::new(AlwaysUnavailable),
    );

    let intent = Intent::new("echo").with_param("message", serde_json::json!("hi"));

    let first = orchestrator.execute_intent(intent.clone(), None).await;
    let first_result = match &first {
        Response::Success { result, .. } => result,
        Response::Failure { error, .. } => panic!("expected success, got {error:?}"),
    };
    assert_eq!(first_result.status, "completed");
    assert!(!first_result.metadata.cache_hit);
    assert_eq!(first_result.data["stdout"], "hi\n");

    let second = orchestrator.execute_intent(intent, None).await;
    match second {
        Response::Success { result, .. } => assert!(result.metadata.cache_hit),
        Response::Failure { error, .. } => panic!("expected cached success, got {error:?}"),
    }
}

#[tokio::test]
async fn timed_out_sandbox_outcome_is_reported_and_counted() {
    let mut flags = FeatureFlags::with_mode(RoutingMode::CodeExecution);
    flags.max_execution_time_ms = 2000;

    let runtime = QueuedRuntime::new(vec![ContainerWaitOutcome::TimedOut]);
    let sandbox: Arc<dyn SandboxBackend> = Arc::new(ContainerBackend::new(runtime));
    let metrics = Arc::new(Metrics::new().unwrap());
    let context = new_context();

    let orchestrator = Orchestrator::new(
        flags,
        metrics.clone(),
        new_audit().await,
        context.clone(),
        Arc::new(SessionRegistry::new(context, Duration::from_secs(300))),
        Arc::new(echo_capability_index()),
        sandbox,
        Arc::new(AlwaysUnavailable),
    );

    let response = orchestrator
        .execute_intent(Intent::new("echo").with_param("message", serde_json::json!("hi")), None)
        .await;

    match response {
        Response::Success { result, .. } => assert_eq!(result.status, "timed_out"),
        Response::Failure { error, .. } => panic!("expected a timed_out result, got {error:?}"),
    }
    assert!(metrics.encode().contains("timed_out_total 1"));
}

#[tokio::test]
async fn memory_bomb_outcome_classifies_as_resource_exceeded_and_tears_down() {
    let mut flags = FeatureFlags::with_mode(RoutingMode::CodeExecution);
    flags.max_execution_time_ms = 2000;

    let runtime = Arc::new(QueuedRuntime::new(vec![ContainerWaitOutcome::OomKilled]));
    let sandbox: Arc<dyn SandboxBackend> = Arc::new(ContainerBackend::new(CountingRuntime(runtime.clone())));
    let metrics = Arc::new(Metrics::new().unwrap());
    let context = new_context();

    let orchestrator = Orchestrator::new(
        flags,
        metrics.clone(),
        new_audit().await,
        context.clone(),
        Arc::new(SessionRegistry::new(context, Duration::from_secs(300))),
        Arc::new(echo_capability_index()),
        sandbox,
        Arc::new(AlwaysUnavailable),
    );

    let response = orchestrator
        .execute_intent(Intent::new("echo").with_param("message", serde_json::json!("hi")), None)
        .await;

    match response {
        Response::Success { result, .. } => {
            assert_eq!(result.status, "resource_exceeded");
            assert_eq!(result.data["resource_kind"], "memory");
        }
        Response::Failure { error, .. } => panic!("expected resource_exceeded, got {error:?}"),
    }
    assert!(metrics.encode().contains("resource_exceeded_total"));
    assert!(runtime.destroyed_all(), "container must be torn down, never left running");
}

/// Thin pass-through so `CountingRuntime` can borrow the same `QueuedRuntime`
/// both directly (for assertions) and through a backend that requires
/// ownership of its runtime.
struct CountingRuntime(Arc<QueuedRuntime>);

#[async_trait]
impl ContainerRuntime for CountingRuntime {
    async fn create(&self, request: &ExecutionRequest) -> Result<String, SandboxError> {
        self.0.create(request).await
    }
    async fn spawn_quiescent(&self) -> Result<String, SandboxError> {
        self.0.spawn_quiescent().await
    }
    async fn exec(&self, container_id: &str, request: &ExecutionRequest) -> Result<(), SandboxError> {
        self.0.exec(container_id, request).await
    }
    async fn wait(&self, container_id: &str, timeout: Duration) -> ContainerWaitOutcome {
        self.0.wait(container_id, timeout).await
    }
    async fn kill(&self, container_id: &str) -> Result<(), SandboxError> {
        self.0.kill(container_id).await
    }
    async fn destroy(&self, container_id: &str) -> Result<(), SandboxError> {
        self.0.destroy(container_id).await
    }
    async fn peak_memory_bytes(&self, container_id: &str) -> Option<u64> {
        self.0.peak_memory_bytes(container_id).await
    }
}

#[tokio::test]
async fn fork_bomb_outcome_classifies_as_resource_exceeded_processes() {
    let mut flags = FeatureFlags::with_mode(RoutingMode::CodeExecution);
    flags.max_execution_time_ms = 2000;

    let runtime = QueuedRuntime::new(vec![ContainerWaitOutcome::PidsLimitKilled]);
    let sandbox: Arc<dyn SandboxBackend> = Arc::new(ContainerBackend::new(runtime));
    let context = new_context();

    let orchestrator = Orchestrator::new(
        flags,
        Arc::new(Metrics::new().unwrap()),
        new_audit().await,
        context.clone(),
        Arc::new(SessionRegistry::new(context, Duration::from_secs(300))),
        Arc::new(echo_capability_index()),
        sandbox,
        Arc::new(AlwaysUnavailable),
    );

    let response = orchestrator
        .execute_intent(Intent::new("echo").with_param("message", serde_json::json!("hi")), None)
        .await;

    match response {
        Response::Success { result, .. } => {
            assert_eq!(result.status, "resource_exceeded");
            assert_eq!(result.data["resource_kind"], "processes");
        }
        Response::Failure { error, .. } => panic!("expected resource_exceeded, got {error:?}"),
    }
}

#[tokio::test]
async fn unknown_intent_in_hybrid_mode_falls_back_to_protocol() {
    let mut flags = FeatureFlags::with_mode(RoutingMode::Hybrid);
    flags.max_execution_time_ms = 2000;

    let metrics = Arc::new(Metrics::new().unwrap());
    let context = new_context();
    let empty_index = CapabilityIndex::load(Vec::new(), Vec::new());

    let orchestrator = Orchestrator::new(
        flags,
        metrics.clone(),
        new_audit().await,
        context.clone(),
        Arc::new(SessionRegistry::new(context, Duration::from_secs(300))),
        Arc::new(empty_index),
        Arc::new(InProcessBackend::build(false).unwrap()),
        Arc::new(Echoing),
    );

    let response = orchestrator
        .execute_intent(Intent::new("not_a_real_intent"), None)
        .await;

    match response {
        Response::Success { result, .. } => {
            assert_eq!(result.metadata.mode, codecell_types::response::Mode::Protocol);
            assert_eq!(result.data["handled_by"], "protocol");
        }
        Response::Failure { error, .. } => panic!("expected a protocol fallback, got {error:?}"),
    }
    assert!(metrics.encode().contains("fallback_total 1"));
}

// Scenario 6 (payload-too-large on an oversized context-store write,
// verifying the prior value survives) is covered directly against
// `InMemoryBackend` in codecell-context — see
// `oversized_write_fails_before_any_state_change`. Re-asserting it here
// through the orchestrator would only re-test the same backend code path.
