//! Thin process entry point: wires the library crates into a long-running
//! worker loop that reads newline-delimited JSON requests from stdin and
//! writes newline-delimited JSON responses to stdout. Everything that
//! actually implements the protocol lives in `codecell-core` and below;
//! this binary only constructs it and owns the I/O loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use codecell_capability::{CapabilityIndex, Template};
use codecell_context::{ContextStore, InMemoryBackend, SessionRegistry};
use codecell_core::{FeatureFlags, Orchestrator, ProtocolCollaborator, ProtocolError, RoutingMode};
use codecell_sandbox::{InProcessBackend, SandboxBackend, SyscallFilterBackend};
use codecell_telemetry::{AuditSink, Metrics};
use codecell_types::{CapabilityEntry, CodecellError, Intent, Metadata, Mode, Request, Response, TraceId};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

const DEFAULT_SESSION_TTL_SECS: u64 = 1800;
const DEFAULT_AUDIT_PATH: &str = "codecell-audit.log";

fn main() -> std::process::ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: {err:?}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:?}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    init_tracing();

    let flags = load_feature_flags().context("failed to load feature flags")?;
    if !flags.is_valid_for_production() {
        anyhow::bail!("feature flags are not valid for a production deployment");
    }

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);

    let audit_path = if flags.audit_sink_path.is_empty() {
        PathBuf::from(DEFAULT_AUDIT_PATH)
    } else {
        PathBuf::from(&flags.audit_sink_path)
    };
    let (audit, _audit_writer) = AuditSink::spawn(&audit_path)
        .await
        .with_context(|| format!("failed to open audit sink at {}", audit_path.display()))?;

    let context_store = Arc::new(build_context_store(&flags)?);
    let session_registry = Arc::new(SessionRegistry::new(
        context_store.clone(),
        Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
    ));
    let capability_index = Arc::new(load_capability_index()?);
    let sandbox = build_sandbox_backend(&flags)?;
    let protocol: Arc<dyn ProtocolCollaborator> = Arc::new(UnavailableCollaborator);

    let orchestrator = Arc::new(Orchestrator::new(
        flags,
        metrics,
        audit,
        context_store,
        session_registry,
        capability_index,
        sandbox,
        protocol,
    ));

    serve_stdio(orchestrator).await
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .try_init();
}

/// `codecell-core` never reads configuration itself; loading the
/// `FeatureFlags` record from whatever the deployment environment provides
/// is this binary's job. `CODECELL_CONFIG` points at a JSON file; absent
/// that, the process runs with hybrid-mode defaults.
fn load_feature_flags() -> Result<FeatureFlags> {
    match std::env::var_os("CODECELL_CONFIG") {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", PathBuf::from(&path).display()))?;
            serde_json::from_str(&raw).context("failed to parse feature flags json")
        }
        None => Ok(FeatureFlags::with_mode(RoutingMode::Hybrid)),
    }
}

fn build_context_store(flags: &FeatureFlags) -> Result<ContextStore> {
    use codecell_core::ContextBackendKind;

    match flags.context_backend {
        ContextBackendKind::Memory => Ok(ContextStore::new(Box::new(InMemoryBackend::new(
            flags.context_size_limit_bytes,
            codecell_context::in_memory::DEFAULT_MAX_ENTRIES,
        )))),
        ContextBackendKind::RemoteKv => {
            anyhow::bail!(
                "remote_kv context backend requires an embedder-supplied RemoteKvClient; \
                 none is wired into this binary"
            )
        }
    }
}

/// Startup-loaded capability corpus. `CODECELL_CAPABILITIES` points at a
/// JSON manifest of `{entries, templates}`; absent that, the index starts
/// empty and every intent routes as unknown until one is supplied.
fn load_capability_index() -> Result<CapabilityIndex> {
    #[derive(Deserialize)]
    struct Manifest {
        #[serde(default)]
        entries: Vec<CapabilityEntry>,
        #[serde(default)]
        templates: Vec<Template>,
    }

    match std::env::var_os("CODECELL_CAPABILITIES") {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", PathBuf::from(&path).display()))?;
            let manifest: Manifest =
                serde_json::from_str(&raw).context("failed to parse capability manifest")?;
            Ok(CapabilityIndex::load(manifest.entries, manifest.templates))
        }
        None => Ok(CapabilityIndex::load(Vec::new(), Vec::new())),
    }
}

fn build_sandbox_backend(flags: &FeatureFlags) -> Result<Arc<dyn SandboxBackend>> {
    use codecell_core::SandboxBackendKind;

    match flags.sandbox_backend {
        SandboxBackendKind::Container => anyhow::bail!(
            "container sandbox backend requires an embedder-supplied ContainerRuntime; \
             none is wired into this binary"
        ),
        SandboxBackendKind::SyscallFilter => Ok(Arc::new(SyscallFilterBackend::new())),
        SandboxBackendKind::InProcess => {
            Ok(Arc::new(InProcessBackend::build(flags.production)?))
        }
    }
}

/// Placeholder collaborator: every embedding of this binary is expected to
/// replace it with whatever actually speaks to the third-party service.
/// Until then, protocol-routed intents fail closed rather than silently
/// pretending to succeed.
struct UnavailableCollaborator;

#[async_trait]
impl ProtocolCollaborator for UnavailableCollaborator {
    async fn handle(
        &self,
        _intent: &Intent,
        _cancellation: CancellationToken,
    ) -> Result<Value, ProtocolError> {
        Err(ProtocolError::Unavailable(
            "no protocol collaborator wired into this deployment".to_string(),
        ))
    }
}

async fn serve_stdio(orchestrator: Arc<Orchestrator>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let session_id = request.session_id();
                let intent = Intent::from(request);
                orchestrator.execute_intent(intent, session_id).await
            }
            Err(err) => {
                tracing::warn!(error = %err, "rejecting malformed request line");
                Response::failure(
                    CodecellError::invalid_request(err.to_string()),
                    Metadata {
                        tokens_used: 0,
                        execution_time_ms: 0,
                        cache_hit: false,
                        mode: Mode::Protocol,
                        trace_id: TraceId::new(),
                    },
                )
            }
        };

        let mut encoded = serde_json::to_vec(&response).context("failed to encode response")?;
        encoded.push(b'\n');
        stdout
            .write_all(&encoded)
            .await
            .context("failed writing response to stdout")?;
        stdout.flush().await.context("failed flushing stdout")?;
    }

    Ok(())
}
