//! Process-wide configuration, immutable after construction. Field set and
//! defaults are fixed by the external interface contract; configuration
//! *loading* (files, env vars, CLI flags) is the embedder's concern, not
//! this crate's — it only defines the record and its defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    ProtocolOnly,
    CodeExecution,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxBackendKind {
    Container,
    SyscallFilter,
    InProcess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextBackendKind {
    Memory,
    RemoteKv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub mode: RoutingMode,
    #[serde(default = "default_enable_sandbox")]
    pub enable_sandbox: bool,
    #[serde(default = "default_sandbox_backend")]
    pub sandbox_backend: SandboxBackendKind,
    #[serde(default = "default_production")]
    pub production: bool,
    #[serde(default = "default_max_execution_time_ms")]
    pub max_execution_time_ms: u64,
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: u64,
    #[serde(default = "default_max_process_count")]
    pub max_process_count: u32,
    #[serde(default = "default_max_file_handles")]
    pub max_file_handles: u32,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,
    #[serde(default = "default_max_tokens_per_request")]
    pub max_tokens_per_request: u64,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_context_size_limit_bytes")]
    pub context_size_limit_bytes: u64,
    #[serde(default = "default_context_backend")]
    pub context_backend: ContextBackendKind,
    #[serde(default)]
    pub remote_kv_url: Option<String>,
    #[serde(default = "default_concurrency_cap")]
    pub concurrency_cap: usize,
    #[serde(default)]
    pub pool_size: usize,
    #[serde(default)]
    pub audit_sink_path: String,
    #[serde(default)]
    pub metrics_listen_addr: String,
}

fn default_enable_sandbox() -> bool {
    true
}
fn default_sandbox_backend() -> SandboxBackendKind {
    SandboxBackendKind::Container
}
fn default_production() -> bool {
    false
}
fn default_max_execution_time_ms() -> u64 {
    30_000
}
fn default_max_memory_bytes() -> u64 {
    512 * 1024 * 1024
}
fn default_max_process_count() -> u32 {
    50
}
fn default_max_file_handles() -> u32 {
    100
}
fn default_max_output_bytes() -> u64 {
    1024 * 1024
}
fn default_max_tokens_per_request() -> u64 {
    1000
}
fn default_cache_ttl_seconds() -> u64 {
    300
}
fn default_context_size_limit_bytes() -> u64 {
    100 * 1024
}
fn default_context_backend() -> ContextBackendKind {
    ContextBackendKind::Memory
}
fn default_concurrency_cap() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
}

impl FeatureFlags {
    pub fn with_mode(mode: RoutingMode) -> Self {
        Self {
            mode,
            enable_sandbox: default_enable_sandbox(),
            sandbox_backend: default_sandbox_backend(),
            production: default_production(),
            max_execution_time_ms: default_max_execution_time_ms(),
            max_memory_bytes: default_max_memory_bytes(),
            max_process_count: default_max_process_count(),
            max_file_handles: default_max_file_handles(),
            max_output_bytes: default_max_output_bytes(),
            max_tokens_per_request: default_max_tokens_per_request(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            context_size_limit_bytes: default_context_size_limit_bytes(),
            context_backend: default_context_backend(),
            remote_kv_url: None,
            concurrency_cap: default_concurrency_cap(),
            pool_size: 0,
            audit_sink_path: String::new(),
            metrics_listen_addr: String::new(),
        }
    }
}


impl FeatureFlags {
    pub fn is_valid_for_production(&self) -> bool {
        if self.production {
            return self.enable_sandbox && self.sandbox_backend != SandboxBackendKind::InProcess;
        }
        true
    }
}
