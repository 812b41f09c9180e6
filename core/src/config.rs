// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Orchestrator configuration. Loaded from a YAML manifest (or overridden
//! field-by-field by the CLI's own flags/env vars), in the spirit of the
//! fleet's other manifest-shaped configuration — narrowed here to what this
//! engine actually needs: no node identity, no LLM provider settings.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_bind_address() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_executor() -> ExecutorKind {
    ExecutorKind::Local
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Local,
    TaskQueue,
    Push { submit_url: String, callback_url: String },
}

/// The orchestrator's own configuration manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// `postgres://...` connection string, or omitted to use the in-memory
    /// store (development/tests only — not durable across restarts).
    pub database_url: Option<String>,

    #[serde(default = "default_executor")]
    pub executor: ExecutorKind,

    #[serde(default = "default_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            executor: default_executor(),
            worker_poll_interval_ms: default_poll_interval_ms(),
            bind_address: default_bind_address(),
            log_level: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file at {}", path.display()))
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_the_in_memory_store_and_local_executor() {
        let config = OrchestratorConfig::default();
        assert!(config.database_url.is_none());
        assert!(matches!(config.executor, ExecutorKind::Local));
        assert_eq!(config.worker_poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn parses_a_minimal_yaml_manifest() {
        let yaml = "database_url: postgres://localhost/aegis_workflow\nexecutor: local\n";
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/aegis_workflow"));
    }
}
