// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded runtime used by `corpus submit`
//!
//! Starts a full runtime in-process with the built-in workers, runs one
//! request and shuts down again so state is flushed to `state_dir`.

use anyhow::{Context, Result};
use std::path::PathBuf;

use corpus_core::application::WorkerRegistry;
use corpus_core::infrastructure::workers::{builtin_workers, Workspace};
use corpus_core::{CorpusConfig, CorpusRuntime, PlanningError, Request, SynthesisResult};

pub struct EmbeddedExecutor {
    runtime: CorpusRuntime,
}

impl EmbeddedExecutor {
    pub async fn new(config: CorpusConfig, workspace: PathBuf) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;

        let registry: WorkerRegistry = builtin_workers(Workspace::new(workspace)).into_iter().collect();
        let runtime = CorpusRuntime::start(config, registry)
            .await
            .context("Failed to start embedded runtime")?;

        Ok(Self { runtime })
    }

    pub async fn submit(&self, request: Request) -> Result<SynthesisResult, PlanningError> {
        self.runtime.submit(request).await
    }

    pub async fn shutdown(self) -> Result<()> {
        self.runtime.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_embedded_submit_writes_into_workspace() {
        let workspace = tempfile::tempdir().unwrap();
        let executor = EmbeddedExecutor::new(CorpusConfig::default(), workspace.path().to_path_buf())
            .await
            .unwrap();

        let result = executor
            .submit(Request::new("write_file", json!({"path": "hello.txt", "content": "hi"})))
            .await
            .unwrap();

        assert!(result.overall_success);
        assert_eq!(
            std::fs::read_to_string(workspace.path().join("hello.txt")).unwrap(),
            "hi"
        );
        executor.shutdown().await.unwrap();
    }
}
