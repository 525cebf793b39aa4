// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Built-in Workers
//!
//! | Worker | Particle id | Parameters | Output |
//! |--------|-------------|------------|--------|
//! | [`EchoWorker`] | `echo` | `message` | `{message}` |
//! | [`FileWriterWorker`] | `file_writer` | `path`, `content` | `{path, bytes}` |
//! | [`FileReaderWorker`] | `file_reader` | `path` | `{path, content, bytes}` |
//!
//! File workers resolve paths against a workspace root. Absolute paths and
//! `..` components are rejected before any I/O happens.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::particle::{DomainWorker, MetricDeclaration, WorkerOutcome};

pub const ECHO: &str = "echo";
pub const FILE_WRITER: &str = "file_writer";
pub const FILE_READER: &str = "file_reader";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkspacePathError {
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Absolute paths are not allowed: {0}")]
    Absolute(String),

    #[error("Empty path")]
    Empty,
}

/// Directory the file workers are confined to.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, relative: &str) -> Result<PathBuf, WorkspacePathError> {
        let path = Path::new(relative);
        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    warn!(path = %relative, "Path traversal attempt detected");
                    return Err(WorkspacePathError::PathTraversal(relative.to_string()));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(WorkspacePathError::Absolute(relative.to_string()));
                }
            }
        }
        if normalized.as_os_str().is_empty() {
            return Err(WorkspacePathError::Empty);
        }
        Ok(self.root.join(normalized))
    }
}

fn str_param<'a>(parameters: &'a Value, name: &str) -> Result<&'a str, String> {
    parameters
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing string parameter '{}'", name))
}

#[derive(Debug, Default, Clone)]
pub struct EchoWorker;

#[async_trait]
impl DomainWorker for EchoWorker {
    fn kind(&self) -> &str {
        ECHO
    }

    async fn execute(&self, parameters: &Value) -> WorkerOutcome {
        match parameters.get("message") {
            Some(message) => WorkerOutcome::ok(json!({ "message": message })),
            None => WorkerOutcome::ok(parameters.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileWriterWorker {
    workspace: Workspace,
}

impl FileWriterWorker {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn write(&self, parameters: &Value) -> Result<Value, String> {
        let relative = str_param(parameters, "path")?;
        let content = str_param(parameters, "content")?;
        let path = self.workspace.resolve(relative).map_err(|e| e.to_string())?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
        }
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;

        debug!(path = %path.display(), bytes = content.len(), "Wrote file");
        Ok(json!({ "path": relative, "bytes": content.len() }))
    }
}

#[async_trait]
impl DomainWorker for FileWriterWorker {
    fn kind(&self) -> &str {
        FILE_WRITER
    }

    async fn execute(&self, parameters: &Value) -> WorkerOutcome {
        match self.write(parameters).await {
            Ok(output) => WorkerOutcome::ok(output),
            Err(e) => WorkerOutcome::failed(e),
        }
    }

    fn declared_metrics(&self) -> Vec<MetricDeclaration> {
        vec![MetricDeclaration::new("bytes_written", 0.0)]
    }

    fn metric_updates(&self, outcome: &WorkerOutcome) -> Vec<(String, f64)> {
        match outcome.output.get("bytes").and_then(|b| b.as_f64()) {
            Some(bytes) if outcome.success => vec![("bytes_written".to_string(), bytes)],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileReaderWorker {
    workspace: Workspace,
}

impl FileReaderWorker {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn read(&self, parameters: &Value) -> Result<Value, String> {
        let relative = str_param(parameters, "path")?;
        let path = self.workspace.resolve(relative).map_err(|e| e.to_string())?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Ok(json!({ "path": relative, "bytes": content.len(), "content": content }))
    }
}

#[async_trait]
impl DomainWorker for FileReaderWorker {
    fn kind(&self) -> &str {
        FILE_READER
    }

    async fn execute(&self, parameters: &Value) -> WorkerOutcome {
        match self.read(parameters).await {
            Ok(output) => WorkerOutcome::ok(output),
            Err(e) => WorkerOutcome::failed(e),
        }
    }
}

/// The three built-in workers rooted at `workspace`.
pub fn builtin_workers(workspace: Workspace) -> Vec<Arc<dyn DomainWorker>> {
    vec![
        Arc::new(EchoWorker),
        Arc::new(FileWriterWorker::new(workspace.clone())),
        Arc::new(FileReaderWorker::new(workspace)),
    ]
}
