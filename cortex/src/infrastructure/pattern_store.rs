// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Durable pattern store interfaces
//!
//! The learner's bounded in-memory map is the authoritative runtime cache;
//! a `PatternStore` is an optional write-through sink used to keep patterns
//! across sessions and to answer free-text lookups.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::{Pattern, PatternId};

#[derive(Debug, Error)]
pub enum PatternStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Insert or replace the pattern stored under `key`.
    async fn put(&self, key: &PatternId, pattern: &Pattern) -> Result<(), PatternStoreError>;

    /// Find patterns relevant to `query`, best match first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<(Pattern, f64)>, PatternStoreError>;

    async fn get(&self, key: &PatternId) -> Result<Option<Pattern>, PatternStoreError>;
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Token overlap between the query and the pattern's kind + signature,
/// weighted towards patterns that tend to succeed.
fn relevance(query_tokens: &HashSet<String>, pattern: &Pattern) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let mut tokens = tokenize(&pattern.signature);
    tokens.insert(pattern.kind.as_str().to_string());

    let overlap = query_tokens.intersection(&tokens).count() as f64;
    let similarity = overlap / query_tokens.len() as f64;
    similarity * (0.5 + 0.5 * pattern.success_rate)
}

fn rank(patterns: impl Iterator<Item = Pattern>, query: &str, limit: usize) -> Vec<(Pattern, f64)> {
    let query_tokens = tokenize(query);
    let mut scored: Vec<(Pattern, f64)> = patterns
        .map(|p| {
            let score = relevance(&query_tokens, &p);
            (p, score)
        })
        .filter(|(_, score)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    scored.truncate(limit);
    scored
}

/// In-memory store for testing and single-session use
#[derive(Clone, Default)]
pub struct InMemoryPatternStore {
    patterns: Arc<RwLock<HashMap<PatternId, Pattern>>>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.patterns.read().await.len()
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn put(&self, key: &PatternId, pattern: &Pattern) -> Result<(), PatternStoreError> {
        self.patterns.write().await.insert(key.clone(), pattern.clone());
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<(Pattern, f64)>, PatternStoreError> {
        let patterns = self.patterns.read().await;
        Ok(rank(patterns.values().cloned(), query, limit))
    }

    async fn get(&self, key: &PatternId) -> Result<Option<Pattern>, PatternStoreError> {
        Ok(self.patterns.read().await.get(key).cloned())
    }
}

/// JSON-file backed store: the whole map is rewritten on every `put`.
pub struct JsonFilePatternStore {
    path: PathBuf,
    patterns: RwLock<HashMap<PatternId, Pattern>>,
}

impl JsonFilePatternStore {
    /// Open the store at `path`, loading existing content if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PatternStoreError> {
        let path = path.as_ref().to_path_buf();
        let patterns = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<Pattern> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|p| (p.id.clone(), p)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            patterns: RwLock::new(patterns),
        })
    }

    async fn flush(&self, patterns: &HashMap<PatternId, Pattern>) -> Result<(), PatternStoreError> {
        let mut list: Vec<&Pattern> = patterns.values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        let bytes = serde_json::to_vec_pretty(&list)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PatternStore for JsonFilePatternStore {
    async fn put(&self, key: &PatternId, pattern: &Pattern) -> Result<(), PatternStoreError> {
        let mut patterns = self.patterns.write().await;
        patterns.insert(key.clone(), pattern.clone());
        self.flush(&patterns).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<(Pattern, f64)>, PatternStoreError> {
        let patterns = self.patterns.read().await;
        Ok(rank(patterns.values().cloned(), query, limit))
    }

    async fn get(&self, key: &PatternId) -> Result<Option<Pattern>, PatternStoreError> {
        Ok(self.patterns.read().await.get(key).cloned())
    }
}
