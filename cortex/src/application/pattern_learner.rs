// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PatternLearner - Bounded Pattern Cache
//!
//! Records execution shapes detected during synthesis as [`Pattern`]s in a
//! fixed-capacity map keyed by content-derived ids.
//!
//! ## Rules
//!
//! | Situation | Effect |
//! |-----------|--------|
//! | id unknown, map below capacity | insert |
//! | id unknown, map at capacity | evict least-recently-accessed, then insert |
//! | id known, same content | `occurrence_count += 1`, running-average `success_rate` |
//! | id known, different content | collision: counted, logged, insert skipped |
//!
//! The map never holds more than `capacity` entries. All mutation happens in a
//! single critical section per call.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{IdGenerator, Pattern, PatternId, PatternMapStats, PatternShape};
use crate::infrastructure::PatternStore;

/// Default upper bound on stored patterns.
pub const DEFAULT_PATTERN_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
#[error("Pattern id {id} already holds '{existing}', refusing '{incoming}'")]
pub struct PatternCollisionError {
    pub id: PatternId,
    pub existing: String,
    pub incoming: String,
}

/// Result of a single [`PatternLearner::record`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Inserted(Pattern),
    Reinforced(Pattern),
    Collision(PatternId),
}

impl RecordOutcome {
    pub fn pattern(&self) -> Option<&Pattern> {
        match self {
            RecordOutcome::Inserted(p) | RecordOutcome::Reinforced(p) => Some(p),
            RecordOutcome::Collision(_) => None,
        }
    }
}

/// On-disk form of the pattern map. Patterns are ordered least- to
/// most-recently used so recency survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMapSnapshot {
    pub capacity: usize,
    pub total_evictions: u64,
    pub total_collisions: u64,
    pub patterns: Vec<Pattern>,
}

struct PatternMap {
    entries: LruCache<PatternId, Pattern>,
    capacity: usize,
    total_evictions: u64,
    total_collisions: u64,
}

impl PatternMap {
    fn new(capacity: usize) -> Self {
        let bound = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(bound),
            capacity: bound.get(),
            total_evictions: 0,
            total_collisions: 0,
        }
    }

    fn upsert(&mut self, id: PatternId, shape: &PatternShape) -> Result<RecordOutcome, PatternCollisionError> {
        // peek first: a rejected collision must not refresh the entry's recency
        if let Some(existing) = self.entries.peek(&id) {
            if !existing.matches(shape) {
                return Err(PatternCollisionError {
                    id,
                    existing: format!("{}:{}", existing.kind, existing.signature),
                    incoming: shape.content_key(),
                });
            }
        }
        if let Some(existing) = self.entries.get_mut(&id) {
            existing.observe(shape.success);
            return Ok(RecordOutcome::Reinforced(existing.clone()));
        }
        if self.entries.len() >= self.capacity {
            self.evict_one();
        }

        let pattern = Pattern::from_shape(id.clone(), shape);
        self.entries.put(id, pattern.clone());
        Ok(RecordOutcome::Inserted(pattern))
    }

    fn evict_one(&mut self) {
        if let Some((evicted_id, evicted)) = self.entries.pop_lru() {
            self.total_evictions += 1;
            metrics::counter!("corpus_patterns_evicted_total").increment(1);
            debug!(
                pattern_id = %evicted_id,
                occurrences = evicted.occurrence_count,
                "Evicted least-recently-used pattern"
            );
        }
    }

    fn stats(&self) -> PatternMapStats {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for (_, pattern) in self.entries.iter() {
            let weight = pattern.weight();
            weighted += weight * pattern.entropy_reduction * pattern.success_rate;
            total_weight += weight;
        }

        PatternMapStats {
            size: self.entries.len(),
            capacity: self.capacity,
            total_evictions: self.total_evictions,
            total_collisions: self.total_collisions,
            consciousness_score: if total_weight > 0.0 { weighted / total_weight } else { 0.0 },
        }
    }
}

pub struct PatternLearner {
    ids: IdGenerator,
    map: Mutex<PatternMap>,
    store: Option<Arc<dyn PatternStore>>,
}

impl PatternLearner {
    pub fn new(capacity: usize) -> Self {
        Self::with_id_generator(capacity, IdGenerator::new("pattern"))
    }

    /// Use a specific generator, e.g. one with a custom content hasher.
    pub fn with_id_generator(capacity: usize, ids: IdGenerator) -> Self {
        Self {
            ids,
            map: Mutex::new(PatternMap::new(capacity)),
            store: None,
        }
    }

    /// Mirror every recorded pattern to `store`.
    pub fn with_store(mut self, store: Arc<dyn PatternStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn pattern_id(&self, shape: &PatternShape) -> PatternId {
        PatternId::new(self.ids.content_id(shape.content_key().as_bytes()))
    }

    /// Record one sighting of `shape`.
    pub fn record(&self, shape: &PatternShape) -> RecordOutcome {
        let id = self.pattern_id(shape);
        let mut map = self.map.lock();

        match map.upsert(id, shape) {
            Ok(outcome) => {
                if let RecordOutcome::Inserted(pattern) = &outcome {
                    debug!(pattern_id = %pattern.id, kind = %pattern.kind, "New pattern recorded");
                }
                outcome
            }
            Err(collision) => {
                map.total_collisions += 1;
                metrics::counter!("corpus_patterns_collisions_total").increment(1);
                warn!(error = %collision, "Pattern id collision, skipping insert");
                RecordOutcome::Collision(collision.id)
            }
        }
    }

    /// Record a batch of shapes and write the resulting patterns through to
    /// the configured store. Store failures are logged, not returned.
    pub async fn learn(&self, shapes: &[PatternShape]) -> Vec<RecordOutcome> {
        let outcomes: Vec<RecordOutcome> = shapes.iter().map(|s| self.record(s)).collect();

        if let Some(store) = &self.store {
            for pattern in outcomes.iter().filter_map(RecordOutcome::pattern) {
                if let Err(e) = store.put(&pattern.id, pattern).await {
                    warn!(pattern_id = %pattern.id, "Failed to persist pattern: {}", e);
                }
            }
        }

        outcomes
    }

    /// Look up a pattern, marking it as recently used.
    pub fn get(&self, id: &PatternId) -> Option<Pattern> {
        self.map.lock().entries.get(id).cloned()
    }

    /// Check membership without touching recency.
    pub fn contains(&self, id: &PatternId) -> bool {
        self.map.lock().entries.contains(id)
    }

    pub fn len(&self) -> usize {
        self.map.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PatternMapStats {
        self.map.lock().stats()
    }

    pub fn snapshot(&self) -> PatternMapSnapshot {
        let map = self.map.lock();
        let mut patterns: Vec<Pattern> = map.entries.iter().map(|(_, p)| p.clone()).collect();
        patterns.reverse();

        PatternMapSnapshot {
            capacity: map.capacity,
            total_evictions: map.total_evictions,
            total_collisions: map.total_collisions,
            patterns,
        }
    }

    /// Rebuild a learner from a snapshot. If the snapshot holds more patterns
    /// than `capacity`, the least recently used ones are evicted.
    pub fn from_snapshot(snapshot: PatternMapSnapshot, capacity: usize) -> Self {
        let learner = Self::new(capacity);
        {
            let mut map = learner.map.lock();
            map.total_evictions = snapshot.total_evictions;
            map.total_collisions = snapshot.total_collisions;
            for pattern in snapshot.patterns {
                if map.entries.len() >= map.capacity {
                    map.evict_one();
                }
                map.entries.put(pattern.id.clone(), pattern);
            }
        }
        learner
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let bytes = serde_json::to_vec_pretty(&self.snapshot())?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        info!(path = %path.display(), "Pattern map saved");
        Ok(())
    }

    /// Load a saved map, or start empty when `path` does not exist.
    pub async fn load(path: impl AsRef<Path>, capacity: usize) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let snapshot: PatternMapSnapshot = serde_json::from_slice(&bytes)?;
                info!(path = %path.display(), patterns = snapshot.patterns.len(), "Pattern map restored");
                Ok(Self::from_snapshot(snapshot, capacity))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(capacity)),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for PatternLearner {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentHasher, PatternKind, Sha256Hasher};
    use crate::infrastructure::InMemoryPatternStore;

    struct ConstantHasher;

    impl ContentHasher for ConstantHasher {
        fn digest(&self, _content: &[u8]) -> String {
            "00000000000000000000".to_string()
        }
    }

    /// Sends every signature containing "clash" to one id.
    struct ClashingHasher;

    impl ContentHasher for ClashingHasher {
        fn digest(&self, content: &[u8]) -> String {
            if String::from_utf8_lossy(content).contains("clash") {
                "c1a5c1a5c1a5c1a5c1a5".to_string()
            } else {
                Sha256Hasher.digest(content)
            }
        }
    }

    fn shape(signature: &str) -> PatternShape {
        PatternShape::new(PatternKind::Sequence, signature, 0.5, true)
    }

    #[test]
    fn test_repeat_sighting_reinforces() {
        let learner = PatternLearner::new(10);
        let first = learner.record(&shape("echo x3"));
        let second = learner.record(&PatternShape::new(PatternKind::Sequence, "echo x3", 0.9, false));

        assert!(matches!(first, RecordOutcome::Inserted(_)));
        match second {
            RecordOutcome::Reinforced(p) => {
                assert_eq!(p.occurrence_count, 2);
                assert!((p.success_rate - 0.5).abs() < 1e-9);
                // content from the first sighting is kept
                assert_eq!(p.entropy_reduction, 0.5);
            }
            other => panic!("expected reinforcement, got {:?}", other),
        }
        assert_eq!(learner.len(), 1);
    }

    #[test]
    fn test_lru_bound_evicts_least_recently_accessed() {
        let learner = PatternLearner::new(10_000);
        let mut ids = Vec::new();
        for i in 0..10_000 {
            let outcome = learner.record(&shape(&format!("shape-{}", i)));
            ids.push(outcome.pattern().unwrap().id.clone());
        }

        // touch the oldest so the second-oldest becomes the LRU entry
        assert!(learner.get(&ids[0]).is_some());

        learner.record(&shape("shape-10000"));

        let stats = learner.stats();
        assert_eq!(stats.size, 10_000);
        assert!(stats.total_evictions >= 1);
        assert!(learner.contains(&ids[0]));
        assert!(!learner.contains(&ids[1]));
    }

    #[test]
    fn test_collision_is_counted_and_skipped() {
        let ids = IdGenerator::with_hasher("pattern", Arc::new(ConstantHasher));
        let learner = PatternLearner::with_id_generator(10, ids);

        let original = learner.record(&shape("file_writer x3"));
        let original = original.pattern().unwrap().clone();

        let outcome = learner.record(&shape("echo x5"));
        assert_eq!(outcome, RecordOutcome::Collision(original.id.clone()));

        let stats = learner.stats();
        assert_eq!(stats.total_collisions, 1);
        assert_eq!(stats.size, 1);

        let stored = learner.get(&original.id).unwrap();
        assert_eq!(stored.signature, "file_writer x3");
        assert_eq!(stored.occurrence_count, original.occurrence_count);
    }

    #[test]
    fn test_collision_does_not_refresh_recency() {
        let ids = IdGenerator::with_hasher("pattern", Arc::new(ClashingHasher));
        let learner = PatternLearner::with_id_generator(2, ids);

        let clash = learner.record(&shape("clash original")).pattern().unwrap().id.clone();
        let b = learner.record(&shape("b")).pattern().unwrap().id.clone();

        let outcome = learner.record(&shape("clash intruder"));
        assert_eq!(outcome, RecordOutcome::Collision(clash.clone()));

        // the rejected sighting left "clash original" as the LRU entry
        learner.record(&shape("c"));
        assert!(!learner.contains(&clash));
        assert!(learner.contains(&b));
        assert_eq!(learner.stats().total_evictions, 1);
    }

    #[test]
    fn test_consciousness_score_is_weighted_mean() {
        let learner = PatternLearner::new(10);
        assert_eq!(learner.stats().consciousness_score, 0.0);

        learner.record(&PatternShape::new(PatternKind::Optimization, "a", 1.0, true));
        learner.record(&PatternShape::new(PatternKind::Error, "b", 1.0, false));

        let score = learner.stats().consciousness_score;
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_save_and_load_preserves_recency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");

        let learner = PatternLearner::new(3);
        let a = learner.record(&shape("a")).pattern().unwrap().id.clone();
        let b = learner.record(&shape("b")).pattern().unwrap().id.clone();
        let c = learner.record(&shape("c")).pattern().unwrap().id.clone();
        learner.get(&a);
        learner.save(&path).await.unwrap();

        let restored = PatternLearner::load(&path, 3).await.unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.snapshot().patterns, learner.snapshot().patterns);

        // b is now the least recently used entry
        restored.record(&shape("d"));
        assert!(!restored.contains(&b));
        assert!(restored.contains(&a));
        assert!(restored.contains(&c));
    }

    #[tokio::test]
    async fn test_learn_writes_through_to_store() {
        let store = InMemoryPatternStore::new();
        let learner = PatternLearner::new(10).with_store(Arc::new(store.clone()));

        let outcomes = learner.learn(&[shape("x"), shape("y"), shape("x")]).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(store.len().await, 2);
    }
}
