// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # MtfRanker - Usage-Based Particle Priority
//!
//! Keeps incremental usage statistics per particle and periodically
//! recomputes a move-to-front style ordering: the most invoked particle gets
//! rank 1. Recording is O(1); ranks change only inside [`MtfRanker::rerank`].
//!
//! New rank tables are published on a `watch` channel so dispatchers read the
//! latest ordering without ever waiting on a rerank pass.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::domain::{RankTable, UsageStat};

pub struct MtfRanker {
    stats: RwLock<HashMap<String, UsageStat>>,
    ranks_tx: watch::Sender<Arc<RankTable>>,
}

impl MtfRanker {
    pub fn new() -> Self {
        let (ranks_tx, _) = watch::channel(Arc::new(RankTable::default()));
        Self {
            stats: RwLock::new(HashMap::new()),
            ranks_tx,
        }
    }

    pub fn record_invocation(&self, particle_id: &str, duration: Duration, success: bool) {
        let mut stats = self.stats.write();
        stats
            .entry(particle_id.to_string())
            .or_default()
            .record(duration, success);
    }

    /// Recompute ranks: invocation count descending, particle id ascending on
    /// ties. Returns the published table.
    pub fn rerank(&self) -> Arc<RankTable> {
        let mut stats = self.stats.write();

        let mut order: Vec<(&String, u64)> = stats
            .iter()
            .map(|(id, stat)| (id, stat.invocation_count))
            .collect();
        order.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let ranks: HashMap<String, u32> = order
            .into_iter()
            .enumerate()
            .map(|(position, (id, _))| (id.clone(), position as u32 + 1))
            .collect();

        for (id, stat) in stats.iter_mut() {
            stat.rank = ranks.get(id).copied();
        }
        drop(stats);

        let generation = self.ranks_tx.borrow().generation + 1;
        let table = Arc::new(RankTable { generation, ranks });
        self.ranks_tx.send_replace(table.clone());

        debug!(generation, particles = table.ranks.len(), "Published rank table");
        table
    }

    pub fn usage(&self, particle_id: &str) -> Option<UsageStat> {
        self.stats.read().get(particle_id).cloned()
    }

    /// Latest published rank table.
    pub fn ranks(&self) -> Arc<RankTable> {
        self.ranks_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<RankTable>> {
        self.ranks_tx.subscribe()
    }
}

impl Default for MtfRanker {
    fn default() -> Self {
        Self::new()
    }
}
