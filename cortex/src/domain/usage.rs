// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Running usage statistics for one particle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStat {
    pub invocation_count: u64,
    /// Mean duration in milliseconds.
    pub avg_duration_ms: f64,
    pub success_rate: f64,
    /// Assigned by the last rerank pass; `None` until the first pass.
    pub rank: Option<u32>,
}

impl UsageStat {
    pub fn new() -> Self {
        Self {
            invocation_count: 0,
            avg_duration_ms: 0.0,
            success_rate: 0.0,
            rank: None,
        }
    }

    pub fn record(&mut self, duration: Duration, success: bool) {
        self.invocation_count += 1;
        let n = self.invocation_count as f64;
        let millis = duration.as_secs_f64() * 1000.0;
        let sample = if success { 1.0 } else { 0.0 };

        self.avg_duration_ms += (millis - self.avg_duration_ms) / n;
        self.success_rate += (sample - self.success_rate) / n;
    }
}

impl Default for UsageStat {
    fn default() -> Self {
        Self::new()
    }
}

/// Rank assignment published after each rerank pass. Rank 1 is the most
/// frequently invoked particle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankTable {
    pub generation: u64,
    pub ranks: HashMap<String, u32>,
}

impl RankTable {
    pub fn rank_of(&self, particle_id: &str) -> Option<u32> {
        self.ranks.get(particle_id).copied()
    }

    /// Particle ids ordered by rank.
    pub fn ordered(&self) -> Vec<String> {
        let mut entries: Vec<_> = self.ranks.iter().collect();
        entries.sort_by_key(|(id, rank)| (**rank, (*id).clone()));
        entries.into_iter().map(|(id, _)| id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_running_means() {
        let mut stat = UsageStat::new();
        stat.record(Duration::from_millis(100), true);
        stat.record(Duration::from_millis(300), false);

        assert_eq!(stat.invocation_count, 2);
        assert!((stat.avg_duration_ms - 200.0).abs() < 1e-6);
        assert!((stat.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(stat.rank, None);
    }
}
