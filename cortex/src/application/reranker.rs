// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Background rerank task
//!
//! Runs [`MtfRanker::rerank`] on a fixed interval, out of band from dispatch.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic priority recomputation with graceful shutdown

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::MtfRanker;

#[derive(Debug, Clone)]
pub struct RerankerConfig {
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            enabled: true,
        }
    }
}

pub struct Reranker {
    ranker: Arc<MtfRanker>,
    config: RerankerConfig,
    shutdown_token: CancellationToken,
}

impl Reranker {
    pub fn new(ranker: Arc<MtfRanker>, config: RerankerConfig) -> Self {
        Self {
            ranker,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Background reranker is disabled");
            return;
        }

        info!(interval_ms = self.config.interval.as_millis() as u64, "Starting background reranker");

        let mut tick = interval(self.config.interval);
        // the first tick completes immediately
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let table = self.ranker.rerank();
                    debug!(generation = table.generation, "Rerank cycle completed");
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping reranker");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reranker_publishes_periodically() {
        let ranker = Arc::new(MtfRanker::new());
        ranker.record_invocation("writer", Duration::from_millis(5), true);
        let mut rx = ranker.subscribe();

        let reranker = Arc::new(Reranker::new(
            ranker.clone(),
            RerankerConfig {
                interval: Duration::from_millis(20),
                enabled: true,
            },
        ));
        let token = reranker.shutdown_token();
        let handle = reranker.start();

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("rank table published")
            .unwrap();
        assert_eq!(ranker.ranks().rank_of("writer"), Some(1));

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_reranker_exits_immediately() {
        let ranker = Arc::new(MtfRanker::new());
        let reranker = Arc::new(Reranker::new(
            ranker.clone(),
            RerankerConfig {
                interval: Duration::from_millis(10),
                enabled: false,
            },
        ));

        tokio::time::timeout(Duration::from_secs(1), reranker.start())
            .await
            .expect("task exits")
            .unwrap();
        assert_eq!(ranker.ranks().generation, 0);
    }
}
