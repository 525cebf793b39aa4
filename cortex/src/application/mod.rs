// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services for the cortex crate
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Pattern learning and usage ranking services

pub mod mtf_ranker;
pub mod pattern_learner;
pub mod reranker;

pub use mtf_ranker::MtfRanker;
pub use pattern_learner::{
    PatternCollisionError, PatternLearner, PatternMapSnapshot, RecordOutcome, DEFAULT_PATTERN_CAPACITY,
};
pub use reranker::{Reranker, RerankerConfig};
