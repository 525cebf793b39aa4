// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `corpus-cortex` - Learning & Ranking Crate
//!
//! Observes execution history and adapts future scheduling.
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `IdGenerator`, `Pattern`, `PatternShape`, `UsageStat`, `RankTable` |
//! | [`application`] | Application | `PatternLearner`, `MtfRanker`, `Reranker` |
//! | [`infrastructure`] | Infrastructure | `PatternStore` and its in-memory / JSON implementations |

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::*;
pub use infrastructure::*;
