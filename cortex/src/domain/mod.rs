// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cortex Domain Layer
//!
//! Pure value types for learning and ranking. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`id`] | `IdGenerator`, `ContentHasher` |
//! | [`pattern`] | `Pattern`, `PatternShape`, `PatternKind`, `PatternMapStats` |
//! | [`usage`] | `UsageStat`, `RankTable` |

pub mod id;
pub mod pattern;
pub mod usage;

pub use id::*;
pub use pattern::*;
pub use usage::*;
