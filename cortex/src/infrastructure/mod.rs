// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for the cortex crate

pub mod pattern_store;

pub use pattern_store::{InMemoryPatternStore, JsonFilePatternStore, PatternStore, PatternStoreError};
