// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Corpus CLI

pub mod config;
pub mod stats;
pub mod submit;

pub use self::config::ConfigCommand;
pub use self::stats::StatsCommand;
pub use self::submit::SubmitArgs;
