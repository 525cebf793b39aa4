// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Inspect persisted runtime state
//!
//! Commands: particle, patterns

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use corpus_core::infrastructure::repositories::JsonFileParticleStateRepository;
use corpus_core::{CorpusConfig, ParticleId, ParticleStateRepository};
use corpus_cortex::{Pattern, PatternLearner};

#[derive(Subcommand)]
pub enum StatsCommand {
    /// Show the persisted state of one particle
    Particle {
        /// Particle id (e.g. file_writer)
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Show pattern map statistics
    Patterns {
        /// Number of most frequent patterns to list
        #[arg(long, default_value = "10")]
        top: usize,
    },
}

pub async fn handle_command(command: StatsCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = CorpusConfig::load_or_default(config_override).context("Failed to load configuration")?;

    match command {
        StatsCommand::Particle { id } => particle(&config, &id).await,
        StatsCommand::Patterns { top } => patterns(&config, top).await,
    }
}

async fn particle(config: &CorpusConfig, id: &str) -> Result<()> {
    let dir = config
        .persistence
        .particles_dir()
        .context("persistence.state_dir is not set; nothing was persisted")?;
    let repository = JsonFileParticleStateRepository::open(&dir)
        .await
        .with_context(|| format!("Failed to open {}", dir.display()))?;

    match repository.find_by_id(&ParticleId::new(id)).await? {
        Some(state) => {
            println!("{}", serde_json::to_string_pretty(&state)?);
            eprintln!(
                "{} {} cycles, success rate {:.2}",
                id.bold(),
                state.cycle_count,
                state.success_rate()
            );
            Ok(())
        }
        None => anyhow::bail!("No state recorded for particle '{}'", id),
    }
}

async fn patterns(config: &CorpusConfig, top: usize) -> Result<()> {
    let path = config
        .persistence
        .patterns_file()
        .context("persistence.state_dir is not set; nothing was persisted")?;
    let learner = PatternLearner::load(&path, config.learning.pattern_capacity).await?;

    println!("{}", serde_json::to_string_pretty(&learner.stats())?);

    let ranked = most_frequent(learner.snapshot().patterns, top);
    if !ranked.is_empty() {
        eprintln!("{}", "Most frequent patterns:".bold());
        for pattern in ranked {
            eprintln!(
                "  {:>6} × {:<13} {} (success {:.2}, entropy {:.2})",
                pattern.occurrence_count,
                pattern.kind.to_string(),
                pattern.signature,
                pattern.success_rate,
                pattern.entropy_reduction
            );
        }
    }
    Ok(())
}

fn most_frequent(mut patterns: Vec<Pattern>, top: usize) -> Vec<Pattern> {
    patterns.sort_by(|a, b| {
        b.occurrence_count
            .cmp(&a.occurrence_count)
            .then_with(|| a.signature.cmp(&b.signature))
    });
    patterns.truncate(top);
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_cortex::{PatternKind, PatternShape};

    #[test]
    fn test_most_frequent_orders_by_occurrence() {
        let learner = PatternLearner::new(16);
        for _ in 0..3 {
            learner.record(&PatternShape::new(PatternKind::Sequence, "echo x3", 0.6, true));
        }
        learner.record(&PatternShape::new(PatternKind::Optimization, "file_writer x3", 0.6, true));

        let ranked = most_frequent(learner.snapshot().patterns, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].signature, "echo x3");
        assert_eq!(ranked[0].occurrence_count, 3);
    }
}
