// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use corpus_core::CorpusConfig;

const ANNOTATED_CONFIG: &str = r#"# Corpus runtime configuration
bus:
  # per-subscriber queue size
  default_queue_capacity: 256
  # block: publisher waits for room; reject: message refused for that subscriber
  backpressure: block
  history_capacity: 1024
  balance_window: 256
breaker:
  failure_threshold: 5
  recovery_timeout: 60s
  half_open_max_requests: 3
orchestrator:
  subscriber_id: orchestrator
  action_deadline: 5s
learning:
  pattern_capacity: 10000
  rerank_interval: 30s
  batchable_particles:
    - file_writer
persistence:
  # particle state and the pattern map are kept in memory when unset
  state_dir: ~
"#;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./corpus-config.yaml)
        #[arg(short, long, default_value = "./corpus-config.yaml")]
        output: PathBuf,

        /// Include comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. CORPUS_CONFIG_PATH: {}",
            std::env::var("CORPUS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./corpus-config.yaml");
        println!("  4. ~/.corpus/config.yaml");
        println!("  5. /etc/corpus/config.yaml");
        println!();
    }

    let config = CorpusConfig::load_or_default(config_override).context("Failed to load configuration")?;

    println!("{}", "Current configuration:".bold());
    println!();
    print!("{}", config.to_yaml_string()?);

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = CorpusConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let written = if with_examples {
        std::fs::write(&output, ANNOTATED_CONFIG).map_err(anyhow::Error::from)
    } else {
        CorpusConfig::default().to_yaml_file(&output)
    };
    written.with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotated_config_matches_defaults() {
        let parsed = CorpusConfig::from_yaml_str(ANNOTATED_CONFIG).unwrap();
        assert_eq!(parsed, CorpusConfig::default());
    }

    #[tokio::test]
    async fn test_generate_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("corpus-config.yaml");

        generate(output.clone(), false).await.unwrap();

        let config = CorpusConfig::from_yaml_file(&output).unwrap();
        assert_eq!(config, CorpusConfig::default());
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_generate_with_examples_keeps_comments() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("corpus-config.yaml");

        generate(output.clone(), true).await.unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("# Corpus runtime configuration"));
        assert_eq!(CorpusConfig::from_yaml_file(&output).unwrap(), CorpusConfig::default());
    }
}
