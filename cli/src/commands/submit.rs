// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `corpus submit`: run one request through an embedded runtime
//!
//! Prints the synthesis result as JSON on stdout. Exits with code 2 when the
//! request cannot be planned (nothing ran).

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use corpus_core::{CorpusConfig, Request};

use crate::embedded::EmbeddedExecutor;

pub const PLANNING_FAILURE_EXIT_CODE: i32 = 2;

#[derive(Args)]
pub struct SubmitArgs {
    /// Request kind (echo, write_file, read_file, batch_write, create_component)
    #[arg(value_name = "KIND")]
    pub kind: String,

    /// Request parameters (JSON string or @file.json)
    #[arg(short, long, value_name = "JSON")]
    pub params: Option<String>,

    /// Directory file particles are confined to
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub workspace: PathBuf,
}

/// Returns the process exit code.
pub async fn handle_command(args: SubmitArgs, config_override: Option<PathBuf>) -> Result<i32> {
    let config = CorpusConfig::load_or_default(config_override).context("Failed to load configuration")?;
    let parameters = parse_params(args.params.as_deref())?;

    let executor = EmbeddedExecutor::new(config, args.workspace).await?;
    info!(kind = %args.kind, "Submitting request");
    let outcome = executor.submit(Request::new(args.kind, parameters)).await;
    executor.shutdown().await?;

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            let summary = format!(
                "{}/{} actions succeeded in {:?}",
                result.succeeded.len(),
                result.total,
                result.elapsed
            );
            if result.overall_success {
                eprintln!("{}", format!("✓ {}", summary).green());
            } else {
                eprintln!("{}", format!("⚠ {}", summary).yellow());
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("{}", format!("✗ Planning failed: {}", e).red());
            Ok(PLANNING_FAILURE_EXIT_CODE)
        }
    }
}

/// Parse `--params`: inline JSON, or `@path` to read it from a file.
pub fn parse_params(raw: Option<&str>) -> Result<serde_json::Value> {
    let Some(raw) = raw else {
        return Ok(serde_json::json!({}));
    };

    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read params file {}", path))?,
        None => raw.to_string(),
    };

    let value: serde_json::Value = serde_json::from_str(&text).context("Params must be valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("Params must be a JSON object");
    }
    Ok(value)
}
