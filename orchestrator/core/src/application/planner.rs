// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Planner
//!
//! Expands a [`Request`] into a [`Plan`] through a dispatch table of
//! templates keyed by request kind. Expansion is deterministic: the same
//! request always yields the same action sequence (correlation ids aside).
//!
//! | Kind | Expansion |
//! |------|-----------|
//! | `echo` | 1 × `echo` |
//! | `write_file` | 1 × `file_writer` |
//! | `read_file` | 1 × `file_reader` |
//! | `batch_write` | 1 × `file_writer` per entry of `files` |
//! | `create_component` | 3 × `file_writer`: source, test, module file |

use corpus_cortex::IdGenerator;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::application::registry::WorkerRegistry;
use crate::domain::message::CorrelationId;
use crate::domain::plan::{Action, ActionSpec, Plan, PlanningError, Request};
use crate::infrastructure::workers::{ECHO, FILE_READER, FILE_WRITER};

pub type PlanTemplate = Arc<dyn Fn(&Request) -> Result<Vec<ActionSpec>, PlanningError> + Send + Sync>;

const DEFAULT_COMPONENT_DIR: &str = "components";

pub struct Planner {
    templates: BTreeMap<String, PlanTemplate>,
    ids: IdGenerator,
}

impl Planner {
    /// Planner with no kinds registered.
    pub fn empty() -> Self {
        Self {
            templates: BTreeMap::new(),
            ids: IdGenerator::new("corr"),
        }
    }

    pub fn new() -> Self {
        let mut planner = Self::empty();
        planner.register(ECHO, echo_template);
        planner.register("write_file", write_file_template);
        planner.register("read_file", read_file_template);
        planner.register("batch_write", batch_write_template);
        planner.register("create_component", create_component_template);
        planner
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, template: F) -> &mut Self
    where
        F: Fn(&Request) -> Result<Vec<ActionSpec>, PlanningError> + Send + Sync + 'static,
    {
        self.templates.insert(kind.into(), Arc::new(template));
        self
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    /// Fails fast; nothing is dispatched for a request that does not plan.
    pub fn plan(&self, request: &Request, registry: &WorkerRegistry) -> Result<Plan, PlanningError> {
        let template = self
            .templates
            .get(&request.kind)
            .ok_or_else(|| PlanningError::UnknownKind(request.kind.clone()))?;

        let specs = template(request)?;
        if specs.is_empty() {
            return Err(PlanningError::EmptyPlan(request.kind.clone()));
        }

        if let Some(unknown) = specs.iter().find(|spec| !registry.contains(&spec.target)) {
            return Err(PlanningError::UnknownParticle {
                kind: request.kind.clone(),
                particle: unknown.target.to_string(),
            });
        }

        let actions = specs
            .into_iter()
            .map(|spec| Action {
                target_particle: spec.target,
                parameters: spec.parameters,
                priority: spec.priority,
                correlation_id: CorrelationId::generate(&self.ids),
            })
            .collect();

        Ok(Plan {
            request_kind: request.kind.clone(),
            actions,
        })
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

fn echo_template(request: &Request) -> Result<Vec<ActionSpec>, PlanningError> {
    let message = request.str_param("message")?;
    Ok(vec![ActionSpec::new(ECHO, json!({ "message": message }))])
}

fn write_file_template(request: &Request) -> Result<Vec<ActionSpec>, PlanningError> {
    let path = request.str_param("path")?;
    let content = request.str_param("content")?;
    Ok(vec![ActionSpec::new(FILE_WRITER, json!({ "path": path, "content": content }))])
}

fn read_file_template(request: &Request) -> Result<Vec<ActionSpec>, PlanningError> {
    let path = request.str_param("path")?;
    Ok(vec![ActionSpec::new(FILE_READER, json!({ "path": path }))])
}

fn batch_write_template(request: &Request) -> Result<Vec<ActionSpec>, PlanningError> {
    let files = request.array_param("files")?;
    files
        .iter()
        .enumerate()
        .map(|(i, file)| {
            let field = |name: &str| {
                file.get(name)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| PlanningError::MissingParameter {
                        kind: request.kind.clone(),
                        parameter: format!("files[{}].{}", i, name),
                    })
            };
            Ok(ActionSpec::new(
                FILE_WRITER,
                json!({ "path": field("path")?, "content": field("content")? }),
            ))
        })
        .collect()
}

fn create_component_template(request: &Request) -> Result<Vec<ActionSpec>, PlanningError> {
    let name = request.str_param("name")?;
    let dir = request
        .parameters
        .get("directory")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_COMPONENT_DIR);

    let source = format!("pub struct {} {{}}\n", component_type_name(name));
    let test = format!(
        "use super::{name}::*;\n\n#[test]\nfn {name}_builds() {{\n    let _ = {ty} {{}};\n}}\n",
        name = name,
        ty = component_type_name(name)
    );
    let module = format!("pub mod {name};\n#[cfg(test)]\nmod {name}_test;\n", name = name);

    Ok(vec![
        ActionSpec::new(FILE_WRITER, json!({ "path": format!("{}/{}.rs", dir, name), "content": source })),
        ActionSpec::new(FILE_WRITER, json!({ "path": format!("{}/{}_test.rs", dir, name), "content": test })),
        ActionSpec::new(FILE_WRITER, json!({ "path": format!("{}/mod.rs", dir), "content": module })),
    ])
}

/// `user_profile` → `UserProfile`
fn component_type_name(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
