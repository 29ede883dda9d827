//! Run Context
//!
//! Shared state of one workflow run: the run workspace, the merged
//! configuration and the outputs of every step that has completed so far.
//! The engine owns the context exclusively; steps only see it through
//! the dispatcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ContextError;
use crate::workflow::{ConfigMap, StepType};

/// Merges override keys onto a base configuration.
///
/// Overrides replace base values key by key; nested objects are replaced
/// wholesale, not merged.
pub fn merge_config(base: &ConfigMap, overrides: &ConfigMap) -> ConfigMap {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    template_name: String,
    workspace_path: PathBuf,
    merged_config: ConfigMap,
    step_outputs: HashMap<String, Value>,
    /// Completed steps in completion order
    completed: Vec<(String, StepType)>,
}

impl RunContext {
    pub fn new(
        run_id: impl Into<String>,
        template_name: impl Into<String>,
        workspace_path: impl Into<PathBuf>,
        merged_config: ConfigMap,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            template_name: template_name.into(),
            workspace_path: workspace_path.into(),
            merged_config,
            step_outputs: HashMap::new(),
            completed: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    pub fn merged_config(&self) -> &ConfigMap {
        &self.merged_config
    }

    pub fn step_outputs(&self) -> &HashMap<String, Value> {
        &self.step_outputs
    }

    /// Output of a completed step, by step name.
    pub fn output(&self, step_name: &str) -> Option<&Value> {
        self.step_outputs.get(step_name)
    }

    /// Output of the most recently completed step of the given type.
    pub fn latest_output_of_type(&self, step_type: &StepType) -> Option<&Value> {
        self.completed
            .iter()
            .rev()
            .find(|(_, t)| t == step_type)
            .and_then(|(name, _)| self.step_outputs.get(name))
    }

    /// Records a step's output. Each step name can be written once.
    pub fn record_output(
        &mut self,
        step_name: &str,
        step_type: StepType,
        output: Value,
    ) -> Result<(), ContextError> {
        if self.step_outputs.contains_key(step_name) {
            return Err(ContextError::DuplicateOutput(step_name.to_string()));
        }
        self.step_outputs.insert(step_name.to_string(), output);
        self.completed.push((step_name.to_string(), step_type));
        Ok(())
    }

    /// Number of steps whose output has been recorded.
    pub fn completed_steps(&self) -> usize {
        self.completed.len()
    }
}
