//! Step and workflow results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, StepError};
use crate::monitoring::ExecutionTimeline;
use crate::workflow::{ConfigMap, StepType};

/// Outcome of one attempted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Payload returned by the analytics process, `null` on failure
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl StepResult {
    pub fn succeeded(
        name: impl Into<String>,
        step_type: StepType,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        output: Value,
    ) -> Self {
        Self {
            name: name.into(),
            step_type,
            success: true,
            started_at,
            duration_ms,
            output,
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        step_type: StepType,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        error: &StepError,
    ) -> Self {
        Self {
            name: name.into(),
            step_type,
            success: false,
            started_at,
            duration_ms,
            output: Value::Null,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_kind == Some(ErrorKind::Cancelled)
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub run_id: String,
    pub template: String,
    pub success: bool,
    pub steps: Vec<StepResult>,
    pub duration_ms: u64,
    #[serde(default)]
    pub output_files: Vec<String>,
    #[serde(default)]
    pub metrics: ConfigMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(skip)]
    pub timeline: ExecutionTimeline,
}

impl WorkflowResult {
    pub fn new(run_id: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            template: template.into(),
            success: false,
            steps: Vec::new(),
            duration_ms: 0,
            output_files: Vec::new(),
            metrics: ConfigMap::new(),
            error: None,
            cancelled: false,
            timeline: ExecutionTimeline::new(),
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// First step that did not succeed.
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.success)
    }

    /// Folds the `metrics` object and `output_files` array of a step
    /// output into the run summary. Later steps overwrite earlier metrics.
    pub fn absorb_output(&mut self, output: &Value) {
        if let Some(metrics) = output.get("metrics").and_then(Value::as_object) {
            for (key, value) in metrics {
                self.metrics.insert(key.clone(), value.clone());
            }
        }

        if let Some(files) = output.get("output_files").and_then(Value::as_array) {
            for file in files.iter().filter_map(Value::as_str) {
                if !self.output_files.iter().any(|f| f == file) {
                    self.output_files.push(file.to_string());
                }
            }
        }
    }
}
