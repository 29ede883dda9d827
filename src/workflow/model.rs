//! Workflow Data Model
//!
//! Core data structures describing workflow templates and their steps.
//!
//! # Example YAML Format
//!
//! ```yaml
//! name: momentum_research
//! description: Momentum factor study
//! category: factor
//! base_config:
//!   instruments: [AAPL, MSFT, NVDA]
//!   periods: 252
//! steps:
//!   - name: prepare_data
//!     type: data_preparation
//!
//!   - name: build_factors
//!     type: factor_generation
//!     config:
//!       lookback: 20
//!     dependencies:
//!       - prepare_data
//!
//!   - name: write_report
//!     type: report_generation
//!     required: false
//!     dependencies:
//!       - build_factors
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// String-keyed configuration map passed through the engine.
pub type ConfigMap = serde_json::Map<String, Value>;

/// The fixed set of step kinds the dispatcher knows how to run.
///
/// Unknown type names are kept as [`StepType::Unsupported`] so that a
/// template containing them still loads; the step fails when dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    DataPreparation,
    FactorGeneration,
    ModelTraining,
    StrategyBacktest,
    ResultAnalysis,
    ReportGeneration,
    Unsupported(String),
}

impl StepType {
    /// All supported step types in canonical pipeline order.
    pub const ALL: [StepType; 6] = [
        StepType::DataPreparation,
        StepType::FactorGeneration,
        StepType::ModelTraining,
        StepType::StrategyBacktest,
        StepType::ResultAnalysis,
        StepType::ReportGeneration,
    ];

    /// Canonical snake_case name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::DataPreparation => "data_preparation",
            Self::FactorGeneration => "factor_generation",
            Self::ModelTraining => "model_training",
            Self::StrategyBacktest => "strategy_backtest",
            Self::ResultAnalysis => "result_analysis",
            Self::ReportGeneration => "report_generation",
            Self::Unsupported(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StepType {
    fn from(name: String) -> Self {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .find(|t| t.as_str() == normalized)
            .cloned()
            .unwrap_or(Self::Unsupported(name))
    }
}

impl From<&str> for StepType {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<StepType> for String {
    fn from(step_type: StepType) -> Self {
        step_type.as_str().to_string()
    }
}

impl FromStr for StepType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

/// A single named, typed unit of work inside a template.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    /// Unique name of the step within its template
    pub name: String,

    /// What the step computes
    #[serde(rename = "type")]
    pub step_type: StepType,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Overrides merged on top of the run configuration for this step only
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub config: ConfigMap,

    /// Names of steps that must have run before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Whether a failure of this step aborts the run
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl WorkflowStep {
    /// Creates a required step with no configuration or dependencies.
    ///
    /// # Example
    ///
    /// ```
    /// use quantflow::workflow::{StepType, WorkflowStep};
    ///
    /// let step = WorkflowStep::new("train", StepType::ModelTraining)
    ///     .with_description("Fit the return model")
    ///     .with_config("epochs", 10)
    ///     .depends_on("prepare");
    /// assert!(step.required);
    /// ```
    pub fn new(name: impl Into<String>, step_type: impl Into<StepType>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            step_type: step_type.into(),
            description: String::new(),
            config: ConfigMap::new(),
            dependencies: Vec::new(),
            required: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets one step-level configuration value.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Adds a dependency on another step.
    pub fn depends_on(mut self, step_name: impl Into<String>) -> Self {
        self.dependencies.push(step_name.into());
        self
    }

    /// Marks the step as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// An immutable pipeline definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowTemplate {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,

    /// Configuration shared by every step of a run
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub base_config: ConfigMap,

    /// Steps in declaration order
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowTemplate {
    /// Creates an empty template.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            description: String::new(),
            category: String::new(),
            base_config: ConfigMap::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Sets one base configuration value.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.base_config.insert(key.into(), value.into());
        self
    }

    /// Appends a step.
    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Gets a step by name.
    pub fn get_step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Returns the number of steps in the template.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the template has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
