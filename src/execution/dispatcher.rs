//! Step Dispatcher
//!
//! Maps a step type to its analytics script and input contract, builds the
//! configuration object the script receives, and turns whatever the
//! executor returns into a [`StepResult`].

use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;

use super::{CancelFlag, RunContext, StepResult};
use crate::error::StepError;
use crate::script::{builtin, ScriptExecutor, ScriptRequest};
use crate::workflow::{ConfigMap, StepType, WorkflowStep};

/// Step config key that overrides the engine-wide timeout, in seconds.
pub const TIMEOUT_KEY: &str = "timeout_secs";

const NO_INPUTS: &[StepType] = &[];
const PRICES: &[StepType] = &[StepType::DataPreparation];
const PRICES_AND_FACTORS: &[StepType] = &[StepType::DataPreparation, StepType::FactorGeneration];
const SIGNALS: &[StepType] = &[StepType::FactorGeneration, StepType::ModelTraining];
const ANALYSIS_INPUTS: &[StepType] = &[
    StepType::DataPreparation,
    StepType::FactorGeneration,
    StepType::ModelTraining,
    StepType::StrategyBacktest,
];
const REPORT_INPUTS: &[StepType] = &[
    StepType::DataPreparation,
    StepType::FactorGeneration,
    StepType::ModelTraining,
    StepType::StrategyBacktest,
    StepType::ResultAnalysis,
];

/// What a step type runs and which earlier outputs it reads.
#[derive(Debug, Clone, Copy)]
pub struct StepContract {
    pub script: &'static str,
    /// Types that must have completed earlier in the run
    pub requires: &'static [StepType],
    /// Types whose outputs are passed along when present
    pub consumes: &'static [StepType],
}

/// Contract of a supported step type.
pub fn step_contract(step_type: &StepType) -> Option<StepContract> {
    let script = builtin::script_for(step_type)?;
    let (requires, consumes) = match step_type {
        StepType::DataPreparation => (NO_INPUTS, NO_INPUTS),
        StepType::FactorGeneration => (PRICES, NO_INPUTS),
        StepType::ModelTraining => (PRICES_AND_FACTORS, NO_INPUTS),
        StepType::StrategyBacktest => (PRICES, SIGNALS),
        StepType::ResultAnalysis => (NO_INPUTS, ANALYSIS_INPUTS),
        StepType::ReportGeneration => (NO_INPUTS, REPORT_INPUTS),
        StepType::Unsupported(_) => return None,
    };

    Some(StepContract {
        script,
        requires,
        consumes,
    })
}

/// Runs single steps against a run context through a [`ScriptExecutor`].
pub struct StepDispatcher<'a> {
    executor: &'a dyn ScriptExecutor,
    default_timeout: Option<Duration>,
}

impl<'a> StepDispatcher<'a> {
    pub fn new(executor: &'a dyn ScriptExecutor, default_timeout: Option<Duration>) -> Self {
        Self {
            executor,
            default_timeout,
        }
    }

    /// Runs one step. Never panics and never returns an error: every
    /// failure is described by the returned [`StepResult`].
    pub fn dispatch(&self, step: &WorkflowStep, ctx: &RunContext, cancel: &CancelFlag) -> StepResult {
        let started_at = Utc::now();
        let start = Instant::now();

        let outcome = self.run(step, ctx, cancel);
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                info!("Step '{}' completed in {} ms", step.name, duration_ms);
                StepResult::succeeded(&step.name, step.step_type.clone(), started_at, duration_ms, output)
            }
            Err(err) => {
                debug!("Step '{}' failed ({:?}): {}", step.name, err.kind(), err);
                StepResult::failed(&step.name, step.step_type.clone(), started_at, duration_ms, &err)
            }
        }
    }

    fn run(&self, step: &WorkflowStep, ctx: &RunContext, cancel: &CancelFlag) -> Result<Value, StepError> {
        let contract = step_contract(&step.step_type)
            .ok_or_else(|| StepError::UnsupportedStepType(step.step_type.to_string()))?;

        let config = build_step_config(step, ctx, &contract)?;
        let timeout = step_timeout(step).or(self.default_timeout);

        debug!(
            "Dispatching '{}' ({}) with timeout {:?}",
            step.name, step.step_type, timeout
        );

        let request = ScriptRequest {
            step_name: step.name.clone(),
            script: contract.script.to_string(),
            config: Value::Object(config),
            workspace_dir: ctx.workspace_path().to_path_buf(),
            timeout,
        };

        let response = self.executor.execute(&request, cancel)?;
        if !response.success {
            let message = response
                .error
                .unwrap_or_else(|| crate::script::DEFAULT_FAILURE_MESSAGE.to_string());
            return Err(StepError::Application(message));
        }

        Ok(Value::Object(response.payload))
    }
}

/// Builds the configuration object delivered to a step's script.
///
/// Layering, later wins: the run's merged config, the step's own config,
/// then the reserved keys `workspace_dir`, `step_name`, `step_type`,
/// `run_id`, `template`, `inputs` and `dependencies`.
pub fn build_step_config(
    step: &WorkflowStep,
    ctx: &RunContext,
    contract: &StepContract,
) -> Result<ConfigMap, StepError> {
    let mut inputs = ConfigMap::new();
    for required in contract.requires {
        let output = ctx.latest_output_of_type(required).ok_or_else(|| {
            StepError::MissingPrerequisite {
                step: step.name.clone(),
                required: required.to_string(),
            }
        })?;
        inputs.insert(required.to_string(), output.clone());
    }
    for optional in contract.consumes {
        if let Some(output) = ctx.latest_output_of_type(optional) {
            inputs.insert(optional.to_string(), output.clone());
        }
    }

    let mut dependencies = ConfigMap::new();
    for name in &step.dependencies {
        if let Some(output) = ctx.output(name) {
            dependencies.insert(name.clone(), output.clone());
        }
    }

    let mut config = ctx.merged_config().clone();
    for (key, value) in &step.config {
        config.insert(key.clone(), value.clone());
    }

    let workspace = ctx.workspace_path().display().to_string();
    config.insert("workspace_dir".to_string(), Value::String(workspace));
    config.insert("step_name".to_string(), Value::String(step.name.clone()));
    config.insert("step_type".to_string(), Value::String(step.step_type.to_string()));
    config.insert("run_id".to_string(), Value::String(ctx.run_id().to_string()));
    config.insert("template".to_string(), Value::String(ctx.template_name().to_string()));
    config.insert("inputs".to_string(), Value::Object(inputs));
    config.insert("dependencies".to_string(), Value::Object(dependencies));

    Ok(config)
}

/// Per-step timeout from the step's own config, if set to a positive
/// number that fits in a [`Duration`].
fn step_timeout(step: &WorkflowStep) -> Option<Duration> {
    let secs = step.config.get(TIMEOUT_KEY).and_then(Value::as_f64)?;
    if secs <= 0.0 {
        return None;
    }
    let timeout = Duration::try_from_secs_f64(secs).ok();
    if timeout.is_none() {
        warn!("Ignoring {}={} on step '{}': out of range", TIMEOUT_KEY, secs, step.name);
    }
    timeout
}
