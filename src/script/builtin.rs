//! Reference Analytics Scripts
//!
//! Python 3 programs (standard library only) embedded at compile time,
//! one per supported step type. Each reads its configuration object from
//! stdin and prints a single JSON result object.

use crate::workflow::StepType;

pub const DATA_PREPARATION: &str = include_str!("builtin/data_preparation.py");
pub const FACTOR_GENERATION: &str = include_str!("builtin/factor_generation.py");
pub const MODEL_TRAINING: &str = include_str!("builtin/model_training.py");
pub const STRATEGY_BACKTEST: &str = include_str!("builtin/strategy_backtest.py");
pub const RESULT_ANALYSIS: &str = include_str!("builtin/result_analysis.py");
pub const REPORT_GENERATION: &str = include_str!("builtin/report_generation.py");

/// Returns the embedded script for a step type.
pub fn script_for(step_type: &StepType) -> Option<&'static str> {
    match step_type {
        StepType::DataPreparation => Some(DATA_PREPARATION),
        StepType::FactorGeneration => Some(FACTOR_GENERATION),
        StepType::ModelTraining => Some(MODEL_TRAINING),
        StepType::StrategyBacktest => Some(STRATEGY_BACKTEST),
        StepType::ResultAnalysis => Some(RESULT_ANALYSIS),
        StepType::ReportGeneration => Some(REPORT_GENERATION),
        StepType::Unsupported(_) => None,
    }
}
