//! Built-in Workflow Templates
//!
//! Static catalog of the research pipelines shipped with the engine, plus
//! a [`TemplateRegistry`] that layers user templates loaded from disk on
//! top of them.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use serde_json::json;

use super::model::{StepType, WorkflowStep, WorkflowTemplate};
use super::parser::load_templates_dir;
use crate::error::ParseError;

/// Returns the built-in templates in a fixed order.
///
/// Pure and deterministic: every call builds the same values.
pub fn list_builtin_templates() -> Vec<WorkflowTemplate> {
    vec![
        full_research_pipeline(),
        factor_research(),
        model_training(),
        strategy_backtest(),
    ]
}

fn default_universe() -> serde_json::Value {
    json!(["AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "JPM", "XOM"])
}

fn full_research_pipeline() -> WorkflowTemplate {
    WorkflowTemplate::new("full_research_pipeline")
        .with_description(
            "End-to-end research run: data, factors, model, backtest, analysis and report",
        )
        .with_category("research")
        .with_config("instruments", default_universe())
        .with_config("periods", 504)
        .with_config("seed", 42)
        .with_config("lookback", 20)
        .with_config("top_n", 3)
        .with_step(
            WorkflowStep::new("data_preparation", StepType::DataPreparation)
                .with_description("Load and clean daily prices for the universe"),
        )
        .with_step(
            WorkflowStep::new("factor_generation", StepType::FactorGeneration)
                .with_description("Compute momentum and volatility factors")
                .depends_on("data_preparation"),
        )
        .with_step(
            WorkflowStep::new("model_training", StepType::ModelTraining)
                .with_description("Fit a linear model of forward returns on factors")
                .with_config("horizon", 5)
                .depends_on("data_preparation")
                .depends_on("factor_generation"),
        )
        .with_step(
            WorkflowStep::new("strategy_backtest", StepType::StrategyBacktest)
                .with_description("Simulate a top-N long portfolio ranked by model score")
                .with_config("rebalance_days", 5)
                .depends_on("model_training"),
        )
        .with_step(
            WorkflowStep::new("result_analysis", StepType::ResultAnalysis)
                .with_description("Summarize backtest performance")
                .depends_on("strategy_backtest"),
        )
        .with_step(
            WorkflowStep::new("report_generation", StepType::ReportGeneration)
                .with_description("Render a Markdown research report")
                .depends_on("result_analysis"),
        )
}

fn factor_research() -> WorkflowTemplate {
    WorkflowTemplate::new("factor_research")
        .with_description("Build factors and measure their predictive power")
        .with_category("factor")
        .with_config("instruments", default_universe())
        .with_config("periods", 252)
        .with_config("seed", 7)
        .with_config("lookback", 20)
        .with_step(WorkflowStep::new("data_preparation", StepType::DataPreparation))
        .with_step(
            WorkflowStep::new("factor_generation", StepType::FactorGeneration)
                .depends_on("data_preparation"),
        )
        .with_step(
            WorkflowStep::new("result_analysis", StepType::ResultAnalysis)
                .with_description("Information coefficient of each factor")
                .depends_on("factor_generation"),
        )
        .with_step(
            WorkflowStep::new("report_generation", StepType::ReportGeneration)
                .depends_on("result_analysis")
                .optional(),
        )
}

fn model_training() -> WorkflowTemplate {
    WorkflowTemplate::new("model_training")
        .with_description("Train and evaluate a return-prediction model")
        .with_category("model")
        .with_config("instruments", default_universe())
        .with_config("periods", 504)
        .with_config("seed", 11)
        .with_config("lookback", 20)
        .with_config("horizon", 5)
        .with_step(WorkflowStep::new("data_preparation", StepType::DataPreparation))
        .with_step(
            WorkflowStep::new("factor_generation", StepType::FactorGeneration)
                .depends_on("data_preparation"),
        )
        .with_step(
            WorkflowStep::new("model_training", StepType::ModelTraining)
                .with_config("train_ratio", 0.7)
                .depends_on("factor_generation"),
        )
        .with_step(
            WorkflowStep::new("result_analysis", StepType::ResultAnalysis)
                .depends_on("model_training"),
        )
}

fn strategy_backtest() -> WorkflowTemplate {
    WorkflowTemplate::new("strategy_backtest")
        .with_description("Backtest a momentum strategy on prepared data")
        .with_category("backtest")
        .with_config("instruments", default_universe())
        .with_config("periods", 504)
        .with_config("seed", 3)
        .with_config("lookback", 20)
        .with_config("top_n", 2)
        .with_step(WorkflowStep::new("data_preparation", StepType::DataPreparation))
        .with_step(
            WorkflowStep::new("strategy_backtest", StepType::StrategyBacktest)
                .with_config("rebalance_days", 5)
                .depends_on("data_preparation"),
        )
        .with_step(
            WorkflowStep::new("result_analysis", StepType::ResultAnalysis)
                .depends_on("strategy_backtest"),
        )
        .with_step(
            WorkflowStep::new("report_generation", StepType::ReportGeneration)
                .depends_on("result_analysis")
                .optional(),
        )
}

/// Name-indexed collection of templates.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, WorkflowTemplate>,
}

impl TemplateRegistry {
    /// Creates a registry holding only the built-in templates.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            templates: BTreeMap::new(),
        };
        for template in list_builtin_templates() {
            registry.register(template);
        }
        registry
    }

    /// Adds a template, replacing any existing one with the same name.
    pub fn register(&mut self, template: WorkflowTemplate) -> Option<WorkflowTemplate> {
        self.templates.insert(template.name.clone(), template)
    }

    /// Loads every template file in `dir` into the registry.
    ///
    /// Returns how many templates were loaded.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, ParseError> {
        let loaded = load_templates_dir(dir)?;
        let count = loaded.len();
        for template in loaded {
            if let Some(previous) = self.register(template) {
                info!("Template '{}' overridden from disk", previous.name);
            }
        }
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowTemplate> {
        self.templates.get(name)
    }

    /// All templates sorted by name.
    pub fn list(&self) -> Vec<&WorkflowTemplate> {
        self.templates.values().collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
