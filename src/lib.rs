//! quantflow - Workflow Orchestration Engine for Quant Research
//!
//! Runs research pipelines made of named, typed steps (data preparation,
//! factor generation, model training, strategy backtest, result analysis,
//! report generation). Each step delegates its computation to an external
//! analytics script; the engine owns sequencing, shared run state,
//! workspace isolation, progress reporting and fail-fast error handling.
//!
//! # Architecture
//!
//! - [`workflow`]: Template definitions, YAML loading, validation and built-ins
//! - [`execution`]: Engine, step dispatcher, run context and results
//! - [`script`]: Script execution service and reference analytics scripts
//! - [`monitoring`]: Execution timeline
//! - [`config`]: Engine-wide settings
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use quantflow::workflow::ConfigMap;
//! use quantflow::{load_template, Engine, EngineConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let template = load_template("pipeline.yaml")?;
//!
//!     let engine = Engine::from_config(EngineConfig::from_env());
//!     let result = engine.execute(&template, &ConfigMap::new(), |step, percent, message| {
//!         println!("[{:>3}%] {}: {}", percent, step, message);
//!     })?;
//!
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod script;
pub mod workflow;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{EngineError, ErrorKind, ParseError, StepError, TemplateError};
pub use execution::{CancelFlag, Engine, StepResult, WorkflowResult};
pub use script::{ScriptExecutor, SubprocessExecutor};
pub use workflow::model::{StepType, WorkflowStep, WorkflowTemplate};
pub use workflow::parser::load_template;
pub use workflow::templates::{list_builtin_templates, TemplateRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "quantflow";
