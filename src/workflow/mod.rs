//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, loading and
//! validating workflow templates.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (WorkflowTemplate, WorkflowStep, StepType)
//! - [`parser`]: YAML loading and override parsing
//! - [`validator`]: Structural validation and execution ordering
//! - [`templates`]: Built-in template catalog and registry

pub mod model;
pub mod parser;
pub mod templates;
pub mod validator;

pub use model::{ConfigMap, StepType, WorkflowStep, WorkflowTemplate};
pub use parser::{load_overrides, load_template, parse_override, save_template};
pub use templates::{list_builtin_templates, TemplateRegistry};
pub use validator::{execution_order, quick_validate, validate_template};
