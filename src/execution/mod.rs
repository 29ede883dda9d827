//! Workflow Execution Module
//!
//! Runs validated templates step by step against an isolated workspace.
//!
//! # Architecture
//!
//! - [`engine`]: run lifecycle, fail-fast handling and progress reporting
//! - [`dispatcher`]: per-step input contracts and script invocation
//! - [`context`]: merged configuration and step outputs of one run
//! - [`workspace`]: self-removing run directories
//! - [`result`]: serializable step and run results
//! - [`cancel`]: cooperative cancellation flag

pub mod cancel;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod result;
pub mod workspace;

pub use cancel::CancelFlag;
pub use context::{merge_config, RunContext};
pub use dispatcher::{step_contract, StepContract, StepDispatcher};
pub use engine::Engine;
pub use result::{StepResult, WorkflowResult};
pub use workspace::Workspace;
