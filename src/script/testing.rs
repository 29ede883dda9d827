//! Recording executor used by dispatcher and engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{json, Value};

use super::{ScriptExecutor, ScriptRequest, ScriptResponse};
use crate::error::ExecutionError;
use crate::execution::CancelFlag;

type ErrorFactory = Box<dyn Fn() -> ExecutionError + Send + Sync>;
type Hook = Box<dyn Fn(&ScriptRequest, &CancelFlag) + Send + Sync>;

/// Answers every request from a per-step table and records what it saw.
///
/// Steps without an entry get `{"success": true, "data": {}}`.
#[derive(Default)]
pub struct RecordingExecutor {
    replies: HashMap<String, Value>,
    errors: HashMap<String, ErrorFactory>,
    hook: Option<Hook>,
    calls: Mutex<Vec<ScriptRequest>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result object returned for `step`.
    pub fn reply(mut self, step: &str, result: Value) -> Self {
        self.replies.insert(step.to_string(), result);
        self
    }

    /// Execution error returned for `step`.
    pub fn error(
        mut self,
        step: &str,
        make: impl Fn() -> ExecutionError + Send + Sync + 'static,
    ) -> Self {
        self.errors.insert(step.to_string(), Box::new(make));
        self
    }

    /// Runs before every reply.
    pub fn on_call(
        mut self,
        hook: impl Fn(&ScriptRequest, &CancelFlag) + Send + Sync + 'static,
    ) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<ScriptRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.step_name).collect()
    }
}

impl ScriptExecutor for RecordingExecutor {
    fn execute(
        &self,
        request: &ScriptRequest,
        cancel: &CancelFlag,
    ) -> Result<ScriptResponse, ExecutionError> {
        self.calls.lock().unwrap().push(request.clone());

        if let Some(hook) = &self.hook {
            hook(request, cancel);
        }

        if let Some(make) = self.errors.get(&request.step_name) {
            return Err(make());
        }

        let reply = self
            .replies
            .get(&request.step_name)
            .cloned()
            .unwrap_or_else(|| json!({"success": true, "data": {}}));
        ScriptResponse::from_value(reply)
    }
}
