//! Workflow Engine
//!
//! Owns the lifecycle of a run:
//! - validation and execution ordering of the template
//! - allocation and guaranteed removal of the run workspace
//! - sequential dispatch of steps with fail-fast error handling
//! - progress reporting and cooperative cancellation

use std::path::Path;
use std::time::Instant;

use log::{debug, error, info, warn};

use super::context::{merge_config, RunContext};
use super::{CancelFlag, StepDispatcher, WorkflowResult, Workspace};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::monitoring::EventType;
use crate::script::{ScriptExecutor, SubprocessExecutor};
use crate::workflow::{execution_order, ConfigMap, WorkflowTemplate};

/// Executes workflow templates.
///
/// An engine holds no per-run state, so one instance can serve many runs,
/// concurrently if shared between threads.
///
/// # Example
///
/// ```rust,no_run
/// use quantflow::{Engine, EngineConfig, TemplateRegistry};
/// use quantflow::workflow::ConfigMap;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = TemplateRegistry::with_builtins();
///     let template = registry.get("factor_research").ok_or("unknown template")?;
///
///     let engine = Engine::from_config(EngineConfig::from_env());
///     let result = engine.execute(template, &ConfigMap::new(), |step, percent, _| {
///         println!("[{:>3}%] {}", percent, step);
///     })?;
///
///     println!("success: {}", result.success);
///     Ok(())
/// }
/// ```
pub struct Engine {
    executor: Box<dyn ScriptExecutor>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(executor: impl ScriptExecutor + 'static, config: EngineConfig) -> Self {
        Self {
            executor: Box::new(executor),
            config,
        }
    }

    /// An engine that runs scripts with the configured interpreter.
    pub fn from_config(config: EngineConfig) -> Self {
        let executor = SubprocessExecutor::new(config.interpreter.clone());
        Self::new(executor, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `template` to completion or first failure.
    pub fn execute<F>(
        &self,
        template: &WorkflowTemplate,
        overrides: &ConfigMap,
        progress: F,
    ) -> Result<WorkflowResult, EngineError>
    where
        F: FnMut(&str, u32, &str),
    {
        self.execute_with_cancel(template, overrides, progress, &CancelFlag::new())
    }

    /// Like [`Engine::execute`], stopping early once `cancel` is set.
    pub fn execute_with_cancel<F>(
        &self,
        template: &WorkflowTemplate,
        overrides: &ConfigMap,
        mut progress: F,
        cancel: &CancelFlag,
    ) -> Result<WorkflowResult, EngineError>
    where
        F: FnMut(&str, u32, &str),
    {
        let order = execution_order(template)?;

        let root = &self.config.workspace_root;
        let workspace = Workspace::create(root).map_err(|source| EngineError::Workspace {
            root: root.clone(),
            source,
        })?;

        let started = Instant::now();
        let run_id = workspace.run_id().to_string();
        info!(
            "Starting run {} of '{}' ({} steps)",
            run_id,
            template.name,
            order.len()
        );
        debug!("Workspace: {}", workspace.path().display());

        let mut ctx = RunContext::new(
            run_id.clone(),
            template.name.clone(),
            workspace.path(),
            merge_config(&template.base_config, overrides),
        );
        let dispatcher = StepDispatcher::new(self.executor.as_ref(), self.config.step_timeout);
        let mut result = WorkflowResult::new(run_id, template.name.clone());

        let total = order.len();
        for (position, &index) in order.iter().enumerate() {
            let step = &template.steps[index];

            if cancel.is_cancelled() {
                info!("Run cancelled before step '{}'", step.name);
                result.cancelled = true;
                break;
            }

            let percent = (position * 100 / total) as u32;
            progress(
                &step.name,
                percent,
                &format!("Starting step {}/{}: {}", position + 1, total, step.name),
            );
            info!("[{}/{}] Running '{}' ({})", position + 1, total, step.name, step.step_type);

            result.timeline.record(step.name.clone(), EventType::Started);
            let step_result = dispatcher.dispatch(step, &ctx, cancel);

            if step_result.success {
                result.timeline.record(step.name.clone(), EventType::Completed);
                if let Err(e) = ctx.record_output(&step.name, step.step_type.clone(), step_result.output.clone()) {
                    warn!("{}", e);
                }
                result.absorb_output(&step_result.output);
                result.steps.push(step_result);
                continue;
            }

            result.timeline.record(step.name.clone(), EventType::Failed);
            let message = step_result.error.clone().unwrap_or_default();
            let was_cancelled = step_result.is_cancelled() || cancel.is_cancelled();
            result.steps.push(step_result);

            if was_cancelled {
                info!("Run cancelled during step '{}'", step.name);
                result.cancelled = true;
                break;
            }

            if !step.required && self.config.tolerate_optional_failures {
                warn!("Optional step '{}' failed, continuing: {}", step.name, message);
                continue;
            }

            error!("Step '{}' failed: {}", step.name, message);
            result.error = Some(format!("step '{}' failed: {}", step.name, message));
            break;
        }

        if result.error.is_none() && !result.cancelled {
            progress(&template.name, 100, "Workflow completed");
            result.success = true;
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Run {} finished in {} ms: {} ({}/{} steps completed)",
            result.run_id,
            result.duration_ms,
            outcome_label(&result),
            ctx.completed_steps(),
            total
        );

        drop_workspace_files(&mut result, workspace.path());

        workspace.close();
        Ok(result)
    }
}

/// Removes output files that live inside the workspace, which is deleted
/// before the result reaches the caller. Relative paths resolve against
/// the workspace, so they go too.
fn drop_workspace_files(result: &mut WorkflowResult, workspace: &Path) {
    result.output_files.retain(|file| {
        let path = Path::new(file);
        let inside = path.is_relative() || path.starts_with(workspace);
        if inside {
            warn!(
                "Output file {} is inside the run workspace and will be removed; set output_dir to keep it",
                file
            );
        }
        !inside
    });
}

fn outcome_label(result: &WorkflowResult) -> &'static str {
    if result.success {
        "success"
    } else if result.cancelled {
        "cancelled"
    } else {
        "failed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ExecutionError, TemplateError};
    use crate::script::testing::RecordingExecutor;
    use crate::workflow::{StepType, WorkflowStep};
    use serde_json::{json, Value};
    use std::fs;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn setup(executor: RecordingExecutor) -> (Engine, Arc<RecordingExecutor>, TempDir) {
        setup_with(executor, |_| {})
    }

    fn setup_with(
        executor: RecordingExecutor,
        tweak: impl FnOnce(&mut EngineConfig),
    ) -> (Engine, Arc<RecordingExecutor>, TempDir) {
        let root = tempdir().unwrap();
        let mut config = EngineConfig {
            interpreter: PathBuf::from("sh"),
            workspace_root: root.path().to_path_buf(),
            step_timeout: Some(Duration::from_secs(5)),
            tolerate_optional_failures: false,
        };
        tweak(&mut config);

        let executor = Arc::new(executor);
        (Engine::new(Arc::clone(&executor), config), executor, root)
    }

    fn root_is_empty(root: &Path) -> bool {
        fs::read_dir(root).unwrap().next().is_none()
    }

    fn no_progress(_: &str, _: u32, _: &str) {}

    fn chain() -> WorkflowTemplate {
        WorkflowTemplate::new("chain")
            .with_step(WorkflowStep::new("a", StepType::DataPreparation))
            .with_step(WorkflowStep::new("b", StepType::FactorGeneration))
            .with_step(WorkflowStep::new("c", StepType::ResultAnalysis))
    }

    #[test]
    fn test_data_then_factors_succeeds() {
        let (engine, executor, root) = setup(RecordingExecutor::new());
        let template = WorkflowTemplate::new("two")
            .with_step(WorkflowStep::new("data_preparation", StepType::DataPreparation))
            .with_step(WorkflowStep::new("factor_generation", StepType::FactorGeneration));

        let result = engine.execute(&template, &ConfigMap::new(), no_progress).unwrap();

        assert!(result.success);
        assert!(!result.cancelled);
        assert!(result.error.is_none());
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps.iter().all(|s| s.success));
        assert_eq!(executor.call_names(), vec!["data_preparation", "factor_generation"]);
        assert!(root_is_empty(root.path()));
    }

    #[test]
    fn test_failed_data_preparation_stops_run() {
        let executor = RecordingExecutor::new().reply(
            "data_preparation",
            json!({"success": false, "error": "no instruments"}),
        );
        let (engine, executor, root) = setup(executor);
        let template = WorkflowTemplate::new("two")
            .with_step(WorkflowStep::new("data_preparation", StepType::DataPreparation))
            .with_step(WorkflowStep::new("model_training", StepType::ModelTraining));

        let result = engine.execute(&template, &ConfigMap::new(), no_progress).unwrap();

        assert!(!result.success);
        assert_eq!(result.steps.len(), 1);
        assert!(result.error.as_deref().unwrap().contains("no instruments"));
        assert_eq!(
            result.error.as_deref(),
            Some("step 'data_preparation' failed: no instruments")
        );
        assert_eq!(executor.call_names(), vec!["data_preparation"]);
        assert!(root_is_empty(root.path()));
    }

    #[test]
    fn test_order_preserved_and_fail_fast() {
        let executor =
            RecordingExecutor::new().reply("b", json!({"success": false, "error": "boom"}));
        let (engine, executor, _root) = setup(executor);

        let result = engine.execute(&chain(), &ConfigMap::new(), no_progress).unwrap();

        let names: Vec<&str> = result.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(result.steps[0].success);
        assert!(!result.steps[1].success);
        assert!(!result.success);
        assert_eq!(executor.call_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_config_precedence_seen_by_every_step() {
        let (engine, executor, _root) = setup(RecordingExecutor::new());
        let template = chain().with_config("x", 1).with_config("y", 2);
        let mut overrides = ConfigMap::new();
        overrides.insert("y".into(), json!(3));

        engine.execute(&template, &overrides, no_progress).unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 3);
        for call in calls {
            assert_eq!(call.config["x"], json!(1));
            assert_eq!(call.config["y"], json!(3));
        }
    }

    #[test]
    fn test_outputs_visible_only_to_later_steps() {
        let executor = RecordingExecutor::new()
            .reply("a", json!({"success": true, "data_path": "a.csv"}))
            .reply("b", json!({"success": true, "factor_path": "b.csv"}));
        let (engine, executor, _root) = setup(executor);
        let template = WorkflowTemplate::new("vis")
            .with_step(WorkflowStep::new("a", StepType::DataPreparation))
            .with_step(WorkflowStep::new("b", StepType::FactorGeneration).depends_on("a"))
            .with_step(WorkflowStep::new("c", StepType::ResultAnalysis).depends_on("b"));

        engine.execute(&template, &ConfigMap::new(), no_progress).unwrap();

        let calls = executor.calls();
        assert_eq!(calls[0].config["inputs"], json!({}));
        assert_eq!(calls[1].config["inputs"], json!({"data_preparation": {"data_path": "a.csv"}}));
        assert_eq!(calls[1].config["dependencies"], json!({"a": {"data_path": "a.csv"}}));
        assert!(calls[1].config["inputs"].get("factor_generation").is_none());
        assert_eq!(
            calls[2].config["inputs"]["factor_generation"],
            json!({"factor_path": "b.csv"})
        );
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let (engine, _executor, _root) = setup(RecordingExecutor::new());
        let mut seen: Vec<(String, u32)> = Vec::new();

        engine
            .execute(&chain(), &ConfigMap::new(), |step, percent, _| {
                seen.push((step.to_string(), percent));
            })
            .unwrap();

        let percents: Vec<u32> = seen.iter().map(|(_, p)| *p).collect();
        assert_eq!(percents, vec![0, 33, 66, 100]);
        assert_eq!(seen[0].0, "a");
        assert_eq!(seen[2].0, "c");
    }

    #[test]
    fn test_no_final_progress_on_failure() {
        let executor =
            RecordingExecutor::new().reply("a", json!({"success": false, "error": "x"}));
        let (engine, _executor, _root) = setup(executor);
        let mut percents = Vec::new();

        engine
            .execute(&chain(), &ConfigMap::new(), |_, percent, _| percents.push(percent))
            .unwrap();

        assert_eq!(percents, vec![0]);
    }

    #[test]
    fn test_empty_template_succeeds() {
        let (engine, executor, root) = setup(RecordingExecutor::new());
        let mut percents = Vec::new();

        let result = engine
            .execute(&WorkflowTemplate::new("empty"), &ConfigMap::new(), |_, p, _| {
                percents.push(p)
            })
            .unwrap();

        assert!(result.success);
        assert!(result.steps.is_empty());
        assert_eq!(percents, vec![100]);
        assert!(executor.calls().is_empty());
        assert!(root_is_empty(root.path()));
    }

    #[test]
    fn test_workspace_exists_during_run_and_removed_after() {
        let seen: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let executor = RecordingExecutor::new().on_call(move |request, _| {
            assert!(request.workspace_dir.is_dir());
            fs::write(request.workspace_dir.join("artifact.txt"), "x").unwrap();
            assert_eq!(
                request.config["workspace_dir"],
                json!(request.workspace_dir.display().to_string())
            );
            recorder.lock().unwrap().push(request.workspace_dir.clone());
        });
        let (engine, _executor, root) = setup(executor);

        engine.execute(&chain(), &ConfigMap::new(), no_progress).unwrap();

        let dirs = seen.lock().unwrap().clone();
        assert_eq!(dirs.len(), 3);
        assert!(dirs.iter().all(|d| d == &dirs[0]));
        assert!(!dirs[0].exists());
        assert!(root_is_empty(root.path()));
    }

    #[test]
    fn test_workspace_removed_when_callback_panics() {
        let (engine, _executor, root) = setup(RecordingExecutor::new());

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            engine.execute(&chain(), &ConfigMap::new(), |step, _, _| {
                if step == "b" {
                    panic!("progress sink went away");
                }
            })
        }));

        assert!(outcome.is_err());
        assert!(root_is_empty(root.path()));
    }

    #[test]
    fn test_cancel_before_start() {
        let (engine, executor, root) = setup(RecordingExecutor::new());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = engine
            .execute_with_cancel(&chain(), &ConfigMap::new(), no_progress, &cancel)
            .unwrap();

        assert!(result.cancelled);
        assert!(!result.success);
        assert!(result.error.is_none());
        assert!(result.steps.is_empty());
        assert!(executor.calls().is_empty());
        assert!(root_is_empty(root.path()));
    }

    #[test]
    fn test_cancel_between_steps() {
        let executor = RecordingExecutor::new().on_call(|request, cancel| {
            if request.step_name == "a" {
                cancel.cancel();
            }
        });
        let (engine, executor, root) = setup(executor);

        let result = engine
            .execute_with_cancel(&chain(), &ConfigMap::new(), no_progress, &CancelFlag::new())
            .unwrap();

        assert!(result.cancelled);
        assert!(!result.success);
        assert!(result.error.is_none());
        assert_eq!(result.steps.len(), 1);
        assert!(result.steps[0].success);
        assert_eq!(executor.call_names(), vec!["a"]);
        assert!(root_is_empty(root.path()));
    }

    #[test]
    fn test_cancel_during_step() {
        let executor = RecordingExecutor::new()
            .on_call(|request, cancel| {
                if request.step_name == "b" {
                    cancel.cancel();
                }
            })
            .error("b", || ExecutionError::Cancelled);
        let (engine, _executor, _root) = setup(executor);

        let result = engine
            .execute_with_cancel(&chain(), &ConfigMap::new(), no_progress, &CancelFlag::new())
            .unwrap();

        assert!(result.cancelled);
        assert!(result.error.is_none());
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[1].error_kind, Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_timeout_fails_step() {
        let executor = RecordingExecutor::new()
            .error("b", || ExecutionError::Timeout(Duration::from_secs(5)));
        let (engine, _executor, _root) = setup(executor);

        let result = engine.execute(&chain(), &ConfigMap::new(), no_progress).unwrap();

        assert!(!result.success);
        assert!(!result.cancelled);
        assert_eq!(result.steps[1].error_kind, Some(ErrorKind::Execution));
        assert!(result.error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn test_default_timeout_reaches_executor() {
        let (engine, executor, _root) = setup_with(RecordingExecutor::new(), |config| {
            config.step_timeout = Some(Duration::from_secs(42));
        });

        engine.execute(&chain(), &ConfigMap::new(), no_progress).unwrap();

        assert!(executor
            .calls()
            .iter()
            .all(|c| c.timeout == Some(Duration::from_secs(42))));
    }

    fn with_optional_report() -> WorkflowTemplate {
        WorkflowTemplate::new("optional")
            .with_step(WorkflowStep::new("prep", StepType::DataPreparation))
            .with_step(WorkflowStep::new("report", StepType::ReportGeneration).optional())
            .with_step(WorkflowStep::new("analysis", StepType::ResultAnalysis))
    }

    #[test]
    fn test_optional_failure_is_fatal_by_default() {
        let executor =
            RecordingExecutor::new().reply("report", json!({"success": false, "error": "disk full"}));
        let (engine, executor, _root) = setup(executor);

        let result = engine
            .execute(&with_optional_report(), &ConfigMap::new(), no_progress)
            .unwrap();

        assert!(!result.success);
        assert_eq!(executor.call_names(), vec!["prep", "report"]);
    }

    #[test]
    fn test_optional_failure_tolerated_when_enabled() {
        let executor =
            RecordingExecutor::new().reply("report", json!({"success": false, "error": "disk full"}));
        let (engine, executor, _root) = setup_with(executor, |config| {
            config.tolerate_optional_failures = true;
        });

        let result = engine
            .execute(&with_optional_report(), &ConfigMap::new(), no_progress)
            .unwrap();

        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.steps.len(), 3);
        assert!(!result.step("report").unwrap().success);
        assert_eq!(executor.call_names(), vec!["prep", "report", "analysis"]);
    }

    #[test]
    fn test_required_failure_is_fatal_even_with_tolerance() {
        let executor =
            RecordingExecutor::new().reply("prep", json!({"success": false, "error": "bad"}));
        let (engine, _executor, _root) = setup_with(executor, |config| {
            config.tolerate_optional_failures = true;
        });

        let result = engine
            .execute(&with_optional_report(), &ConfigMap::new(), no_progress)
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.steps.len(), 1);
    }

    #[test]
    fn test_invalid_template_rejected_before_workspace() {
        let (engine, executor, root) = setup(RecordingExecutor::new());
        let template = WorkflowTemplate::new("broken")
            .with_step(WorkflowStep::new("a", StepType::DataPreparation).depends_on("ghost"));

        let err = engine
            .execute(&template, &ConfigMap::new(), no_progress)
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::InvalidTemplate(TemplateError::UnknownDependency { .. })
        ));
        assert!(executor.calls().is_empty());
        assert!(root_is_empty(root.path()));
    }

    #[test]
    fn test_runs_in_dependency_order() {
        let (engine, executor, _root) = setup(RecordingExecutor::new());
        let template = WorkflowTemplate::new("reordered")
            .with_step(WorkflowStep::new("factors", StepType::FactorGeneration).depends_on("prep"))
            .with_step(WorkflowStep::new("prep", StepType::DataPreparation));

        let result = engine.execute(&template, &ConfigMap::new(), no_progress).unwrap();

        assert!(result.success);
        assert_eq!(executor.call_names(), vec!["prep", "factors"]);
    }

    #[test]
    fn test_unsupported_step_fails_run() {
        let (engine, executor, _root) = setup(RecordingExecutor::new());
        let template = WorkflowTemplate::new("odd")
            .with_step(WorkflowStep::new("a", StepType::DataPreparation))
            .with_step(WorkflowStep::new("b", "sentiment"));

        let result = engine.execute(&template, &ConfigMap::new(), no_progress).unwrap();

        assert!(!result.success);
        assert_eq!(result.steps[1].error_kind, Some(ErrorKind::Configuration));
        assert_eq!(
            result.error.as_deref(),
            Some("step 'b' failed: unsupported step type: sentiment")
        );
        assert_eq!(executor.call_names(), vec!["a"]);
    }

    #[test]
    fn test_metrics_and_output_files_aggregated() {
        let executor = RecordingExecutor::new()
            .reply("a", json!({"success": true, "metrics": {"rows": 10, "sharpe": 0.1}}))
            .reply("c", json!({
                "success": true,
                "metrics": {"sharpe": 1.4},
                "output_files": ["/reports/run.md"]
            }));
        let (engine, _executor, _root) = setup(executor);

        let result = engine.execute(&chain(), &ConfigMap::new(), no_progress).unwrap();

        assert_eq!(result.metrics["rows"], json!(10));
        assert_eq!(result.metrics["sharpe"], json!(1.4));
        assert_eq!(result.output_files, vec!["/reports/run.md".to_string()]);
        assert_eq!(result.timeline.spans().len(), 3);
        assert_eq!(result.template, "chain");
        assert!(!result.run_id.is_empty());
    }

    #[test]
    fn test_output_files_exist_after_run() {
        let kept = tempdir().unwrap();
        let kept_file = kept.path().join("report.md");
        let kept_path = kept_file.display().to_string();
        let executor = RecordingExecutor::new().on_call(move |request, _| {
            if request.step_name == "c" {
                fs::write(&kept_file, "# report").unwrap();
                fs::write(request.workspace_dir.join("scratch.md"), "tmp").unwrap();
            }
        });
        let reply = json!({
            "success": true,
            "output_files": [kept_path.clone(), "scratch.md"]
        });
        let executor = executor.reply("c", reply);
        let (engine, _executor, _root) = setup(executor);

        let result = engine.execute(&chain(), &ConfigMap::new(), no_progress).unwrap();

        assert!(result.success);
        assert_eq!(result.output_files, vec![kept_path]);
        for file in &result.output_files {
            assert!(Path::new(file).is_file(), "{} should survive the run", file);
        }
    }

    #[test]
    fn test_drop_workspace_files() {
        let mut result = WorkflowResult::new("r", "t");
        result.output_files = vec![
            "/tmp/quantflow-abc/reports/run.md".to_string(),
            "reports/relative.md".to_string(),
            "/srv/reports/run.md".to_string(),
        ];

        drop_workspace_files(&mut result, Path::new("/tmp/quantflow-abc"));

        assert_eq!(result.output_files, vec!["/srv/reports/run.md".to_string()]);
    }

    #[test]
    fn test_huge_step_timeout_falls_back_to_default() {
        let (engine, executor, _root) = setup(RecordingExecutor::new());
        let template = WorkflowTemplate::new("huge_timeout").with_step(
            WorkflowStep::new("prep", StepType::DataPreparation).with_config("timeout_secs", 1e20),
        );

        let result = engine.execute(&template, &ConfigMap::new(), no_progress).unwrap();

        assert!(result.success);
        assert_eq!(executor.calls()[0].timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_step_output_recorded_without_success_field() {
        let executor = RecordingExecutor::new().reply("a", json!({"success": true, "rows": 3}));
        let (engine, _executor, _root) = setup(executor);

        let result = engine.execute(&chain(), &ConfigMap::new(), no_progress).unwrap();
        assert_eq!(result.steps[0].output, json!({"rows": 3}));
        assert_eq!(result.steps[1].output, json!({"data": {}}));
        assert_ne!(result.steps[2].output, Value::Null);
    }

    #[test]
    fn test_concurrent_runs_use_separate_workspaces() {
        let dirs: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&dirs);
        let executor = RecordingExecutor::new().on_call(move |request, _| {
            recorder.lock().unwrap().push(request.workspace_dir.clone());
        });
        let (engine, _executor, root) = setup(executor);
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    engine
                        .execute(&chain(), &ConfigMap::new(), |_, _, _| {})
                        .unwrap()
                })
            })
            .collect();

        let run_ids: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().unwrap().run_id)
            .collect();

        let mut unique_dirs = dirs.lock().unwrap().clone();
        unique_dirs.sort();
        unique_dirs.dedup();
        assert_eq!(unique_dirs.len(), 4);

        let mut unique_ids = run_ids.clone();
        unique_ids.sort();
        unique_ids.dedup();
        assert_eq!(unique_ids.len(), 4);
        assert!(root_is_empty(root.path()));
    }

    #[test]
    fn test_workspace_allocation_failure() {
        let root = tempdir().unwrap();
        let blocker = root.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let config = EngineConfig {
            interpreter: PathBuf::from("sh"),
            workspace_root: blocker.clone(),
            step_timeout: None,
            tolerate_optional_failures: false,
        };
        let engine = Engine::new(RecordingExecutor::new(), config);

        let err = engine
            .execute(&chain(), &ConfigMap::new(), no_progress)
            .unwrap_err();

        match err {
            EngineError::Workspace { root, .. } => assert_eq!(root, blocker),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_full_pipeline_with_reference_scripts() {
        let Some(python) = crate::script::interpreter::which("python3") else {
            return;
        };
        let root = tempdir().unwrap();
        let reports = tempdir().unwrap();
        let config = EngineConfig {
            interpreter: python,
            workspace_root: root.path().to_path_buf(),
            step_timeout: Some(Duration::from_secs(120)),
            tolerate_optional_failures: false,
        };
        let engine = Engine::from_config(config);
        let template = crate::workflow::list_builtin_templates()
            .into_iter()
            .find(|t| t.name == "full_research_pipeline")
            .unwrap();
        let mut overrides = ConfigMap::new();
        overrides.insert("periods".into(), json!(120));
        overrides.insert(
            "output_dir".into(),
            json!(reports.path().display().to_string()),
        );

        let result = engine.execute(&template, &overrides, no_progress).unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.steps.len(), 6);
        assert!(result.metrics.contains_key("sharpe_ratio"));
        assert_eq!(result.output_files.len(), 1);
        assert!(Path::new(&result.output_files[0]).is_file());
        assert!(root_is_empty(root.path()));
    }

    #[test]
    fn test_reference_script_reports_no_instruments() {
        let Some(python) = crate::script::interpreter::which("python3") else {
            return;
        };
        let root = tempdir().unwrap();
        let config = EngineConfig {
            interpreter: python,
            workspace_root: root.path().to_path_buf(),
            step_timeout: Some(Duration::from_secs(60)),
            tolerate_optional_failures: false,
        };
        let engine = Engine::from_config(config);
        let template = WorkflowTemplate::new("empty_universe")
            .with_config("instruments", json!([]))
            .with_step(WorkflowStep::new("data_preparation", StepType::DataPreparation))
            .with_step(WorkflowStep::new("model_training", StepType::ModelTraining));

        let result = engine.execute(&template, &ConfigMap::new(), no_progress).unwrap();

        assert!(!result.success);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].error_kind, Some(ErrorKind::Application));
        assert!(result.error.as_deref().unwrap().contains("no instruments"));
    }
}
