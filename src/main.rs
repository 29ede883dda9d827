//! quantflow CLI Entry Point
//!
//! # Usage
//!
//! ```bash
//! # List built-in and custom templates
//! quantflow list --templates-dir ./templates
//!
//! # Print a template as YAML
//! quantflow show factor_research
//!
//! # Validate a template file
//! quantflow validate pipeline.yaml
//!
//! # Run a template with overrides
//! quantflow run full_research_pipeline --set seed=7 --set 'instruments=["AAPL","MSFT"]'
//! ```

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use colored::Colorize;
use log::{error, info};
use serde_json::Value;

use quantflow::config::parse_timeout;
use quantflow::workflow::{
    execution_order, load_overrides, parse_override, quick_validate, ConfigMap,
};
use quantflow::{
    load_template, Engine, EngineConfig, TemplateRegistry, WorkflowResult, WorkflowTemplate,
    APP_NAME, VERSION,
};

/// Config key naming the directory reports are written to.
const OUTPUT_DIR_KEY: &str = "output_dir";

/// Report directory used when none is configured, relative to the
/// current directory.
const DEFAULT_REPORT_DIR: &str = "reports";

/// What the user asked for.
#[derive(Debug, PartialEq)]
enum Command {
    List,
    Show(String),
    Validate(PathBuf),
    Run(String),
}

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    command: Option<Command>,
    templates_dir: Option<PathBuf>,
    config_file: Option<PathBuf>,
    overrides: Vec<String>,
    workspace_root: Option<PathBuf>,
    python: Option<PathBuf>,
    timeout: Option<String>,
    continue_on_optional: bool,
    json: bool,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Quant Research Workflow Engine");
    println!();
}

fn print_usage() {
    println!("Usage: quantflow <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  list                    List available templates");
    println!("  show <NAME>             Print a template as YAML");
    println!("  validate <FILE>         Validate a template file");
    println!("  run <NAME|FILE>         Execute a template");
    println!();
    println!("Options:");
    println!("  --templates-dir DIR     Load additional templates from DIR");
    println!("  --config FILE           Override configuration (YAML or JSON mapping)");
    println!("  --set KEY=VALUE         Override a single configuration key (repeatable)");
    println!("  --workspace-root DIR    Parent directory for run workspaces");
    println!("  --python PATH           Interpreter for analytics scripts");
    println!("  --timeout SECS          Default step timeout, 0 disables it");
    println!("  --continue-on-optional  Keep going when an optional step fails");
    println!("  --json                  Print the run result as JSON");
    println!("  --verbose               Enable debug logging");
    println!("  --help                  Show this help message");
    println!("  --version               Show version information");
    println!();
    println!("Examples:");
    println!("  quantflow run factor_research --set seed=7");
    println!("  quantflow run pipeline.yaml --config overrides.yaml --json");
}

/// Returns the value following a flag.
fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", flag))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => config.verbose = true,
            "--json" => config.json = true,
            "--continue-on-optional" => config.continue_on_optional = true,
            "--templates-dir" => {
                config.templates_dir = Some(PathBuf::from(flag_value(args, &mut i, arg)?));
            }
            "--config" => {
                config.config_file = Some(PathBuf::from(flag_value(args, &mut i, arg)?));
            }
            "--set" => {
                config.overrides.push(flag_value(args, &mut i, arg)?.to_string());
            }
            "--workspace-root" => {
                config.workspace_root = Some(PathBuf::from(flag_value(args, &mut i, arg)?));
            }
            "--python" => {
                config.python = Some(PathBuf::from(flag_value(args, &mut i, arg)?));
            }
            "--timeout" => {
                config.timeout = Some(flag_value(args, &mut i, arg)?.to_string());
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => positional.push(arg.clone()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    config.command = match positional.next().as_deref() {
        None => None,
        Some("list") => Some(Command::List),
        Some("show") => Some(Command::Show(
            positional.next().ok_or("show requires a template name")?,
        )),
        Some("validate") => Some(Command::Validate(PathBuf::from(
            positional.next().ok_or("validate requires a file")?,
        ))),
        Some("run") => Some(Command::Run(
            positional.next().ok_or("run requires a template name or file")?,
        )),
        Some(other) => return Err(format!("Unknown command: {}", other)),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {}", extra));
    }

    Ok(config)
}

fn load_registry(templates_dir: Option<&Path>) -> Result<TemplateRegistry, Box<dyn std::error::Error>> {
    let mut registry = TemplateRegistry::with_builtins();
    if let Some(dir) = templates_dir {
        let loaded = registry.load_dir(dir)?;
        info!("Loaded {} template(s) from {}", loaded, dir.display());
    }
    Ok(registry)
}

/// Treats `target` as a file when it exists or has a template extension,
/// otherwise as a registry name.
fn resolve_template(
    target: &str,
    templates_dir: Option<&Path>,
) -> Result<WorkflowTemplate, Box<dyn std::error::Error>> {
    let path = Path::new(target);
    let looks_like_file = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    );

    if path.is_file() || looks_like_file {
        return Ok(load_template(path)?);
    }

    let registry = load_registry(templates_dir)?;
    registry
        .get(target)
        .cloned()
        .ok_or_else(|| format!("Unknown template: {} (try 'quantflow list')", target).into())
}

fn list_templates(config: &Config) -> Result<bool, Box<dyn std::error::Error>> {
    let registry = load_registry(config.templates_dir.as_deref())?;

    println!("{:<26} {:<10} {:>5}  {}", "NAME".bold(), "CATEGORY".bold(), "STEPS".bold(), "DESCRIPTION".bold());
    for template in registry.list() {
        println!(
            "{:<26} {:<10} {:>5}  {}",
            template.name.cyan(),
            template.category,
            template.len(),
            template.description
        );
    }
    Ok(true)
}

fn show_template(name: &str, config: &Config) -> Result<bool, Box<dyn std::error::Error>> {
    let template = resolve_template(name, config.templates_dir.as_deref())?;
    print!("{}", serde_yaml::to_string(&template)?);
    Ok(true)
}

fn validate_file(path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let template = load_template(path)?;
    let order = execution_order(&template)?;

    println!("{} {} ({} steps)", "valid".green().bold(), template.name, template.len());
    for (position, index) in order.iter().enumerate() {
        let step = &template.steps[*index];
        let marker = if step.required { "" } else { " (optional)" };
        println!("  {}. {} [{}]{}", position + 1, step.name, step.step_type, marker);
    }

    let warnings = quick_validate(&template);
    for warning in &warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    Ok(warnings.is_empty())
}

/// Points `output_dir` at a directory that outlives the run workspace.
///
/// Reports go to `./reports` unless the overrides or the template name a
/// directory. Relative directories resolve against the current directory,
/// not the workspace the scripts run in.
fn resolve_output_dir(template: &WorkflowTemplate, overrides: &mut ConfigMap) -> io::Result<()> {
    let configured = overrides
        .get(OUTPUT_DIR_KEY)
        .or_else(|| template.base_config.get(OUTPUT_DIR_KEY))
        .and_then(Value::as_str)
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from);

    let dir = configured.unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR));
    let dir = if dir.is_relative() {
        env::current_dir()?.join(dir)
    } else {
        dir
    };

    overrides.insert(
        OUTPUT_DIR_KEY.to_string(),
        Value::String(dir.display().to_string()),
    );
    Ok(())
}

/// Collects run overrides; `--set` entries win over the `--config` file.
fn collect_overrides(config: &Config) -> Result<ConfigMap, Box<dyn std::error::Error>> {
    let mut overrides = match &config.config_file {
        Some(path) => load_overrides(path)?,
        None => ConfigMap::new(),
    };
    for entry in &config.overrides {
        let (key, value) = parse_override(entry)?;
        overrides.insert(key, value);
    }
    Ok(overrides)
}

fn engine_config(config: &Config) -> Result<EngineConfig, String> {
    let mut engine_config = EngineConfig::from_env();

    if let Some(path) = &config.python {
        engine_config.interpreter = path.clone();
    }
    if let Some(root) = &config.workspace_root {
        engine_config.workspace_root = root.clone();
    }
    if let Some(raw) = &config.timeout {
        engine_config.step_timeout =
            parse_timeout(raw).ok_or_else(|| format!("Invalid timeout value: {}", raw))?;
    }
    if config.continue_on_optional {
        engine_config.tolerate_optional_failures = true;
    }

    Ok(engine_config)
}

fn print_summary(result: &WorkflowResult) {
    println!();
    println!("{}", "Steps:".bold());
    for step in &result.steps {
        let status = if step.success {
            "ok".green()
        } else if step.is_cancelled() {
            "cancelled".yellow()
        } else {
            "failed".red()
        };
        println!("  {:<24} {:<10} {:>8} ms", step.name, status, step.duration_ms);
        if let Some(err) = &step.error {
            println!("      {}", err.red());
        }
    }

    if !result.metrics.is_empty() {
        println!();
        println!("{}", "Metrics:".bold());
        for (key, value) in &result.metrics {
            println!("  {:<24} {}", key, value);
        }
    }

    if !result.output_files.is_empty() {
        println!();
        println!("{}", "Output files:".bold());
        for file in &result.output_files {
            println!("  {}", file);
        }
    }

    print!("{}", result.timeline.gantt_chart());
    println!();

    if let Some(step) = result.failed_step().filter(|_| !result.success) {
        println!("First failed step: {} [{}]", step.name.red(), step.step_type);
    }

    let outcome = if result.success {
        "SUCCESS".green().bold()
    } else if result.cancelled {
        "CANCELLED".yellow().bold()
    } else {
        "FAILED".red().bold()
    };
    println!("Run {} {} in {} ms", result.run_id, outcome, result.duration_ms);
}

fn run_template(target: &str, config: &Config) -> Result<bool, Box<dyn std::error::Error>> {
    let template = resolve_template(target, config.templates_dir.as_deref())?;
    let mut overrides = collect_overrides(config)?;
    resolve_output_dir(&template, &mut overrides)?;
    let engine = Engine::from_config(engine_config(config)?);

    info!("Template: {} ({} steps)", template.name, template.len());
    info!("Interpreter: {}", engine.config().interpreter.display());
    if !overrides.is_empty() {
        let keys: Vec<&str> = overrides.keys().map(String::as_str).collect();
        info!("Overrides: {}", keys.join(", "));
    }

    let quiet = config.json;
    let result = engine.execute(&template, &overrides, |step, percent, message| {
        if !quiet {
            println!("{} {} ({})", format!("[{:>3}%]", percent).cyan(), message, step);
        }
    })?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if let Some(err) = &result.error {
        error!("{}", err);
    }
    Ok(result.success)
}

/// Main application entry point. Returns whether the command succeeded.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);

    let Some(command) = &config.command else {
        print_usage();
        return Ok(false);
    };

    if !config.json {
        print_banner();
    }

    match command {
        Command::List => list_templates(&config),
        Command::Show(name) => show_template(name, &config),
        Command::Validate(path) => validate_file(path),
        Command::Run(target) => run_template(target, &config),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
