//! Template Validation
//!
//! Checks a template's structure before a run allocates anything:
//! - Template and step names are present and unique
//! - Every declared dependency names a step of the same template
//! - The dependency graph has no cycles
//!
//! Successful validation yields the execution order: a topological order
//! of the steps that keeps declaration order wherever the dependencies
//! allow it.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, warn};

use super::model::WorkflowTemplate;
use crate::error::TemplateError;

/// Validates a template and returns the indices of its steps in execution order.
///
/// Uses Kahn's algorithm, always picking the earliest-declared step whose
/// dependencies are satisfied, so a template that already lists its steps
/// in dependency order runs exactly as declared.
pub fn execution_order(template: &WorkflowTemplate) -> Result<Vec<usize>, TemplateError> {
    if template.name.trim().is_empty() {
        return Err(TemplateError::EmptyName);
    }

    let mut index_of: HashMap<&str, usize> = HashMap::new();
    for (index, step) in template.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(TemplateError::EmptyStepName {
                template: template.name.clone(),
            });
        }
        if index_of.insert(step.name.as_str(), index).is_some() {
            return Err(TemplateError::DuplicateStep {
                template: template.name.clone(),
                step: step.name.clone(),
            });
        }
    }

    // in_degree[i] = number of distinct dependencies of step i
    // dependents[i] = steps that list step i as a dependency
    let mut in_degree = vec![0usize; template.steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); template.steps.len()];

    for (index, step) in template.steps.iter().enumerate() {
        let mut seen: HashSet<&str> = HashSet::new();
        for dependency in &step.dependencies {
            if dependency == &step.name {
                return Err(TemplateError::SelfDependency(step.name.clone()));
            }
            let Some(&dep_index) = index_of.get(dependency.as_str()) else {
                return Err(TemplateError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dependency.clone(),
                });
            };
            if !seen.insert(dependency.as_str()) {
                warn!(
                    "Step '{}' lists dependency '{}' more than once",
                    step.name, dependency
                );
                continue;
            }
            in_degree[index] += 1;
            dependents[dep_index].push(index);
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| index)
        .collect();

    let mut order = Vec::with_capacity(template.steps.len());

    while let Some(current) = ready.pop_first() {
        order.push(current);
        for &successor in &dependents[current] {
            in_degree[successor] -= 1;
            if in_degree[successor] == 0 {
                ready.insert(successor);
            }
        }
    }

    if order.len() != template.steps.len() {
        let steps = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(index, _)| template.steps[index].name.clone())
            .collect();
        return Err(TemplateError::CyclicDependency {
            template: template.name.clone(),
            steps,
        });
    }

    if order.iter().enumerate().any(|(position, index)| position != *index) {
        warn!(
            "Template '{}' lists steps out of dependency order; running them reordered",
            template.name
        );
    }

    debug!(
        "Execution order for '{}': {:?}",
        template.name,
        order
            .iter()
            .map(|i| template.steps[*i].name.as_str())
            .collect::<Vec<_>>()
    );

    Ok(order)
}

/// Validates a template without computing anything else.
pub fn validate_template(template: &WorkflowTemplate) -> Result<(), TemplateError> {
    execution_order(template).map(|_| ())
}

/// Quick validation that returns human-readable problems, including
/// ones that do not block execution (such as unsupported step types).
pub fn quick_validate(template: &WorkflowTemplate) -> Vec<String> {
    let mut problems = Vec::new();

    if let Err(e) = validate_template(template) {
        problems.push(e.to_string());
    }

    for step in &template.steps {
        if !step.step_type.is_supported() {
            problems.push(format!(
                "Step '{}': unsupported step type '{}'",
                step.name, step.step_type
            ));
        }
    }

    problems
}
