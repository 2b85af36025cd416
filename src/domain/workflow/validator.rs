//! Workflow definition validation
//!
//! Checks run cheapest first and stop at the first failing stage:
//! structure, then the start step, then step references, then cycles over
//! `onSuccess`/`onFailure` edges.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use super::entity::WorkflowDefinition;
use super::error::WorkflowError;

/// Outcome of validating a definition
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn into_result(self) -> Result<(), WorkflowError> {
        if self.valid {
            Ok(())
        } else {
            Err(WorkflowError::validation_errors(self.errors))
        }
    }
}

/// Validate a definition. Pure: no I/O, no shared state.
pub fn validate(definition: &WorkflowDefinition) -> ValidationReport {
    let structural = structural_errors(definition);
    if !structural.is_empty() {
        return ValidationReport::from_errors(structural);
    }

    let references = reference_errors(definition);
    if !references.is_empty() {
        return ValidationReport::from_errors(references);
    }

    ValidationReport::from_errors(
        find_cycles(definition)
            .into_iter()
            .map(|cycle| format!("Cycle detected: {}", cycle.join(" -> ")))
            .collect(),
    )
}

/// Validate an untyped definition, reporting shape errors as structural errors
pub fn validate_value(value: &Value) -> (Option<WorkflowDefinition>, ValidationReport) {
    match serde_json::from_value::<WorkflowDefinition>(value.clone()) {
        Ok(definition) => {
            let report = validate(&definition);
            (Some(definition), report)
        }
        Err(e) => (
            None,
            ValidationReport::from_errors(vec![format!("Invalid workflow definition: {}", e)]),
        ),
    }
}

fn structural_errors(definition: &WorkflowDefinition) -> Vec<String> {
    let mut errors = Vec::new();

    if let Err(validation) = definition.validate() {
        flatten_validation_errors(&validation, "", &mut errors);
        errors.sort();
    }

    let mut seen = HashSet::new();
    for step in definition.steps() {
        if !seen.insert(step.id()) {
            errors.push(format!("Duplicate step id '{}'", step.id()));
        }

        if let Some(condition) = step.condition() {
            if let Err(e) = condition.compile() {
                errors.push(format!("Step '{}' has an invalid condition: {}", step.id(), e));
            }
        }
    }

    errors
}

fn flatten_validation_errors(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid ({})", path, error.code));

                    if prefix.is_empty() {
                        out.push(message);
                    } else {
                        out.push(format!("{}: {}", prefix, message));
                    }
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten_validation_errors(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    flatten_validation_errors(nested, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

fn reference_errors(definition: &WorkflowDefinition) -> Vec<String> {
    let ids: HashSet<&str> = definition.steps().iter().map(|s| s.id()).collect();

    if !ids.contains(definition.start_step()) {
        return vec![format!(
            "Start step '{}' does not exist",
            definition.start_step()
        )];
    }

    let mut errors = Vec::new();

    for step in definition.steps() {
        let transitions = [("onSuccess", step.on_success()), ("onFailure", step.on_failure())];

        for (label, target) in transitions {
            if let Some(target) = target {
                if !ids.contains(target) {
                    errors.push(format!(
                        "Step '{}' {} references unknown step '{}'",
                        step.id(),
                        label,
                        target
                    ));
                }
            }
        }

        for target in step.rollback_steps() {
            if !ids.contains(target.as_str()) {
                errors.push(format!(
                    "Step '{}' rollbackSteps references unknown step '{}'",
                    step.id(),
                    target
                ));
            }
        }
    }

    errors
}

/// Every distinct cycle over the transition graph, as node sequences ending where they start
pub fn find_cycles(definition: &WorkflowDefinition) -> Vec<Vec<String>> {
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in definition.steps() {
        let targets = edges.entry(step.id()).or_default();
        targets.extend(step.on_success());
        targets.extend(step.on_failure());
    }

    let mut visited = HashSet::new();
    let mut rec_stack = Vec::new();
    let mut cycles = Vec::new();

    for step in definition.steps() {
        if !visited.contains(step.id()) {
            collect_cycles(step.id(), &edges, &mut visited, &mut rec_stack, &mut cycles);
        }
    }

    let mut seen = HashSet::new();
    cycles.retain(|cycle| seen.insert(canonical_cycle(cycle)));
    cycles
}

/// Depth-first search keeping the current path as the recursion stack
fn collect_cycles<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    visited.insert(node);
    rec_stack.push(node);

    for &next in edges.get(node).map(Vec::as_slice).unwrap_or_default() {
        if let Some(position) = rec_stack.iter().position(|n| *n == next) {
            let mut cycle: Vec<String> = rec_stack[position..].iter().map(|n| n.to_string()).collect();
            cycle.push(next.to_string());
            cycles.push(cycle);
        } else if !visited.contains(next) {
            collect_cycles(next, edges, visited, rec_stack, cycles);
        }
    }

    rec_stack.pop();
}

/// Rotation-independent form of a cycle, for deduplication
fn canonical_cycle(cycle: &[String]) -> Vec<String> {
    let nodes = &cycle[..cycle.len().saturating_sub(1)];
    let start = nodes
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);

    nodes[start..].iter().chain(&nodes[..start]).cloned().collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::workflow::condition::StepCondition;
    use crate::domain::workflow::entity::{RetryPolicy, WorkflowStep};

    fn two_steps() -> WorkflowDefinition {
        WorkflowDefinition::new("wf", "Workflow", "a")
            .with_step(WorkflowStep::new("a", "echo").with_on_success("b"))
            .with_step(WorkflowStep::new("b", "echo"))
    }

    #[test]
    fn test_valid_workflow() {
        let report = validate(&two_steps());

        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_missing_start_step() {
        let workflow = WorkflowDefinition::new("wf", "Workflow", "nope")
            .with_step(WorkflowStep::new("a", "echo"));

        let report = validate(&workflow);

        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Start step 'nope' does not exist"]);
    }

    #[test]
    fn test_unknown_references() {
        let workflow = WorkflowDefinition::new("wf", "Workflow", "a").with_step(
            WorkflowStep::new("a", "echo")
                .with_on_success("x")
                .with_on_failure("y")
                .with_rollback_steps(vec!["z".to_string()]),
        );

        let report = validate(&workflow);

        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[0].contains("onSuccess references unknown step 'x'"));
        assert!(report.errors[2].contains("rollbackSteps references unknown step 'z'"));
    }

    #[test]
    fn test_cycle_detection() {
        let workflow = WorkflowDefinition::new("wf", "Workflow", "A")
            .with_step(WorkflowStep::new("A", "echo").with_on_success("B"))
            .with_step(WorkflowStep::new("B", "echo").with_on_success("A"));

        let report = validate(&workflow);

        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Cycle detected: A -> B -> A"]);
    }

    #[test]
    fn test_failure_edge_cycle_and_self_loop() {
        let workflow = WorkflowDefinition::new("wf", "Workflow", "a")
            .with_step(WorkflowStep::new("a", "echo").with_on_success("b"))
            .with_step(WorkflowStep::new("b", "echo").with_on_failure("a").with_on_success("c"))
            .with_step(WorkflowStep::new("c", "echo").with_on_failure("c"));

        let cycles = find_cycles(&workflow);

        assert_eq!(cycles.len(), 2);
        assert!(cycles.contains(&vec!["a".to_string(), "b".to_string(), "a".to_string()]));
        assert!(cycles.contains(&vec!["c".to_string(), "c".to_string()]));
    }

    #[test]
    fn test_structural_errors_stop_before_references() {
        let workflow = WorkflowDefinition::new("", "", "missing")
            .with_step(WorkflowStep::new("a", ""))
            .with_step(WorkflowStep::new("a", "echo").with_retry_policy(RetryPolicy::new(0, 10)));

        let report = validate(&workflow);

        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("Workflow name is required")));
        assert!(report.errors.iter().any(|e| e.contains("Step tool is required")));
        assert!(report.errors.iter().any(|e| e.contains("maxAttempts")));
        assert!(report.errors.iter().any(|e| e == "Duplicate step id 'a'"));
        assert!(!report.errors.iter().any(|e| e.contains("Start step")));
    }

    #[test]
    fn test_empty_steps() {
        let report = validate(&WorkflowDefinition::new("wf", "Workflow", "a"));

        assert!(report.errors.iter().any(|e| e.contains("at least one step")));
    }

    #[test]
    fn test_invalid_condition_is_structural() {
        let workflow = WorkflowDefinition::new("wf", "Workflow", "a").with_step(
            WorkflowStep::new("a", "echo").with_condition(StepCondition::expression("require('fs')")),
        );

        let report = validate(&workflow);

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Step 'a' has an invalid condition"));
    }

    #[test]
    fn test_deeply_nested_condition_is_reported() {
        let source = format!("{}x", "!".repeat(200_000));
        let workflow = WorkflowDefinition::new("wf", "Workflow", "a")
            .with_step(WorkflowStep::new("a", "echo").with_condition(StepCondition::expression(source)));

        let report = validate(&workflow);

        assert!(!report.valid);
        assert!(report.errors[0].starts_with("Step 'a' has an invalid condition"));
    }

    #[test]
    fn test_validate_value_shape_error() {
        let (definition, report) = validate_value(&json!({"id": "wf", "steps": "nope"}));

        assert!(definition.is_none());
        assert!(!report.valid);
        assert!(report.errors[0].starts_with("Invalid workflow definition"));
    }
}
