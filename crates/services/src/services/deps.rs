//! Execution ordering for a task's implementation plan.
//!
//! Depth-first topological sort over the subtask dependency graph.
//! Deterministic: subtasks are visited in input order and dependencies in
//! listed order, so equal inputs always produce equal orderings.

use std::collections::HashMap;

use db::models::subtask::DiscreteSubtask;
use thiserror::Error;

/// What to do with a dependency id that names no subtask in the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownDeps {
    /// Skip it. Plans parsed from free text routinely reference steps the
    /// agent merged away.
    #[default]
    Ignore,
    /// Fail resolution.
    Error,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("circular dependency detected at subtask '{id}'")]
    CircularDependency { id: String },
    #[error("subtask '{id}' depends on unknown subtask '{dependency}'")]
    UnknownDependency { id: String, dependency: String },
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Order subtask ids so every dependency precedes its dependents.
pub fn resolve_order(
    subtasks: &[DiscreteSubtask],
    policy: UnknownDeps,
) -> Result<Vec<String>, DependencyError> {
    let index: HashMap<&str, &DiscreteSubtask> =
        subtasks.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut order = Vec::with_capacity(subtasks.len());

    for subtask in subtasks {
        visit(subtask.id.as_str(), &index, &mut marks, &mut order, policy)?;
    }
    Ok(order)
}

fn visit<'a>(
    id: &'a str,
    index: &HashMap<&'a str, &'a DiscreteSubtask>,
    marks: &mut HashMap<&'a str, Mark>,
    order: &mut Vec<String>,
    policy: UnknownDeps,
) -> Result<(), DependencyError> {
    match marks.get(id) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            return Err(DependencyError::CircularDependency { id: id.to_string() });
        }
        None => {}
    }
    let Some(subtask) = index.get(id) else {
        return Ok(());
    };

    marks.insert(id, Mark::Visiting);
    for dependency in &subtask.depends_on {
        if index.contains_key(dependency.as_str()) {
            visit(dependency.as_str(), index, marks, order, policy)?;
        } else if policy == UnknownDeps::Error {
            return Err(DependencyError::UnknownDependency {
                id: id.to_string(),
                dependency: dependency.clone(),
            });
        }
    }
    marks.insert(id, Mark::Done);
    order.push(id.to_string());
    Ok(())
}
