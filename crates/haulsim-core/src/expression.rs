//! Resolution of parsed gating expressions into live runtime events.
//!
//! Structural validation already happened in the contracts crate; here the
//! named concepts and activities are looked up in the registry, and a dangling
//! reference is a configuration error raised before the expression is ever
//! awaited.

use contracts::{ActivityRef, ContainerStateKind, ExprSpec};
use haulsim_runtime::{Env, Event};

use crate::error::ConfigError;
use crate::registry::Registry;

/// Checks that every concept and activity the expression names exists,
/// without creating any events.
pub fn validate_expression(registry: &Registry, expr: &ExprSpec) -> Result<(), ConfigError> {
    match expr {
        ExprSpec::All(branches) | ExprSpec::Any(branches) => {
            for branch in branches {
                validate_expression(registry, branch)?;
            }
            Ok(())
        }
        ExprSpec::ContainerState { concept, .. } => {
            registry
                .concept(concept)
                .map(|_| ())
                .ok_or_else(|| ConfigError::UnknownConcept(concept.clone()))
        }
        ExprSpec::ActivityDone(ActivityRef::ById(id)) => registry
            .activity_by_id(id)
            .map(|_| ())
            .ok_or_else(|| ConfigError::UnknownActivity(id.clone())),
        ExprSpec::ActivityDone(ActivityRef::ByName(name)) => {
            if registry.activities_named(name).is_empty() {
                Err(ConfigError::UnknownActivity(name.clone()))
            } else {
                Ok(())
            }
        }
    }
}

/// Compiles the expression into an event that fires when it holds.
///
/// An ambiguous activity name fans out to an implicit join over every
/// registered match.
pub fn resolve_expression(
    env: &Env,
    registry: &Registry,
    expr: &ExprSpec,
) -> Result<Event, ConfigError> {
    match expr {
        ExprSpec::All(branches) => {
            let events = resolve_branches(env, registry, branches)?;
            Ok(env.all_of(&events))
        }
        ExprSpec::Any(branches) => {
            let events = resolve_branches(env, registry, branches)?;
            Ok(env.any_of(&events))
        }
        ExprSpec::ContainerState {
            concept,
            state,
            subcontainer,
        } => {
            let container = registry
                .concept(concept)
                .ok_or_else(|| ConfigError::UnknownConcept(concept.clone()))?;
            Ok(match state {
                ContainerStateKind::Full => container.full_event(subcontainer, None),
                ContainerStateKind::Empty => container.empty_event(subcontainer, None),
            })
        }
        ExprSpec::ActivityDone(ActivityRef::ById(id)) => {
            let activity = registry
                .activity_by_id(id)
                .ok_or_else(|| ConfigError::UnknownActivity(id.clone()))?;
            Ok(activity.done_event())
        }
        ExprSpec::ActivityDone(ActivityRef::ByName(name)) => {
            let matches = registry.activities_named(name);
            if matches.is_empty() {
                return Err(ConfigError::UnknownActivity(name.clone()));
            }
            if matches.len() == 1 {
                return Ok(matches[0].done_event());
            }
            let events: Vec<Event> = matches.iter().map(|a| a.done_event()).collect();
            Ok(env.all_of(&events))
        }
    }
}

fn resolve_branches(
    env: &Env,
    registry: &Registry,
    branches: &[ExprSpec],
) -> Result<Vec<Event>, ConfigError> {
    branches
        .iter()
        .map(|branch| resolve_expression(env, registry, branch))
        .collect()
}
