//! Wire syntax for start/stop gating expressions.
//!
//! An expression arrives as a JSON array of clauses. Each clause is either a
//! combinator (`{"and": [...]}`, `{"or": [...]}`), a container state test
//! (`{"type": "container", "concept": ..., "state": "full" | "empty"}`), or an
//! activity completion test (`{"type": "activity", "state": "done",
//! "ID" | "name": ...}`). Multiple top-level clauses are an implicit "and".
//!
//! All structural validation happens here, at parse time. Whether the named
//! concepts and activities exist is checked later, when the engine resolves
//! the parsed tree against its registry.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parsed gating expression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ExprSpec {
    /// Every branch must hold.
    All(Vec<ExprSpec>),
    /// At least one branch must hold.
    Any(Vec<ExprSpec>),
    /// A named concept's container reaches full or empty.
    ContainerState {
        concept: String,
        state: ContainerStateKind,
        subcontainer: String,
    },
    /// A registered activity finishes.
    ActivityDone(ActivityRef),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStateKind {
    Full,
    Empty,
}

/// How an activity clause names its target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActivityRef {
    ById(String),
    ByName(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionError {
    NotAnArray,
    Empty,
    ClauseNotAnObject,
    /// A combinator clause carried extra keys next to "and"/"or".
    CombinatorWithExtraKeys(String),
    UnknownClause(String),
    MissingKey { clause: &'static str, key: &'static str },
    KeyNotAString { clause: &'static str, key: &'static str },
    UnknownType(String),
    UnknownContainerState(String),
    UnknownActivityState(String),
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnArray => write!(f, "expression must be a JSON array of clauses"),
            Self::Empty => write!(f, "expression contains no clauses"),
            Self::ClauseNotAnObject => write!(f, "expression clause must be a JSON object"),
            Self::CombinatorWithExtraKeys(key) => {
                write!(f, "combinator clause '{key}' must be the only key in its object")
            }
            Self::UnknownClause(keys) => {
                write!(f, "clause with keys [{keys}] is not a recognized expression form")
            }
            Self::MissingKey { clause, key } => {
                write!(f, "{clause} clause is missing required key '{key}'")
            }
            Self::KeyNotAString { clause, key } => {
                write!(f, "{clause} clause key '{key}' must be a string")
            }
            Self::UnknownType(ty) => write!(f, "unknown clause type '{ty}'"),
            Self::UnknownContainerState(state) => {
                write!(f, "container state must be 'full' or 'empty', got '{state}'")
            }
            Self::UnknownActivityState(state) => {
                write!(f, "activity state must be 'done', got '{state}'")
            }
        }
    }
}

impl std::error::Error for ExpressionError {}

/// Default sub-container targeted when a container clause names none.
pub const DEFAULT_SUBCONTAINER: &str = "default";

/// Parses a wire-form expression into an [`ExprSpec`].
///
/// A single-clause array parses to that clause; multiple clauses become an
/// implicit [`ExprSpec::All`].
pub fn parse_expression(value: &Value) -> Result<ExprSpec, ExpressionError> {
    let clauses = value.as_array().ok_or(ExpressionError::NotAnArray)?;
    if clauses.is_empty() {
        return Err(ExpressionError::Empty);
    }
    let mut parsed = Vec::with_capacity(clauses.len());
    for clause in clauses {
        parsed.push(parse_clause(clause)?);
    }
    if parsed.len() == 1 {
        Ok(parsed.remove(0))
    } else {
        Ok(ExprSpec::All(parsed))
    }
}

fn parse_clause(clause: &Value) -> Result<ExprSpec, ExpressionError> {
    let object = clause.as_object().ok_or(ExpressionError::ClauseNotAnObject)?;

    for combinator in ["and", "or"] {
        if let Some(branches) = object.get(combinator) {
            if object.len() > 1 {
                return Err(ExpressionError::CombinatorWithExtraKeys(
                    combinator.to_string(),
                ));
            }
            let branches = parse_branches(branches)?;
            return Ok(if combinator == "and" {
                ExprSpec::All(branches)
            } else {
                ExprSpec::Any(branches)
            });
        }
    }

    if let Some(ty) = object.get("type") {
        let ty = ty.as_str().ok_or(ExpressionError::KeyNotAString {
            clause: "typed",
            key: "type",
        })?;
        return match ty {
            "container" => parse_container_clause(object),
            "activity" => parse_activity_clause(object),
            other => Err(ExpressionError::UnknownType(other.to_string())),
        };
    }

    let keys = object.keys().cloned().collect::<Vec<_>>().join(", ");
    Err(ExpressionError::UnknownClause(keys))
}

fn parse_branches(branches: &Value) -> Result<Vec<ExprSpec>, ExpressionError> {
    let branches = branches.as_array().ok_or(ExpressionError::NotAnArray)?;
    if branches.is_empty() {
        return Err(ExpressionError::Empty);
    }
    branches.iter().map(parse_clause).collect()
}

fn parse_container_clause(
    object: &serde_json::Map<String, Value>,
) -> Result<ExprSpec, ExpressionError> {
    let concept = require_str(object, "container", "concept")?;
    let state = require_str(object, "container", "state")?;
    let state = match state {
        "full" => ContainerStateKind::Full,
        "empty" => ContainerStateKind::Empty,
        other => return Err(ExpressionError::UnknownContainerState(other.to_string())),
    };
    let subcontainer = match object.get("subcontainer") {
        Some(value) => value
            .as_str()
            .ok_or(ExpressionError::KeyNotAString {
                clause: "container",
                key: "subcontainer",
            })?
            .to_string(),
        None => DEFAULT_SUBCONTAINER.to_string(),
    };
    Ok(ExprSpec::ContainerState {
        concept: concept.to_string(),
        state,
        subcontainer,
    })
}

fn parse_activity_clause(
    object: &serde_json::Map<String, Value>,
) -> Result<ExprSpec, ExpressionError> {
    let state = require_str(object, "activity", "state")?;
    if state != "done" {
        return Err(ExpressionError::UnknownActivityState(state.to_string()));
    }
    if let Some(id) = object.get("ID") {
        let id = id.as_str().ok_or(ExpressionError::KeyNotAString {
            clause: "activity",
            key: "ID",
        })?;
        return Ok(ExprSpec::ActivityDone(ActivityRef::ById(id.to_string())));
    }
    if let Some(name) = object.get("name") {
        let name = name.as_str().ok_or(ExpressionError::KeyNotAString {
            clause: "activity",
            key: "name",
        })?;
        return Ok(ExprSpec::ActivityDone(ActivityRef::ByName(name.to_string())));
    }
    Err(ExpressionError::MissingKey {
        clause: "activity",
        key: "ID or name",
    })
}

fn require_str<'a>(
    object: &'a serde_json::Map<String, Value>,
    clause: &'static str,
    key: &'static str,
) -> Result<&'a str, ExpressionError> {
    object
        .get(key)
        .ok_or(ExpressionError::MissingKey { clause, key })?
        .as_str()
        .ok_or(ExpressionError::KeyNotAString { clause, key })
}
