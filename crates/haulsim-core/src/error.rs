use std::fmt;

use contracts::ExpressionError;
use haulsim_runtime::Halt;

/// A defect in how the simulation was assembled. Raised at construction or
/// schedule time, before the clock moves.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Expression(ExpressionError),
    UnknownConcept(String),
    UnknownActivity(String),
    DuplicateActivityId(String),
    ChildNotPostponed { parent: String, child: String },
    InvalidSubContainer { id: String, reason: String },
    InfeasibleReservation {
        activity: String,
        subcontainer: String,
        amount: f64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression(err) => write!(f, "invalid expression: {err}"),
            Self::UnknownConcept(name) => {
                write!(f, "expression references unregistered concept '{name}'")
            }
            Self::UnknownActivity(reference) => {
                write!(f, "expression references unregistered activity '{reference}'")
            }
            Self::DuplicateActivityId(id) => {
                write!(f, "activity id '{id}' is already registered")
            }
            Self::ChildNotPostponed { parent, child } => {
                write!(
                    f,
                    "composite activity '{parent}' requires postponed children, \
                     but '{child}' schedules itself"
                )
            }
            Self::InvalidSubContainer { id, reason } => {
                write!(f, "sub-container '{id}' is invalid: {reason}")
            }
            Self::InfeasibleReservation {
                activity,
                subcontainer,
                amount,
            } => {
                write!(
                    f,
                    "activity '{activity}' cannot reserve {amount} on \
                     sub-container '{subcontainer}'; the plan is infeasible"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ExpressionError> for ConfigError {
    fn from(value: ExpressionError) -> Self {
        Self::Expression(value)
    }
}

/// A failure detected while the clock is running. Converted into a runtime
/// [`Halt`] that aborts the run with a descriptive message.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    TransferAttemptsExhausted {
        activity: String,
        attempts: usize,
    },
    ZeroTransferAmount {
        activity: String,
        origin_level: f64,
        destination_free: f64,
    },
    RepetitionLimit {
        activity: String,
        limit: usize,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferAttemptsExhausted { activity, attempts } => {
                write!(
                    f,
                    "activity '{activity}' gave up after {attempts} transfer attempts; \
                     origin and destination never became simultaneously available"
                )
            }
            Self::ZeroTransferAmount {
                activity,
                origin_level,
                destination_free,
            } => {
                write!(
                    f,
                    "activity '{activity}' has nothing to transfer \
                     (origin level {origin_level}, destination free space {destination_free})"
                )
            }
            Self::RepetitionLimit { activity, limit } => {
                write!(
                    f,
                    "activity '{activity}' exceeded {limit} repetitions without \
                     its stop condition firing"
                )
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<EngineError> for Halt {
    fn from(value: EngineError) -> Self {
        Halt::new(value.to_string())
    }
}
