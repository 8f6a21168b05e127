//! Discrete-event simulation engine for resource-constrained transport and
//! processing operations: vessels and sites with level/capacity containers,
//! exclusive resources, and composable activities (basic, move, shift,
//! sequential, while) driven by gating expressions over container and
//! activity state.
//!
//! Time advancement itself lives in `haulsim-runtime`; the shared data
//! contracts (log entries, lifecycle phases, expression syntax) in
//! `contracts`.

pub mod activity;
pub mod container;
pub mod entity;
pub mod error;
pub mod expression;
pub mod log;
pub mod model;
pub mod plugins;
pub mod processor;
pub mod registry;
pub mod reservations;
pub mod resource_gate;

pub use activity::{Activity, ActivityBuilder, DEFAULT_MAX_ITERATIONS};
pub use container::EventContainer;
pub use entity::{
    Concept, HasContainer, HasResource, Locatable, Loggable, Movable, Mover, Site, StorageSite,
    Vessel,
};
pub use error::{ConfigError, EngineError};
pub use expression::{resolve_expression, validate_expression};
pub use log::ActivityLog;
pub use model::{register_processes, single_run_process, SingleRun};
pub use plugins::{delay_processing, ActivityPlugin, HoldPlugin};
pub use processor::{ShiftTiming, Transfer, TransferRate, MAX_TRANSFER_ATTEMPTS};
pub use registry::Registry;
pub use reservations::reserve_sub_processes;
pub use resource_gate::RequestLedger;
