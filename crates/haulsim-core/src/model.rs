//! Prefabricated activity assemblies.
//!
//! `single_run_process` wires the canonical haul cycle (sail empty, load,
//! sail filled, unload) into a Sequential inside a While that repeats until
//! the origin drains or the destination fills.

use std::rc::Rc;

use contracts::{ContainerStateKind, ExprSpec, TransferPhase};
use haulsim_runtime::{Env, Process};

use crate::activity::{Activity, ActivityBuilder};
use crate::entity::{Mover, StorageSite};
use crate::error::ConfigError;
use crate::processor::{ShiftTiming, TransferRate};
use crate::registry::Registry;
use crate::resource_gate::RequestLedger;

/// Handles to the pieces of one assembled haul cycle.
pub struct SingleRun {
    /// The four leg activities, in execution order.
    pub legs: Vec<Activity>,
    /// The Sequential wrapping the legs.
    pub sequence: Activity,
    /// The While driving the sequence; this is the activity to schedule.
    pub cycle: Activity,
}

/// Schedules every activity in the slice, validating expression references
/// first. The returned processes complete when the respective activity does.
pub fn register_processes(activities: &[Activity]) -> Result<Vec<Process>, ConfigError> {
    activities.iter().map(Activity::schedule).collect()
}

/// Assembles a repeated haul cycle moving material from `origin` to
/// `destination` with `mover`, loaded by `loader` and unloaded by `unloader`
/// (all three may be the same vessel).
///
/// Without an explicit stop condition the cycle ends when the origin is
/// empty or the destination is full. The legs share one resource ledger, so
/// a berth or vessel claimed by one leg is handed to the next without a
/// release/re-request gap.
#[allow(clippy::too_many_arguments)]
pub fn single_run_process(
    env: &Env,
    registry: &Registry,
    name: &str,
    origin: Rc<dyn StorageSite>,
    destination: Rc<dyn StorageSite>,
    mover: Rc<dyn Mover>,
    loader: Rc<dyn StorageSite>,
    unloader: Rc<dyn StorageSite>,
    loading: TransferRate,
    unloading: TransferRate,
    start_condition: Option<ExprSpec>,
    stop_condition: Option<ExprSpec>,
) -> Result<SingleRun, ConfigError> {
    let stop = stop_condition.unwrap_or_else(|| {
        ExprSpec::Any(vec![
            ExprSpec::ContainerState {
                concept: origin.name().to_string(),
                state: ContainerStateKind::Empty,
                subcontainer: "default".to_string(),
            },
            ExprSpec::ContainerState {
                concept: destination.name().to_string(),
                state: ContainerStateKind::Full,
                subcontainer: "default".to_string(),
            },
        ])
    });

    let ledger = RequestLedger::new();
    let legs = vec![
        ActivityBuilder::new(env, registry, format!("{name} sailing empty"))
            .postponed()
            .ledger(&ledger)
            .moving(mover.clone(), origin.clone())?,
        ActivityBuilder::new(env, registry, format!("{name} loading"))
            .postponed()
            .ledger(&ledger)
            .shift_amount(
                loader,
                origin,
                mover.clone() as Rc<dyn StorageSite>,
                None,
                ShiftTiming::Rated {
                    phase: TransferPhase::Loading,
                    rate: loading,
                },
            )?,
        ActivityBuilder::new(env, registry, format!("{name} sailing filled"))
            .postponed()
            .ledger(&ledger)
            .moving(mover.clone(), destination.clone())?,
        ActivityBuilder::new(env, registry, format!("{name} unloading"))
            .postponed()
            .ledger(&ledger)
            .shift_amount(
                unloader,
                mover as Rc<dyn StorageSite>,
                destination,
                None,
                ShiftTiming::Rated {
                    phase: TransferPhase::Unloading,
                    rate: unloading,
                },
            )?,
    ];

    let sequence = ActivityBuilder::new(env, registry, format!("{name} sequence"))
        .postponed()
        .ledger(&ledger)
        .sequential(legs.clone())?;

    let mut cycle = ActivityBuilder::new(env, registry, name).ledger(&ledger);
    if let Some(start) = start_condition {
        cycle = cycle.start_when(start);
    }
    let cycle = cycle.while_loop(sequence.clone(), stop)?;

    Ok(SingleRun {
        legs,
        sequence,
        cycle,
    })
}
