//! Pre-run feasibility check for composite plans.
//!
//! Walks an activity tree and posts get/put reservations for every
//! ShiftAmount child that names a fixed amount, so a plan whose combined
//! demands cannot fit is rejected before the clock moves instead of
//! deadlocking mid-run.

use crate::activity::{Activity, ActivityKind};
use crate::error::ConfigError;

/// Reserves the fixed shift amounts of every ShiftAmount descendant of
/// `activity`. A reservation that does not fit is a configuration error; the
/// reservations already posted for earlier children stay in place so callers
/// can inspect the planned levels.
pub fn reserve_sub_processes(activity: &Activity) -> Result<(), ConfigError> {
    match activity.kind() {
        ActivityKind::Sequential { children } => {
            for child in children {
                reserve_sub_processes(child)?;
            }
            Ok(())
        }
        ActivityKind::While { child, .. } => reserve_sub_processes(child),
        ActivityKind::ShiftAmount {
            origin,
            destination,
            requested: Some(amount),
            subcontainer,
            ..
        } => {
            if !origin
                .container()
                .reserve_get(subcontainer, *amount, activity.id())
            {
                return Err(infeasible(activity, subcontainer, *amount));
            }
            if !destination
                .container()
                .reserve_put(subcontainer, *amount, activity.id())
            {
                return Err(infeasible(activity, subcontainer, *amount));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn infeasible(activity: &Activity, subcontainer: &str, amount: f64) -> ConfigError {
    ConfigError::InfeasibleReservation {
        activity: activity.name().to_string(),
        subcontainer: subcontainer.to_string(),
        amount,
    }
}
