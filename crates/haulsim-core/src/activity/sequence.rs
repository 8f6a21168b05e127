use contracts::LogState;
use haulsim_runtime::Halt;

use super::Activity;

/// Runs the children in order, each bracketed by a labeled "sub process"
/// entry on the parent's log.
///
/// The zero-duration timeout after each child lets the scheduler process
/// events the child left triggered-but-unhandled before the next child
/// starts; dropping it changes interleaving order under contention.
pub(super) async fn run(parent: &Activity, children: &[Activity]) -> Result<(), Halt> {
    let label = format!("sequential {}", parent.name());
    parent.record_all_labeled(LogState::Start, &label);
    for child in children {
        run_child(parent, child).await?;
    }
    parent.record_all_labeled(LogState::Stop, &label);
    Ok(())
}

pub(super) async fn run_child(parent: &Activity, child: &Activity) -> Result<(), Halt> {
    let label = format!("sub process {}", child.name());
    parent.record_all_labeled(LogState::Start, &label);
    child.run_inline().await?;
    parent.env().timeout(0.0).wait().await;
    parent.record_all_labeled(LogState::Stop, &label);
    Ok(())
}
