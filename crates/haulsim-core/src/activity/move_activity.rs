use std::rc::Rc;

use contracts::LogState;
use haulsim_runtime::Halt;

use crate::entity::{Mover, StorageSite};

use super::Activity;

/// Move body: claim the mover, run the pre-hooks, sail to the destination,
/// run the post-hooks, release the mover (unless kept).
///
/// The movement itself is recorded on the mover's own log, labeled with the
/// leg description, so a vessel's trace reads as a sequence of sailings and
/// transfers.
pub(super) async fn run(
    activity: &Activity,
    mover: Rc<dyn Mover>,
    destination: Rc<dyn StorageSite>,
) -> Result<(), Halt> {
    let ledger = activity.ledger();
    ledger.request(mover.resource()).await;

    activity.run_pre_hooks().await?;

    let label = format!(
        "move {} of {} to {}",
        activity.name(),
        mover.name(),
        destination.name()
    );
    let env = activity.env();
    activity.record_all(LogState::Start);
    mover
        .log()
        .record_labeled(env.now(), activity.id(), LogState::Start, &label);

    let duration = mover.movement_duration(destination.position());
    env.timeout(duration).wait().await;
    mover.relocate(destination.position());

    activity.run_post_hooks()?;

    ledger.release(mover.resource(), activity.keep_resources());
    mover
        .log()
        .record_labeled(env.now(), activity.id(), LogState::Stop, &label);
    activity.record_all(LogState::Stop);
    Ok(())
}
