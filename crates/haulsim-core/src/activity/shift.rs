use std::rc::Rc;

use contracts::LogState;
use haulsim_runtime::Halt;

use crate::entity::StorageSite;
use crate::error::EngineError;
use crate::processor::{ShiftTiming, Transfer};

use super::{Activity, MAX_TRANSFER_ATTEMPTS};

/// ShiftAmount body: fix the transferable amount, claim the three resources,
/// run the hooks around the processor transfer, release.
///
/// The amount is capped by what the origin holds and the destination can
/// still take at the moment the body starts; a cap of zero means the model
/// asked for an impossible shift, which aborts the run.
pub(super) async fn run(
    activity: &Activity,
    processor: Rc<dyn StorageSite>,
    origin: Rc<dyn StorageSite>,
    destination: Rc<dyn StorageSite>,
    requested: Option<f64>,
    timing: ShiftTiming,
    subcontainer: String,
) -> Result<(), Halt> {
    let amount = transferable_amount(&*origin, &*destination, requested, &subcontainer);
    if amount <= 0.0 {
        return Err(EngineError::ZeroTransferAmount {
            activity: activity.name().to_string(),
            origin_level: origin.container().level(&subcontainer),
            destination_free: destination.container().free_space(&subcontainer),
        }
        .into());
    }

    let ledger = activity.ledger();
    // one concept may play several roles; the ledger deduplicates by id
    ledger.request(destination.resource()).await;
    ledger.request(origin.resource()).await;
    ledger.request(processor.resource()).await;

    activity.run_pre_hooks().await?;
    activity.record_all(LogState::Start);

    let transfer = Transfer {
        env: activity.env().clone(),
        activity_id: activity.id().to_string(),
        activity_name: activity.name().to_string(),
        processor: processor.clone(),
        origin: origin.clone(),
        destination: destination.clone(),
        subcontainer,
        amount,
        timing,
        max_attempts: MAX_TRANSFER_ATTEMPTS,
    };
    transfer.run().await?;

    activity.record_all(LogState::Stop);
    activity.run_post_hooks()?;

    let keep = activity.keep_resources();
    ledger.release(destination.resource(), keep);
    ledger.release(origin.resource(), keep);
    ledger.release(processor.resource(), keep);
    Ok(())
}

fn transferable_amount(
    origin: &dyn StorageSite,
    destination: &dyn StorageSite,
    requested: Option<f64>,
    subcontainer: &str,
) -> f64 {
    let available = origin
        .container()
        .level(subcontainer)
        .min(destination.container().free_space(subcontainer));
    match requested {
        Some(amount) => amount.min(available),
        None => available,
    }
}
