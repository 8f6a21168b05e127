use contracts::{ExprSpec, LogState};
use haulsim_runtime::Halt;

use crate::error::EngineError;
use crate::expression::resolve_expression;

use super::{sequence, Activity};

/// Repeats the child until the stop condition fires, with the same per-child
/// mechanics as a sequence. The iteration bound is a safety valve for
/// malformed stop conditions, not a normal exit.
pub(super) async fn run(
    parent: &Activity,
    child: &Activity,
    condition: &ExprSpec,
    max_iterations: usize,
) -> Result<(), Halt> {
    let stop = resolve_expression(parent.env(), parent.registry(), condition)
        .map_err(|err| Halt::new(err.to_string()))?;
    let label = format!("conditional process {}", parent.name());
    parent.record_all_labeled(LogState::Start, &label);
    let mut iterations = 0;
    while !stop.triggered() {
        if iterations >= max_iterations {
            return Err(EngineError::RepetitionLimit {
                activity: parent.name().to_string(),
                limit: max_iterations,
            }
            .into());
        }
        sequence::run_child(parent, child).await?;
        iterations += 1;
    }
    parent.record_all_labeled(LogState::Stop, &label);
    Ok(())
}
