use contracts::LogState;
use haulsim_runtime::Halt;

use super::Activity;

/// Fixed-duration body: START, hold for the duration, STOP, with every entry
/// mirrored to the auxiliary logs.
pub(super) async fn run(activity: &Activity, duration: f64) -> Result<(), Halt> {
    activity.record_all(LogState::Start);
    activity.env().timeout(duration).wait().await;
    activity.record_all(LogState::Stop);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::activity::ActivityBuilder;
    use crate::log::ActivityLog;
    use crate::registry::Registry;
    use contracts::{ActivityPhase, LogState};
    use haulsim_runtime::Env;

    #[test]
    fn basic_activity_logs_start_and_stop_around_its_duration() {
        let env = Env::new();
        let registry = Registry::new();
        let report = ActivityLog::new();
        let activity = ActivityBuilder::new(&env, &registry, "survey")
            .mirror_log(&report)
            .basic(42.0)
            .unwrap();
        activity.schedule().unwrap();
        env.run().unwrap();

        assert_eq!(env.now(), 42.0);
        assert_eq!(activity.phase(), ActivityPhase::Done);
        let entries = activity.log().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].state, entries[0].timestamp), (LogState::Start, 0.0));
        assert_eq!((entries[1].state, entries[1].timestamp), (LogState::Stop, 42.0));
        // mirrored one-for-one into the auxiliary log
        assert_eq!(report.entries(), entries);
    }

    #[test]
    fn gated_basic_activity_waits_for_its_start_expression() {
        let env = Env::new();
        let registry = Registry::new();
        let first = ActivityBuilder::new(&env, &registry, "prepare")
            .basic(30.0)
            .unwrap();
        let gated = ActivityBuilder::new(&env, &registry, "execute")
            .start_when(contracts::ExprSpec::ActivityDone(
                contracts::ActivityRef::ByName("prepare".to_string()),
            ))
            .basic(5.0)
            .unwrap();
        first.schedule().unwrap();
        gated.schedule().unwrap();
        env.run().unwrap();

        assert_eq!(env.now(), 35.0);
        let states: Vec<LogState> = gated.log().entries().iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![
                LogState::WaitStart,
                LogState::WaitStop,
                LogState::Start,
                LogState::Stop,
            ]
        );
    }
}
