use futures::future::LocalBoxFuture;
use futures::FutureExt;

use contracts::LogState;
use haulsim_runtime::{Env, Halt};

use crate::log::ActivityLog;

/// Hook pair run around an activity body.
///
/// `pre_process` may suspend (wait on events, timeouts); `post_process` is
/// synchronous bookkeeping and must not. Plugins run in ascending priority
/// order; equal priorities keep their registration order.
pub trait ActivityPlugin {
    fn priority(&self) -> i32 {
        0
    }

    fn pre_process<'a>(
        &'a self,
        env: &'a Env,
        activity_id: &'a str,
        log: &'a ActivityLog,
    ) -> LocalBoxFuture<'a, Result<(), Halt>> {
        let _ = (env, activity_id, log);
        async { Ok(()) }.boxed_local()
    }

    fn post_process(&self, env: &Env, activity_id: &str, log: &ActivityLog) -> Result<(), Halt> {
        let _ = (env, activity_id, log);
        Ok(())
    }
}

/// Suspends for `delay` seconds, bracketing the hold with a wait pair in the
/// activity log.
pub async fn delay_processing(env: &Env, log: &ActivityLog, activity_id: &str, delay: f64) {
    log.record(env.now(), activity_id, LogState::WaitStart);
    env.timeout(delay).wait().await;
    log.record(env.now(), activity_id, LogState::WaitStop);
}

/// Plugin that holds an activity before its body runs, e.g. to model a
/// permit or weather window delay.
pub struct HoldPlugin {
    pub delay: f64,
    pub priority: i32,
}

impl ActivityPlugin for HoldPlugin {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn pre_process<'a>(
        &'a self,
        env: &'a Env,
        activity_id: &'a str,
        log: &'a ActivityLog,
    ) -> LocalBoxFuture<'a, Result<(), Halt>> {
        async move {
            delay_processing(env, log, activity_id, self.delay).await;
            Ok(())
        }
        .boxed_local()
    }
}
