use std::rc::Rc;

use contracts::{LogState, TransferPhase};
use haulsim_runtime::{Env, Halt};

use crate::container::EventContainer;
use crate::entity::StorageSite;
use crate::error::EngineError;
use crate::log::ActivityLog;

/// Attempts a transfer makes before concluding no progress is possible.
pub const MAX_TRANSFER_ATTEMPTS: usize = 200;

/// How transfer duration is derived from the amount moved.
#[derive(Clone)]
pub enum TransferRate {
    /// `amount / rate` plus a fixed manoeuvring overhead.
    Constant {
        rate: f64,
        manoeuvring_minutes: f64,
    },
    /// Duration from the level before and after the transfer, measured on
    /// the container in the transfer direction: the destination when
    /// loading, the origin when unloading.
    Curve(Rc<dyn Fn(f64, f64) -> f64>),
}

impl TransferRate {
    pub fn constant(rate: f64) -> Self {
        Self::Constant {
            rate,
            manoeuvring_minutes: 0.0,
        }
    }

    fn duration(
        &self,
        phase: TransferPhase,
        amount: f64,
        origin: &EventContainer,
        destination: &EventContainer,
        subcontainer: &str,
    ) -> f64 {
        match self {
            Self::Constant {
                rate,
                manoeuvring_minutes,
            } => amount / rate + manoeuvring_minutes * 60.0,
            Self::Curve(curve) => match phase {
                TransferPhase::Loading => {
                    let before = destination.level(subcontainer);
                    curve(before, before + amount)
                }
                TransferPhase::Unloading => {
                    let before = origin.level(subcontainer);
                    curve(before, before - amount)
                }
            },
        }
    }
}

/// Timing rule for one shift: a fixed duration, or a rate applied in a
/// transfer direction.
#[derive(Clone)]
pub enum ShiftTiming {
    FixedDuration(f64),
    Rated {
        phase: TransferPhase,
        rate: TransferRate,
    },
}

impl ShiftTiming {
    fn duration(
        &self,
        amount: f64,
        origin: &EventContainer,
        destination: &EventContainer,
        subcontainer: &str,
    ) -> f64 {
        match self {
            Self::FixedDuration(duration) => *duration,
            Self::Rated { phase, rate } => {
                rate.duration(*phase, amount, origin, destination, subcontainer)
            }
        }
    }
}

/// One transfer commit between two storage sites, driven by a processor.
///
/// The amount is decided by the caller before the transfer starts and stays
/// fixed; the transfer then waits for that much material and space to exist
/// simultaneously. Deciding the amount up front is what makes the wait
/// meaningful when several transfers contend for one container.
pub struct Transfer {
    pub env: Env,
    pub activity_id: String,
    pub activity_name: String,
    pub processor: Rc<dyn StorageSite>,
    pub origin: Rc<dyn StorageSite>,
    pub destination: Rc<dyn StorageSite>,
    pub subcontainer: String,
    pub amount: f64,
    pub timing: ShiftTiming,
    pub max_attempts: usize,
}

impl Transfer {
    /// Runs the transfer: waits until origin material and destination space
    /// are simultaneously available, then takes, processes for the computed
    /// duration, and deposits.
    ///
    /// Availability can race away between the wait and the commit when other
    /// transfers share a container, so each attempt re-verifies with fresh
    /// level queries and yields one settle step before retrying. Running out
    /// of attempts aborts the run.
    pub async fn run(self) -> Result<(), Halt> {
        if self.amount <= 0.0 {
            return Err(EngineError::ZeroTransferAmount {
                activity: self.activity_name.clone(),
                origin_level: self.origin.container().level(&self.subcontainer),
                destination_free: self.destination.container().free_space(&self.subcontainer),
            }
            .into());
        }

        let logs = dedup_logs(&[
            self.processor.log(),
            self.origin.log(),
            self.destination.log(),
        ]);
        record_all(&logs, self.env.now(), &self.activity_id, LogState::Start);

        let wait_started = self.env.now();
        let mut attempts = 0;
        let mut waited_for_content = false;
        let mut waited_for_space = false;
        loop {
            let origin_ready = self
                .origin
                .container()
                .get_available(&self.subcontainer, self.amount);
            let destination_ready = self
                .destination
                .container()
                .put_available(&self.subcontainer, self.amount);
            waited_for_content |= !origin_ready.triggered();
            waited_for_space |= !destination_ready.triggered();
            self.env
                .all_of(&[origin_ready, destination_ready])
                .wait()
                .await;

            // fresh queries: a competing transfer may have moved material
            // since the availability events fired
            if self.origin.container().level(&self.subcontainer) >= self.amount
                && self.destination.container().free_space(&self.subcontainer) >= self.amount
            {
                break;
            }
            attempts += 1;
            if attempts >= self.max_attempts {
                return Err(EngineError::TransferAttemptsExhausted {
                    activity: self.activity_name.clone(),
                    attempts,
                }
                .into());
            }
            tracing::debug!(
                activity = %self.activity_name,
                attempts,
                "transfer availability raced away; retrying"
            );
            self.env.timeout(0.0).wait().await;
        }

        // contention shows up as labeled wait pairs on the processor's own
        // log; an instantaneous grant leaves no trace
        if self.env.now() > wait_started {
            let wait_stopped = self.env.now();
            let log = self.processor.log();
            if waited_for_content {
                let label = "waiting origin content";
                log.record_labeled(wait_started, &self.activity_id, LogState::WaitStart, label);
                log.record_labeled(wait_stopped, &self.activity_id, LogState::WaitStop, label);
            }
            if waited_for_space {
                let label = "waiting destination content";
                log.record_labeled(wait_started, &self.activity_id, LogState::WaitStart, label);
                log.record_labeled(wait_stopped, &self.activity_id, LogState::WaitStop, label);
            }
        }

        let duration = self.timing.duration(
            self.amount,
            self.origin.container(),
            self.destination.container(),
            &self.subcontainer,
        );
        self.origin
            .container()
            .get(&self.subcontainer, self.amount, &self.activity_id);
        self.env.timeout(duration).wait().await;
        self.destination
            .container()
            .put(&self.subcontainer, self.amount, &self.activity_id);

        record_all(&logs, self.env.now(), &self.activity_id, LogState::Stop);
        Ok(())
    }
}

pub(crate) fn dedup_logs(candidates: &[&ActivityLog]) -> Vec<ActivityLog> {
    let mut unique: Vec<ActivityLog> = Vec::new();
    for candidate in candidates {
        if !unique.iter().any(|log| log.same_log(candidate)) {
            unique.push((*candidate).clone());
        }
    }
    unique
}

fn record_all(logs: &[ActivityLog], timestamp: f64, activity_id: &str, state: LogState) {
    for log in logs {
        log.record(timestamp, activity_id, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{HasContainer, Loggable, Site};
    use crate::registry::Registry;
    use contracts::SubContainerSpec;

    fn site(env: &Env, registry: &Registry, name: &str, capacity: f64, level: f64) -> Rc<Site> {
        Rc::new(
            Site::new(
                env,
                registry,
                name,
                (0.0, 0.0),
                &[SubContainerSpec::new("default", capacity, level)],
            )
            .unwrap(),
        )
    }

    fn transfer_between(
        env: &Env,
        origin: Rc<Site>,
        destination: Rc<Site>,
        amount: f64,
        timing: ShiftTiming,
    ) -> Transfer {
        Transfer {
            env: env.clone(),
            activity_id: "act-1".to_string(),
            activity_name: "shift".to_string(),
            processor: origin.clone(),
            origin,
            destination,
            subcontainer: "default".to_string(),
            amount,
            timing,
            max_attempts: MAX_TRANSFER_ATTEMPTS,
        }
    }

    #[test]
    fn constant_rate_duration_includes_manoeuvring() {
        let rate = TransferRate::Constant {
            rate: 2.0,
            manoeuvring_minutes: 1.5,
        };
        let env = Env::new();
        let container = EventContainer::new(&env);
        let d = rate.duration(TransferPhase::Loading, 100.0, &container, &container, "default");
        assert_eq!(d, 50.0 + 90.0);
    }

    #[test]
    fn curve_sees_levels_in_the_transfer_direction() {
        let env = Env::new();
        let registry = Registry::new();
        let origin = site(&env, &registry, "from", 100.0, 60.0);
        let destination = site(&env, &registry, "to", 100.0, 10.0);
        let rate = TransferRate::Curve(Rc::new(|before, after| {
            // loading queries the destination: 10 -> 40
            assert_eq!((before, after), (10.0, 40.0));
            7.0
        }));
        let d = rate.duration(
            TransferPhase::Loading,
            30.0,
            origin.container(),
            destination.container(),
            "default",
        );
        assert_eq!(d, 7.0);

        let rate = TransferRate::Curve(Rc::new(|before, after| {
            // unloading queries the origin: 60 -> 30
            assert_eq!((before, after), (60.0, 30.0));
            9.0
        }));
        let d = rate.duration(
            TransferPhase::Unloading,
            30.0,
            origin.container(),
            destination.container(),
            "default",
        );
        assert_eq!(d, 9.0);
    }

    #[test]
    fn transfer_moves_material_and_takes_rated_time() {
        let env = Env::new();
        let registry = Registry::new();
        let origin = site(&env, &registry, "from", 100.0, 80.0);
        let destination = site(&env, &registry, "to", 100.0, 0.0);
        let transfer = transfer_between(
            &env,
            origin.clone(),
            destination.clone(),
            50.0,
            ShiftTiming::Rated {
                phase: TransferPhase::Loading,
                rate: TransferRate::constant(5.0),
            },
        );
        env.process(transfer.run());
        env.run().unwrap();
        assert_eq!(env.now(), 10.0);
        assert_eq!(origin.container().level("default"), 30.0);
        assert_eq!(destination.container().level("default"), 50.0);
        // origin log carries the shared START/STOP pair
        let states: Vec<LogState> = origin.log().entries().iter().map(|e| e.state).collect();
        assert_eq!(states, vec![LogState::Start, LogState::Stop]);
    }

    #[test]
    fn waiting_for_availability_logs_a_wait_pair() {
        let env = Env::new();
        let registry = Registry::new();
        let origin = site(&env, &registry, "from", 100.0, 0.0);
        let destination = site(&env, &registry, "to", 100.0, 0.0);

        // material for the committed amount only arrives at t=10
        let env_feed = env.clone();
        let origin_feed = origin.clone();
        env.process(async move {
            env_feed.timeout(10.0).wait().await;
            origin_feed.container().put("default", 20.0, "feeder");
            Ok(())
        });
        let transfer = transfer_between(
            &env,
            origin.clone(),
            destination.clone(),
            20.0,
            ShiftTiming::FixedDuration(5.0),
        );
        env.process(transfer.run());
        env.run().unwrap();

        // the processor (here the origin) carries the labeled wait pair
        let entries = origin.log().entries();
        let states: Vec<LogState> = entries.iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![
                LogState::Start,
                LogState::WaitStart,
                LogState::WaitStop,
                LogState::Stop,
            ]
        );
        assert_eq!(entries[1].label.as_deref(), Some("waiting origin content"));
        assert_eq!((entries[1].timestamp, entries[2].timestamp), (0.0, 10.0));
        // the destination had space all along: no wait pair on its log
        let destination_states: Vec<LogState> =
            destination.log().entries().iter().map(|e| e.state).collect();
        assert_eq!(destination_states, vec![LogState::Start, LogState::Stop]);
        assert_eq!(destination.container().level("default"), 20.0);
        assert_eq!(env.now(), 15.0);
    }

    #[test]
    fn raced_away_availability_is_retried_with_a_settle_step() {
        let env = Env::new();
        let registry = Registry::new();
        let origin = site(&env, &registry, "from", 100.0, 0.0);
        let destination = site(&env, &registry, "to", 100.0, 0.0);

        // two transfers wait for the same 20 units; the batch arriving at
        // t=5 wakes both, the first commits it, the second must retry and
        // wait for the t=8 batch
        for _ in 0..2 {
            let transfer = transfer_between(
                &env,
                origin.clone(),
                destination.clone(),
                20.0,
                ShiftTiming::FixedDuration(2.0),
            );
            env.process(transfer.run());
        }
        let env_feed = env.clone();
        let origin_feed = origin.clone();
        env.process(async move {
            env_feed.timeout(5.0).wait().await;
            origin_feed.container().put("default", 20.0, "feeder");
            env_feed.timeout(3.0).wait().await;
            origin_feed.container().put("default", 20.0, "feeder");
            Ok(())
        });
        env.run().unwrap();
        assert_eq!(destination.container().level("default"), 40.0);
        assert_eq!(origin.container().level("default"), 0.0);
        assert_eq!(env.now(), 10.0);
    }

    #[test]
    fn zero_amount_halts_the_run() {
        let env = Env::new();
        let registry = Registry::new();
        let origin = site(&env, &registry, "from", 100.0, 0.0);
        let destination = site(&env, &registry, "to", 100.0, 0.0);
        let transfer = transfer_between(
            &env,
            origin,
            destination,
            0.0,
            ShiftTiming::FixedDuration(1.0),
        );
        env.process(transfer.run());
        let err = env.run().unwrap_err();
        assert!(err.message.contains("nothing to transfer"));
    }
}
