use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use contracts::SubContainerSpec;
use haulsim_runtime::{Env, Event};

use crate::error::ConfigError;

/// Material store with named sub-containers, threshold-wait events, and a
/// reservation ledger.
///
/// `get_available`/`put_available` hand out events that fire once the
/// requested amount (or free space) exists; waiters at the same threshold
/// share one event. Commits via `get`/`put` assert that availability was
/// confirmed beforehand, then satisfy the opposite side's waiters in
/// ascending threshold order, stopping at the first one that cannot be met.
///
/// Reservations are bookkeeping only: they never move material, and a failed
/// reservation leaves the ledger untouched.
#[derive(Clone)]
pub struct EventContainer {
    env: Env,
    inner: Rc<RefCell<BTreeMap<String, SubContainer>>>,
}

struct SubContainer {
    capacity: f64,
    level: f64,
    /// Signed planned deltas per activity id: puts positive, gets negative.
    reservations: BTreeMap<String, f64>,
    /// Pending threshold waits, kept sorted ascending by amount.
    get_waiters: Vec<Waiter>,
    put_waiters: Vec<Waiter>,
}

impl SubContainer {
    fn empty() -> Self {
        Self {
            capacity: 0.0,
            level: 0.0,
            reservations: BTreeMap::new(),
            get_waiters: Vec::new(),
            put_waiters: Vec::new(),
        }
    }

    fn free_space(&self) -> f64 {
        self.capacity - self.level
    }

    fn planned_level(&self) -> f64 {
        self.level + self.reservations.values().sum::<f64>()
    }
}

struct Waiter {
    amount: f64,
    event: Event,
}

impl EventContainer {
    pub fn new(env: &Env) -> Self {
        Self {
            env: env.clone(),
            inner: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }

    pub fn with_subcontainers(
        env: &Env,
        specs: &[SubContainerSpec],
    ) -> Result<Self, ConfigError> {
        let container = Self::new(env);
        for spec in specs {
            container.add_subcontainer(spec)?;
        }
        Ok(container)
    }

    pub fn add_subcontainer(&self, spec: &SubContainerSpec) -> Result<(), ConfigError> {
        if !spec.capacity.is_finite() || spec.capacity < 0.0 {
            return Err(ConfigError::InvalidSubContainer {
                id: spec.id.clone(),
                reason: format!("capacity {} must be finite and non-negative", spec.capacity),
            });
        }
        if !spec.level.is_finite() || spec.level < 0.0 || spec.level > spec.capacity {
            return Err(ConfigError::InvalidSubContainer {
                id: spec.id.clone(),
                reason: format!(
                    "level {} must lie within [0, {}]",
                    spec.level, spec.capacity
                ),
            });
        }
        let mut store = self.inner.borrow_mut();
        if store.contains_key(&spec.id) {
            return Err(ConfigError::InvalidSubContainer {
                id: spec.id.clone(),
                reason: "sub-container id already exists".to_string(),
            });
        }
        store.insert(
            spec.id.clone(),
            SubContainer {
                capacity: spec.capacity,
                level: spec.level,
                reservations: BTreeMap::new(),
                get_waiters: Vec::new(),
                put_waiters: Vec::new(),
            },
        );
        Ok(())
    }

    /// Unknown ids read as level 0.
    pub fn level(&self, id: &str) -> f64 {
        self.inner.borrow().get(id).map_or(0.0, |sub| sub.level)
    }

    /// Unknown ids read as capacity 0.
    pub fn capacity(&self, id: &str) -> f64 {
        self.inner.borrow().get(id).map_or(0.0, |sub| sub.capacity)
    }

    pub fn free_space(&self, id: &str) -> f64 {
        self.inner
            .borrow()
            .get(id)
            .map_or(0.0, SubContainer::free_space)
    }

    pub fn total_level(&self) -> f64 {
        self.inner.borrow().values().map(|sub| sub.level).sum()
    }

    pub fn total_capacity(&self) -> f64 {
        self.inner.borrow().values().map(|sub| sub.capacity).sum()
    }

    /// Total level over total capacity; 0 for a capacity-less store.
    pub fn fill_fraction(&self) -> f64 {
        let capacity = self.total_capacity();
        if capacity > 0.0 {
            self.total_level() / capacity
        } else {
            0.0
        }
    }

    /// Event firing once at least `amount` can be taken out.
    pub fn get_available(&self, id: &str, amount: f64) -> Event {
        let mut store = self.inner.borrow_mut();
        let sub = store.entry(id.to_string()).or_insert_with(SubContainer::empty);
        if sub.level >= amount {
            drop(store);
            let event = self.env.event();
            event.succeed();
            return event;
        }
        Self::pending_waiter(&self.env, &mut sub.get_waiters, amount)
    }

    /// Event firing once at least `amount` of free space exists.
    pub fn put_available(&self, id: &str, amount: f64) -> Event {
        let mut store = self.inner.borrow_mut();
        let sub = store.entry(id.to_string()).or_insert_with(SubContainer::empty);
        if sub.free_space() >= amount {
            drop(store);
            let event = self.env.event();
            event.succeed();
            return event;
        }
        Self::pending_waiter(&self.env, &mut sub.put_waiters, amount)
    }

    fn pending_waiter(env: &Env, waiters: &mut Vec<Waiter>, amount: f64) -> Event {
        // Waits at the same threshold share one event.
        if let Some(existing) = waiters
            .iter()
            .find(|w| w.amount.total_cmp(&amount) == Ordering::Equal)
        {
            return existing.event.clone();
        }
        let event = env.event();
        let at = waiters
            .iter()
            .position(|w| w.amount.total_cmp(&amount) == Ordering::Greater)
            .unwrap_or(waiters.len());
        waiters.insert(
            at,
            Waiter {
                amount,
                event: event.clone(),
            },
        );
        event
    }

    /// Takes `amount` out. Availability must have been confirmed; committing
    /// without it is a programming error.
    pub fn get(&self, id: &str, amount: f64, activity_id: &str) {
        let fired = {
            let mut store = self.inner.borrow_mut();
            let sub = store.entry(id.to_string()).or_insert_with(SubContainer::empty);
            assert!(
                sub.level >= amount,
                "get of {amount} from '{id}' exceeds level {}; \
                 availability was not confirmed",
                sub.level
            );
            sub.level -= amount;
            sub.reservations.remove(activity_id);
            debug_assert!(sub.level >= 0.0 && sub.level <= sub.capacity);
            Self::drain_satisfied(&mut sub.put_waiters, sub.capacity - sub.level)
        };
        for event in fired {
            event.succeed();
        }
    }

    /// Puts `amount` in. Free space must have been confirmed.
    pub fn put(&self, id: &str, amount: f64, activity_id: &str) {
        let fired = {
            let mut store = self.inner.borrow_mut();
            let sub = store.entry(id.to_string()).or_insert_with(SubContainer::empty);
            assert!(
                sub.free_space() >= amount,
                "put of {amount} into '{id}' exceeds free space {}; \
                 availability was not confirmed",
                sub.free_space()
            );
            sub.level += amount;
            sub.reservations.remove(activity_id);
            debug_assert!(sub.level >= 0.0 && sub.level <= sub.capacity);
            Self::drain_satisfied(&mut sub.get_waiters, sub.level)
        };
        for event in fired {
            event.succeed();
        }
    }

    /// Ascending threshold order, stopping at the first waiter that the new
    /// state cannot satisfy.
    fn drain_satisfied(waiters: &mut Vec<Waiter>, available: f64) -> Vec<Event> {
        let mut fired = Vec::new();
        while let Some(first) = waiters.first() {
            if first.amount <= available {
                fired.push(waiters.remove(0).event);
            } else {
                break;
            }
        }
        fired
    }

    /// Plans a future take of `amount` for `activity_id`. Returns whether the
    /// reservation fit; on failure nothing changes. One signed entry per
    /// activity: reserving again supersedes the earlier amount.
    pub fn reserve_get(&self, id: &str, amount: f64, activity_id: &str) -> bool {
        let mut store = self.inner.borrow_mut();
        let sub = store.entry(id.to_string()).or_insert_with(SubContainer::empty);
        let planned_others =
            sub.planned_level() - sub.reservations.get(activity_id).copied().unwrap_or(0.0);
        if planned_others - amount < 0.0 {
            return false;
        }
        sub.reservations.insert(activity_id.to_string(), -amount);
        true
    }

    /// Plans a future deposit of `amount` for `activity_id`.
    pub fn reserve_put(&self, id: &str, amount: f64, activity_id: &str) -> bool {
        let mut store = self.inner.borrow_mut();
        let sub = store.entry(id.to_string()).or_insert_with(SubContainer::empty);
        let planned_others =
            sub.planned_level() - sub.reservations.get(activity_id).copied().unwrap_or(0.0);
        if planned_others + amount > sub.capacity {
            return false;
        }
        sub.reservations.insert(activity_id.to_string(), amount);
        true
    }

    /// Withdraws an activity's planned delta on one sub-container.
    pub fn cancel_reservation(&self, id: &str, activity_id: &str) {
        if let Some(sub) = self.inner.borrow_mut().get_mut(id) {
            sub.reservations.remove(activity_id);
        }
    }

    pub fn planned_level(&self, id: &str) -> f64 {
        self.inner
            .borrow()
            .get(id)
            .map_or(0.0, SubContainer::planned_level)
    }

    /// Event firing once the sub-container is completely empty. When gated on
    /// an untriggered start event, the result is a fresh event that never
    /// fires on its own.
    pub fn empty_event(&self, id: &str, start: Option<&Event>) -> Event {
        if let Some(start) = start {
            if !start.triggered() {
                return self.env.event();
            }
        }
        self.put_available(id, self.capacity(id))
    }

    /// Event firing once the sub-container is completely full.
    pub fn full_event(&self, id: &str, start: Option<&Event>) -> Event {
        if let Some(start) = start {
            if !start.triggered() {
                return self.env.event();
            }
        }
        self.get_available(id, self.capacity(id))
    }
}

impl fmt::Debug for EventContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.inner.borrow();
        let mut s = f.debug_struct("EventContainer");
        for (id, sub) in store.iter() {
            s.field(id.as_str(), &format_args!("{}/{}", sub.level, sub.capacity));
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: &str = "default";

    fn half_full(env: &Env) -> EventContainer {
        EventContainer::with_subcontainers(env, &[SubContainerSpec::new(DEFAULT, 10.0, 5.0)])
            .unwrap()
    }

    #[test]
    fn put_available_fires_immediately_when_space_exists() {
        let env = Env::new();
        let container = half_full(&env);
        assert!(container.put_available(DEFAULT, 5.0).triggered());
        assert!(container.put_available(DEFAULT, 4.0).triggered());
    }

    #[test]
    fn pending_put_wait_resolves_at_its_threshold() {
        let env = Env::new();
        let container = half_full(&env);
        // free space is 5, so waiting for 7 must pend
        let waiting = container.put_available(DEFAULT, 7.0);
        assert!(!waiting.triggered());

        container.get(DEFAULT, 1.0, "a-1");
        assert!(!waiting.triggered());
        container.put(DEFAULT, 1.0, "a-1");
        assert!(!waiting.triggered());
        container.get(DEFAULT, 2.0, "a-1");
        assert!(waiting.triggered());
        assert_eq!(container.level(DEFAULT), 3.0);
    }

    #[test]
    fn waiters_at_the_same_threshold_share_one_event() {
        let env = Env::new();
        let container = half_full(&env);
        let first = container.put_available(DEFAULT, 8.0);
        let second = container.put_available(DEFAULT, 8.0);
        assert!(first.same_event(&second));
        // a different threshold gets its own event
        assert!(!first.same_event(&container.put_available(DEFAULT, 9.0)));
    }

    #[test]
    fn waiters_resolve_in_ascending_order_stopping_at_first_unmet() {
        let env = Env::new();
        let container = EventContainer::with_subcontainers(
            &env,
            &[SubContainerSpec::new(DEFAULT, 100.0, 0.0)],
        )
        .unwrap();
        let small = container.get_available(DEFAULT, 2.0);
        let medium = container.get_available(DEFAULT, 5.0);
        let large = container.get_available(DEFAULT, 50.0);

        container.put(DEFAULT, 10.0, "a-1");
        assert!(small.triggered());
        assert!(medium.triggered());
        assert!(!large.triggered());

        container.put(DEFAULT, 40.0, "a-1");
        assert!(large.triggered());
    }

    #[test]
    fn empty_and_full_events_follow_the_level() {
        let env = Env::new();
        let container = half_full(&env);
        let empty = container.empty_event(DEFAULT, None);
        let full = container.full_event(DEFAULT, None);
        assert!(!empty.triggered());
        assert!(!full.triggered());

        container.get(DEFAULT, 5.0, "a-1");
        assert!(empty.triggered());
        assert!(!full.triggered());

        container.put(DEFAULT, 10.0, "a-1");
        assert!(full.triggered());

        container.get(DEFAULT, 5.0, "a-1");
        let empty_again = container.empty_event(DEFAULT, None);
        assert!(!empty_again.triggered());
        container.get(DEFAULT, 5.0, "a-1");
        assert!(empty_again.triggered());
    }

    #[test]
    fn gated_state_event_stays_silent_until_started() {
        let env = Env::new();
        let container = half_full(&env);
        let start = env.event();
        let gated = container.empty_event(DEFAULT, Some(&start));
        container.get(DEFAULT, 5.0, "a-1");
        // container is empty, but the start gate never opened
        assert!(!gated.triggered());

        start.succeed();
        let live = container.empty_event(DEFAULT, Some(&start));
        assert!(live.triggered());
    }

    #[test]
    fn put_then_get_restores_the_level() {
        let env = Env::new();
        let container = half_full(&env);
        container.put(DEFAULT, 3.0, "a-1");
        container.get(DEFAULT, 3.0, "a-1");
        assert_eq!(container.level(DEFAULT), 5.0);
    }

    #[test]
    #[should_panic(expected = "availability was not confirmed")]
    fn unconfirmed_get_panics() {
        let env = Env::new();
        let container = half_full(&env);
        container.get(DEFAULT, 6.0, "a-1");
    }

    #[test]
    fn failed_reservations_leave_the_ledger_untouched() {
        let env = Env::new();
        let container = half_full(&env);
        assert!(container.reserve_put(DEFAULT, 5.0, "a-1"));
        assert_eq!(container.planned_level(DEFAULT), 10.0);
        // planned level is at capacity, so nothing more fits
        assert!(!container.reserve_put(DEFAULT, 1.0, "a-2"));
        assert_eq!(container.planned_level(DEFAULT), 10.0);

        assert!(container.reserve_get(DEFAULT, 10.0, "a-3"));
        assert!(!container.reserve_get(DEFAULT, 1.0, "a-4"));
        assert_eq!(container.planned_level(DEFAULT), 0.0);
    }

    #[test]
    fn re_reserving_supersedes_the_earlier_amount() {
        let env = Env::new();
        let container = EventContainer::with_subcontainers(
            &env,
            &[SubContainerSpec::new(DEFAULT, 100.0, 25.0)],
        )
        .unwrap();
        assert!(container.reserve_get(DEFAULT, 10.0, "a-1"));
        // the new amount replaces the old entry instead of stacking on it
        assert!(container.reserve_get(DEFAULT, 20.0, "a-1"));
        assert_eq!(container.planned_level(DEFAULT), 5.0);

        assert!(container.reserve_put(DEFAULT, 70.0, "a-2"));
        assert!(container.reserve_put(DEFAULT, 90.0, "a-2"));
        assert_eq!(container.planned_level(DEFAULT), 95.0);
        // a replacement that would not fit is rejected and changes nothing
        assert!(!container.reserve_put(DEFAULT, 100.0, "a-2"));
        assert_eq!(container.planned_level(DEFAULT), 95.0);
    }

    #[test]
    fn debug_output_names_subcontainers_and_levels() {
        let env = Env::new();
        let container = half_full(&env);
        let rendered = format!("{container:?}");
        assert!(rendered.contains("default"));
        assert!(rendered.contains("5/10"));
    }

    #[test]
    fn commit_clears_the_acting_activitys_reservation() {
        let env = Env::new();
        let container = half_full(&env);
        assert!(container.reserve_get(DEFAULT, 2.0, "a-1"));
        assert_eq!(container.planned_level(DEFAULT), 3.0);
        container.get(DEFAULT, 2.0, "a-1");
        assert_eq!(container.level(DEFAULT), 3.0);
        assert_eq!(container.planned_level(DEFAULT), 3.0);
    }

    #[test]
    fn unknown_ids_read_as_zero() {
        let env = Env::new();
        let container = EventContainer::new(&env);
        assert_eq!(container.level("missing"), 0.0);
        assert_eq!(container.capacity("missing"), 0.0);
        assert_eq!(container.free_space("missing"), 0.0);
    }

    #[test]
    fn rejects_level_above_capacity() {
        let env = Env::new();
        let err = EventContainer::with_subcontainers(
            &env,
            &[SubContainerSpec::new(DEFAULT, 10.0, 11.0)],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSubContainer { .. }));
    }
}
