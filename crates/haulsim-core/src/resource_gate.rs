use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use haulsim_runtime::Resource;

/// Shared record of the exclusive resources held within one activity
/// execution scope.
///
/// A composite activity hands clones of its ledger to nested sub-activities,
/// so a resource acquired anywhere in the tree is held once and requesting it
/// again is a no-op. Releasing skips resources named in the keep set.
#[derive(Clone, Default)]
pub struct RequestLedger {
    held: Rc<RefCell<BTreeMap<u64, Resource>>>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holds(&self, resource: &Resource) -> bool {
        self.held.borrow().contains_key(&resource.id())
    }

    /// Acquires `resource`, suspending until it is granted. Requesting a
    /// resource the scope already holds returns immediately.
    pub async fn request(&self, resource: &Resource) {
        if self.holds(resource) {
            return;
        }
        let granted = resource.request();
        if !granted.triggered() {
            tracing::debug!(resource = resource.id(), "waiting for resource grant");
        }
        granted.wait().await;
        self.held
            .borrow_mut()
            .insert(resource.id(), resource.clone());
    }

    /// Releases one held resource unless it is in `keep`. Releasing a
    /// resource the ledger does not hold is a no-op.
    pub fn release(&self, resource: &Resource, keep: &[u64]) {
        if keep.contains(&resource.id()) {
            return;
        }
        let held = self.held.borrow_mut().remove(&resource.id());
        if held.is_some() {
            resource.release();
        }
    }

    /// Releases every held resource whose id is not in `keep`, removing the
    /// released entries from the ledger.
    pub fn release_all(&self, keep: &[u64]) {
        let released: Vec<Resource> = {
            let mut held = self.held.borrow_mut();
            let ids: Vec<u64> = held
                .keys()
                .copied()
                .filter(|id| !keep.contains(id))
                .collect();
            ids.iter()
                .filter_map(|id| held.remove(id))
                .collect()
        };
        for resource in released {
            resource.release();
        }
    }

    pub fn held_count(&self) -> usize {
        self.held.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haulsim_runtime::Env;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn repeated_requests_hold_the_resource_once() {
        let env = Env::new();
        let berth = Resource::new(&env);
        let ledger = RequestLedger::new();
        let ledger_in = ledger.clone();
        let berth_in = berth.clone();
        env.process(async move {
            ledger_in.request(&berth_in).await;
            ledger_in.request(&berth_in).await;
            assert_eq!(ledger_in.held_count(), 1);
            Ok(())
        });
        env.run().unwrap();
        assert_eq!(ledger.held_count(), 1);
        // nobody queued behind the deduplicated request
        assert_eq!(berth.queue_len(), 0);
    }

    #[test]
    fn release_all_skips_the_keep_set() {
        let env = Env::new();
        let berth = Resource::new(&env);
        let crane = Resource::new(&env);
        let ledger = RequestLedger::new();
        let grabbed = Rc::new(RefCell::new(Vec::new()));

        let ledger_in = ledger.clone();
        let berth_in = berth.clone();
        let crane_in = crane.clone();
        env.process(async move {
            ledger_in.request(&berth_in).await;
            ledger_in.request(&crane_in).await;
            ledger_in.release_all(&[berth_in.id()]);
            assert_eq!(ledger_in.held_count(), 1);
            assert!(ledger_in.holds(&berth_in));
            Ok(())
        });

        // a competitor gets the crane once it is released, but never the berth
        let env_in = env.clone();
        let berth_c = berth.clone();
        let crane_c = crane.clone();
        let grabbed_in = grabbed.clone();
        env.process(async move {
            env_in.timeout(0.0).wait().await;
            crane_c.request().wait().await;
            grabbed_in.borrow_mut().push("crane");
            assert!(!berth_c.request().triggered());
            Ok(())
        });

        env.run().unwrap();
        assert_eq!(*grabbed.borrow(), vec!["crane"]);
    }

    #[test]
    fn blocked_request_resumes_after_release() {
        let env = Env::new();
        let berth = Resource::new(&env);
        let order = Rc::new(RefCell::new(Vec::new()));

        let first = RequestLedger::new();
        let env_a = env.clone();
        let berth_a = berth.clone();
        let first_in = first.clone();
        let order_a = order.clone();
        env.process(async move {
            first_in.request(&berth_a).await;
            order_a.borrow_mut().push(format!("first@{}", env_a.now()));
            env_a.timeout(4.0).wait().await;
            first_in.release_all(&[]);
            Ok(())
        });

        let second = RequestLedger::new();
        let env_b = env.clone();
        let berth_b = berth.clone();
        let order_b = order.clone();
        env.process(async move {
            second.request(&berth_b).await;
            order_b.borrow_mut().push(format!("second@{}", env_b.now()));
            Ok(())
        });

        env.run().unwrap();
        assert_eq!(*order.borrow(), vec!["first@0", "second@4"]);
    }
}
