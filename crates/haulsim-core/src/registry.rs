use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::activity::Activity;
use crate::container::EventContainer;
use crate::error::ConfigError;

/// Explicit lookup service wiring expressions to the things they name.
///
/// Activities are indexed by id (unique) and by name (a list; several
/// activities may share a name). Container concepts are indexed by name.
/// The registry also hands out sequential activity ids, so identical builds
/// produce identical id assignments.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Default)]
struct Inner {
    by_id: BTreeMap<String, Activity>,
    by_name: BTreeMap<String, Vec<Activity>>,
    concepts: BTreeMap<String, EventContainer>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_activity_id(&self) -> String {
        let mut inner = self.inner.borrow_mut();
        inner.next_seq += 1;
        format!("act-{}", inner.next_seq)
    }

    pub(crate) fn register_activity(&self, activity: &Activity) -> Result<(), ConfigError> {
        let mut inner = self.inner.borrow_mut();
        let id = activity.id().to_string();
        if inner.by_id.contains_key(&id) {
            return Err(ConfigError::DuplicateActivityId(id));
        }
        inner.by_id.insert(id, activity.clone());
        inner
            .by_name
            .entry(activity.name().to_string())
            .or_default()
            .push(activity.clone());
        Ok(())
    }

    pub fn register_concept(&self, name: &str, container: &EventContainer) {
        self.inner
            .borrow_mut()
            .concepts
            .insert(name.to_string(), container.clone());
    }

    pub fn concept(&self, name: &str) -> Option<EventContainer> {
        self.inner.borrow().concepts.get(name).cloned()
    }

    pub fn activity_by_id(&self, id: &str) -> Option<Activity> {
        self.inner.borrow().by_id.get(id).cloned()
    }

    pub fn activities_named(&self, name: &str) -> Vec<Activity> {
        self.inner
            .borrow()
            .by_name
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}
