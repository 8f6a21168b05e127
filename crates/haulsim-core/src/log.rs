use std::cell::RefCell;
use std::rc::Rc;

use contracts::{LogEntry, LogState};

/// Append-only timestamped record of activity state transitions.
///
/// Clones share the same underlying sequence; [`ActivityLog::same_log`] is
/// the identity test used to deduplicate log targets when one concept plays
/// several roles in a transfer.
#[derive(Clone, Debug, Default)]
pub struct ActivityLog {
    entries: Rc<RefCell<Vec<LogEntry>>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, timestamp: f64, activity_id: &str, state: LogState) {
        self.entries
            .borrow_mut()
            .push(LogEntry::new(timestamp, activity_id, state));
    }

    pub fn record_labeled(&self, timestamp: f64, activity_id: &str, state: LogState, label: &str) {
        self.entries
            .borrow_mut()
            .push(LogEntry::new(timestamp, activity_id, state).with_label(label));
    }

    pub fn same_log(&self, other: &ActivityLog) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
