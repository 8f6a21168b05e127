use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::{Env, Event};

/// An exclusive-use resource with a FIFO grant queue.
///
/// `request` returns an event that fires when the caller holds the resource;
/// `release` hands it to the next waiter in request order. Clones share the
/// same underlying resource.
pub struct Resource {
    env: Env,
    id: u64,
    inner: Rc<RefCell<ResourceInner>>,
}

struct ResourceInner {
    held: bool,
    queue: VecDeque<Event>,
}

impl Resource {
    pub fn new(env: &Env) -> Self {
        Self {
            env: env.clone(),
            id: env.next_resource_id(),
            inner: Rc::new(RefCell::new(ResourceInner {
                held: false,
                queue: VecDeque::new(),
            })),
        }
    }

    /// Stable identity for ledger keys.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> Event {
        let granted = self.env.event();
        let mut inner = self.inner.borrow_mut();
        if inner.held {
            inner.queue.push_back(granted.clone());
        } else {
            inner.held = true;
            drop(inner);
            granted.succeed();
        }
        granted
    }

    pub fn release(&self) {
        let next = {
            let mut inner = self.inner.borrow_mut();
            match inner.queue.pop_front() {
                Some(event) => Some(event),
                None => {
                    inner.held = false;
                    None
                }
            }
        };
        if let Some(event) = next {
            event.succeed();
        }
    }

    pub fn queue_len(&self) -> usize {
        self.inner.borrow().queue.len()
    }
}

impl Clone for Resource {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            id: self.id,
            inner: self.inner.clone(),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("held", &inner.held)
            .field("queued", &inner.queue.len())
            .finish()
    }
}
