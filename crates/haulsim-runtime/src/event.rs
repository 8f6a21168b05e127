use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// A single-shot simulation event.
///
/// Clones share the same underlying state. An event starts untriggered;
/// [`Event::succeed`] fires it exactly once, waking every task suspended on
/// it and running any registered trigger hooks. Waiting on an event that has
/// already fired resolves immediately.
pub struct Event {
    inner: Rc<RefCell<EventInner>>,
}

pub(crate) struct EventInner {
    id: u64,
    triggered: bool,
    wakers: Vec<Waker>,
    hooks: Vec<Box<dyn FnOnce()>>,
}

impl Event {
    pub(crate) fn with_id(id: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EventInner {
                id,
                triggered: false,
                wakers: Vec::new(),
                hooks: Vec::new(),
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    pub fn triggered(&self) -> bool {
        self.inner.borrow().triggered
    }

    /// Fires the event. Panics if it already fired; single-shot violations
    /// are programmer errors, not recoverable conditions.
    pub fn succeed(&self) {
        let (wakers, hooks) = {
            let mut inner = self.inner.borrow_mut();
            assert!(
                !inner.triggered,
                "event {} succeeded twice; events are single-shot",
                inner.id
            );
            inner.triggered = true;
            (
                std::mem::take(&mut inner.wakers),
                std::mem::take(&mut inner.hooks),
            )
        };
        // Wakers and hooks run outside the borrow; hooks may succeed other
        // events or create new ones.
        for waker in wakers {
            waker.wake();
        }
        for hook in hooks {
            hook();
        }
    }

    /// Runs `hook` when the event fires, or immediately if it already has.
    pub fn on_trigger(&self, hook: impl FnOnce() + 'static) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.triggered {
                inner.hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Suspends the calling task until the event fires.
    pub fn wait(&self) -> EventFuture {
        EventFuture {
            inner: self.inner.clone(),
        }
    }

    /// Identity comparison: do the two handles refer to the same event?
    pub fn same_event(&self, other: &Event) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Clone for Event {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Event")
            .field("id", &inner.id)
            .field("triggered", &inner.triggered)
            .finish()
    }
}

pub struct EventFuture {
    inner: Rc<RefCell<EventInner>>,
}

impl Future for EventFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        if inner.triggered {
            Poll::Ready(())
        } else {
            inner.wakers.push(cx.waker().clone());
            Poll::Pending
        }
    }
}
