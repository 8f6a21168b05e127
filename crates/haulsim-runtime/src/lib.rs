//! Deterministic single-threaded virtual-time executor.
//!
//! The engine crates model operations as cooperating logical tasks that
//! suspend on [`Event`]s and timeouts. This crate owns the clock and the
//! scheduling discipline: a FIFO ready queue of woken tasks and a
//! time-ordered timer heap with insertion-sequence tie-breaking, so two
//! timeouts due at the same instant always fire in the order they were
//! scheduled. There is no randomness and no thread pool; identical inputs
//! produce identical traces.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::LocalBoxFuture;
use futures::task::{waker, ArcWake};

mod event;
mod resource;

pub use event::{Event, EventFuture};
pub use resource::Resource;

/// Simulation time, in seconds since run start.
pub type SimTime = f64;

/// A run-terminating failure raised by a task body.
///
/// The first `Halt` returned by any task aborts [`Env::run`], which hands it
/// back to the caller. Logs written before the abort remain inspectable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halt {
    pub message: String,
}

impl Halt {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "simulation halted: {}", self.message)
    }
}

impl std::error::Error for Halt {}

/// Handle to a spawned task.
pub struct Process {
    /// Fires when the task body has returned.
    pub done: Event,
}

struct TimerEntry {
    due: SimTime,
    seq: u64,
    event: Event,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .total_cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

type TaskId = u64;

struct Core {
    now: SimTime,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    tasks: HashMap<TaskId, LocalBoxFuture<'static, Result<(), Halt>>>,
    halt: Option<Halt>,
    next_task_id: u64,
    next_event_id: u64,
    next_timer_seq: u64,
    next_resource_id: u64,
}

/// Cloneable handle to the executor. All clones drive the same core.
pub struct Env {
    core: Rc<RefCell<Core>>,
    // Wakers are Send + Sync by contract, so the ready queue sits behind a
    // Mutex even though execution is single-threaded.
    ready: Arc<Mutex<VecDeque<TaskId>>>,
}

struct TaskWaker {
    task_id: TaskId,
    ready: Arc<Mutex<VecDeque<TaskId>>>,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        lock_queue(&arc_self.ready).push_back(arc_self.task_id);
    }
}

fn lock_queue(queue: &Mutex<VecDeque<TaskId>>) -> MutexGuard<'_, VecDeque<TaskId>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Env {
    pub fn new() -> Self {
        Self {
            core: Rc::new(RefCell::new(Core {
                now: 0.0,
                timers: BinaryHeap::new(),
                tasks: HashMap::new(),
                halt: None,
                next_task_id: 0,
                next_event_id: 0,
                next_timer_seq: 0,
                next_resource_id: 0,
            })),
            ready: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn now(&self) -> SimTime {
        self.core.borrow().now
    }

    /// Creates a fresh untriggered event.
    pub fn event(&self) -> Event {
        let mut core = self.core.borrow_mut();
        let id = core.next_event_id;
        core.next_event_id += 1;
        Event::with_id(id)
    }

    /// Returns an event that fires at `now + duration`.
    ///
    /// A zero duration is the explicit settle step: the event fires only
    /// after every already-ready task has been polled, so same-instant
    /// triggers are fully processed before the caller resumes.
    pub fn timeout(&self, duration: SimTime) -> Event {
        assert!(
            duration >= 0.0 && duration.is_finite(),
            "timeout duration must be finite and non-negative, got {duration}"
        );
        let event = self.event();
        let mut core = self.core.borrow_mut();
        let entry = TimerEntry {
            due: core.now + duration,
            seq: core.next_timer_seq,
            event: event.clone(),
        };
        core.next_timer_seq += 1;
        core.timers.push(Reverse(entry));
        event
    }

    /// Fires when every input event has fired. Immediate for an empty slice.
    pub fn all_of(&self, events: &[Event]) -> Event {
        let joined = self.event();
        if events.is_empty() {
            joined.succeed();
            return joined;
        }
        let remaining = Rc::new(std::cell::Cell::new(events.len()));
        for event in events {
            let joined = joined.clone();
            let remaining = remaining.clone();
            event.on_trigger(move || {
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    joined.succeed();
                }
            });
        }
        joined
    }

    /// Fires when the first input event fires. Immediate for an empty slice.
    pub fn any_of(&self, events: &[Event]) -> Event {
        let first = self.event();
        if events.is_empty() {
            first.succeed();
            return first;
        }
        for event in events {
            let first = first.clone();
            event.on_trigger(move || {
                if !first.triggered() {
                    first.succeed();
                }
            });
        }
        first
    }

    /// Spawns a logical task. Its done event fires when the body returns;
    /// an `Err` body aborts the run.
    pub fn process<F>(&self, body: F) -> Process
    where
        F: Future<Output = Result<(), Halt>> + 'static,
    {
        let done = self.event();
        let task_id = {
            let mut core = self.core.borrow_mut();
            let id = core.next_task_id;
            core.next_task_id += 1;
            id
        };
        let env = self.clone();
        let done_handle = done.clone();
        let wrapped = async move {
            let result = body.await;
            if let Err(halt) = &result {
                let mut core = env.core.borrow_mut();
                if core.halt.is_none() {
                    core.halt = Some(halt.clone());
                }
            }
            done_handle.succeed();
            result
        };
        self.core
            .borrow_mut()
            .tasks
            .insert(task_id, Box::pin(wrapped));
        lock_queue(&self.ready).push_back(task_id);
        Process { done }
    }

    /// Drives the simulation until no ready task and no pending timer
    /// remains, or a task halts.
    pub fn run(&self) -> Result<(), Halt> {
        loop {
            loop {
                // take the id in its own statement so the queue lock is
                // released before the task runs (wakers re-lock it)
                let next = lock_queue(&self.ready).pop_front();
                let Some(task_id) = next else { break };
                self.poll_task(task_id);
                let halted = self.core.borrow_mut().halt.take();
                if let Some(halt) = halted {
                    return Err(halt);
                }
            }
            let fired = {
                let mut core = self.core.borrow_mut();
                match core.timers.pop() {
                    Some(Reverse(entry)) => {
                        debug_assert!(entry.due >= core.now, "timer scheduled in the past");
                        if entry.due > core.now {
                            tracing::trace!(from = core.now, to = entry.due, "advancing clock");
                        }
                        core.now = entry.due;
                        Some(entry.event)
                    }
                    None => None,
                }
            };
            match fired {
                Some(event) => event.succeed(),
                None => return Ok(()),
            }
        }
    }

    fn poll_task(&self, task_id: TaskId) {
        // A stale wake may name a task that already completed.
        let Some(mut future) = self.core.borrow_mut().tasks.remove(&task_id) else {
            return;
        };
        let waker = waker(Arc::new(TaskWaker {
            task_id,
            ready: self.ready.clone(),
        }));
        let mut cx = std::task::Context::from_waker(&waker);
        if future.as_mut().poll(&mut cx).is_pending() {
            self.core.borrow_mut().tasks.insert(task_id, future);
        }
    }

    pub(crate) fn next_resource_id(&self) -> u64 {
        let mut core = self.core.borrow_mut();
        let id = core.next_resource_id;
        core.next_resource_id += 1;
        id
    }
}

impl Clone for Env {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            ready: self.ready.clone(),
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
