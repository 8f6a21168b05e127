//! Activities: the operations a simulation is assembled from.
//!
//! Every activity shares one lifecycle: an optional gated start, the
//! variant-specific body bracketed by plugin hooks, then completion of its
//! done event. Composites (Sequential, While) drive postponed children
//! through that same lifecycle inline.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use contracts::{ActivityPhase, ExprSpec, LogState};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use haulsim_runtime::{Env, Event, Halt, Process, Resource};

use crate::entity::{Mover, StorageSite};
use crate::error::ConfigError;
use crate::expression::{resolve_expression, validate_expression};
use crate::log::ActivityLog;
use crate::plugins::ActivityPlugin;
use crate::processor::{ShiftTiming, MAX_TRANSFER_ATTEMPTS};
use crate::registry::Registry;
use crate::resource_gate::RequestLedger;

mod basic;
mod move_activity;
mod sequence;
mod shift;
mod while_loop;

/// Iterations a While activity runs before treating the unmet stop
/// condition as a modeling defect.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Handle to one activity. Clones share state; the registry hands out the
/// same handle that composites and expressions see.
#[derive(Clone)]
pub struct Activity {
    inner: Rc<ActivityData>,
}

struct ActivityData {
    env: Env,
    registry: Registry,
    id: String,
    name: String,
    phase: Cell<ActivityPhase>,
    done: RefCell<Event>,
    log: ActivityLog,
    additional_logs: Vec<ActivityLog>,
    start_condition: Option<ExprSpec>,
    postponed: bool,
    ledger: RequestLedger,
    keep_resources: Vec<u64>,
    plugins: Vec<Rc<dyn ActivityPlugin>>,
    kind: ActivityKind,
}

pub(crate) enum ActivityKind {
    Basic {
        duration: f64,
    },
    Move {
        mover: Rc<dyn Mover>,
        destination: Rc<dyn StorageSite>,
    },
    ShiftAmount {
        processor: Rc<dyn StorageSite>,
        origin: Rc<dyn StorageSite>,
        destination: Rc<dyn StorageSite>,
        requested: Option<f64>,
        timing: ShiftTiming,
        subcontainer: String,
    },
    Sequential {
        children: Vec<Activity>,
    },
    While {
        child: Activity,
        condition: ExprSpec,
        max_iterations: usize,
    },
}

impl Activity {
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn phase(&self) -> ActivityPhase {
        self.inner.phase.get()
    }

    pub fn log(&self) -> &ActivityLog {
        &self.inner.log
    }

    pub fn is_postponed(&self) -> bool {
        self.inner.postponed
    }

    pub fn ledger(&self) -> &RequestLedger {
        &self.inner.ledger
    }

    /// The current done event. Replaced with a fresh one each time the
    /// activity is re-run by a While parent, so expression lookups always
    /// see the pending iteration.
    pub fn done_event(&self) -> Event {
        self.inner.done.borrow().clone()
    }

    pub(crate) fn kind(&self) -> &ActivityKind {
        &self.inner.kind
    }

    pub(crate) fn env(&self) -> &Env {
        &self.inner.env
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn keep_resources(&self) -> &[u64] {
        &self.inner.keep_resources
    }

    /// Checks every expression reference in this activity tree against the
    /// registry. Run at schedule time, once the whole model is assembled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(expr) = &self.inner.start_condition {
            validate_expression(&self.inner.registry, expr)?;
        }
        match &self.inner.kind {
            ActivityKind::Sequential { children } => {
                for child in children {
                    child.validate()?;
                }
            }
            ActivityKind::While {
                child, condition, ..
            } => {
                validate_expression(&self.inner.registry, condition)?;
                child.validate()?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Spawns the activity as a top-level task. Dangling expression
    /// references surface here, before the clock moves.
    pub fn schedule(&self) -> Result<Process, ConfigError> {
        self.validate()?;
        let this = self.clone();
        Ok(self.inner.env.process(async move { this.run_body().await }))
    }

    /// Runs the full lifecycle inline, as composites do for their children.
    pub(crate) fn run_inline(&self) -> LocalBoxFuture<'static, Result<(), Halt>> {
        let this = self.clone();
        async move { this.run_body().await }.boxed_local()
    }

    async fn run_body(self) -> Result<(), Halt> {
        // re-runs under a While parent get a fresh done event
        if self.done_event().triggered() {
            self.reset_done();
        }
        if let Some(expr) = &self.inner.start_condition {
            let gate = resolve_expression(&self.inner.env, &self.inner.registry, expr)
                .map_err(|err| Halt::new(err.to_string()))?;
            self.inner.phase.set(ActivityPhase::WaitingStart);
            self.record_all(LogState::WaitStart);
            gate.wait().await;
            self.record_all(LogState::WaitStop);
        }
        self.inner.phase.set(ActivityPhase::Running);
        match &self.inner.kind {
            ActivityKind::Basic { duration } => basic::run(&self, *duration).await?,
            ActivityKind::Move { mover, destination } => {
                move_activity::run(&self, mover.clone(), destination.clone()).await?
            }
            ActivityKind::ShiftAmount {
                processor,
                origin,
                destination,
                requested,
                timing,
                subcontainer,
            } => {
                shift::run(
                    &self,
                    processor.clone(),
                    origin.clone(),
                    destination.clone(),
                    *requested,
                    timing.clone(),
                    subcontainer.clone(),
                )
                .await?
            }
            ActivityKind::Sequential { children } => sequence::run(&self, children).await?,
            ActivityKind::While {
                child,
                condition,
                max_iterations,
            } => while_loop::run(&self, child, condition, *max_iterations).await?,
        }
        self.mark_done();
        Ok(())
    }

    fn reset_done(&self) {
        *self.inner.done.borrow_mut() = self.inner.env.event();
    }

    fn mark_done(&self) {
        self.inner.phase.set(ActivityPhase::Done);
        let done = self.done_event();
        done.succeed();
    }

    pub(crate) fn record_all(&self, state: LogState) {
        let t = self.inner.env.now();
        self.inner.log.record(t, &self.inner.id, state);
        for log in &self.inner.additional_logs {
            log.record(t, &self.inner.id, state);
        }
    }

    pub(crate) fn record_all_labeled(&self, state: LogState, label: &str) {
        let t = self.inner.env.now();
        self.inner.log.record_labeled(t, &self.inner.id, state, label);
        for log in &self.inner.additional_logs {
            log.record_labeled(t, &self.inner.id, state, label);
        }
    }

    pub(crate) async fn run_pre_hooks(&self) -> Result<(), Halt> {
        for plugin in &self.inner.plugins {
            plugin
                .pre_process(&self.inner.env, &self.inner.id, &self.inner.log)
                .await?;
        }
        Ok(())
    }

    pub(crate) fn run_post_hooks(&self) -> Result<(), Halt> {
        for plugin in &self.inner.plugins {
            plugin.post_process(&self.inner.env, &self.inner.id, &self.inner.log)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activity")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("phase", &self.inner.phase.get())
            .finish()
    }
}

/// Assembles one activity: shared lifecycle options first, then the variant.
pub struct ActivityBuilder {
    env: Env,
    registry: Registry,
    name: String,
    id: Option<String>,
    start_condition: Option<ExprSpec>,
    postpone_start: bool,
    ledger: RequestLedger,
    keep_resources: Vec<u64>,
    additional_logs: Vec<ActivityLog>,
    plugins: Vec<Rc<dyn ActivityPlugin>>,
    subcontainer: String,
    max_iterations: usize,
}

impl ActivityBuilder {
    pub fn new(env: &Env, registry: &Registry, name: impl Into<String>) -> Self {
        Self {
            env: env.clone(),
            registry: registry.clone(),
            name: name.into(),
            id: None,
            start_condition: None,
            postpone_start: false,
            ledger: RequestLedger::new(),
            keep_resources: Vec::new(),
            additional_logs: Vec::new(),
            plugins: Vec::new(),
            subcontainer: "default".to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn start_when(mut self, condition: ExprSpec) -> Self {
        self.start_condition = Some(condition);
        self
    }

    /// Defer the start to a composite parent.
    pub fn postponed(mut self) -> Self {
        self.postpone_start = true;
        self
    }

    /// Share a resource ledger across an activity tree.
    pub fn ledger(mut self, ledger: &RequestLedger) -> Self {
        self.ledger = ledger.clone();
        self
    }

    /// Exempt a resource from release at the end of the body.
    pub fn keep_resource(mut self, resource: &Resource) -> Self {
        self.keep_resources.push(resource.id());
        self
    }

    /// Mirror lifecycle entries into another log as well.
    pub fn mirror_log(mut self, log: &ActivityLog) -> Self {
        self.additional_logs.push(log.clone());
        self
    }

    pub fn plugin(mut self, plugin: Rc<dyn ActivityPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn subcontainer(mut self, id: impl Into<String>) -> Self {
        self.subcontainer = id.into();
        self
    }

    pub fn max_iterations(mut self, limit: usize) -> Self {
        self.max_iterations = limit;
        self
    }

    pub fn basic(self, duration: f64) -> Result<Activity, ConfigError> {
        self.finish(ActivityKind::Basic { duration })
    }

    pub fn moving(
        self,
        mover: Rc<dyn Mover>,
        destination: Rc<dyn StorageSite>,
    ) -> Result<Activity, ConfigError> {
        self.finish(ActivityKind::Move { mover, destination })
    }

    pub fn shift_amount(
        self,
        processor: Rc<dyn StorageSite>,
        origin: Rc<dyn StorageSite>,
        destination: Rc<dyn StorageSite>,
        requested: Option<f64>,
        timing: ShiftTiming,
    ) -> Result<Activity, ConfigError> {
        let subcontainer = self.subcontainer.clone();
        self.finish(ActivityKind::ShiftAmount {
            processor,
            origin,
            destination,
            requested,
            timing,
            subcontainer,
        })
    }

    pub fn sequential(self, children: Vec<Activity>) -> Result<Activity, ConfigError> {
        for child in &children {
            if !child.is_postponed() {
                return Err(ConfigError::ChildNotPostponed {
                    parent: self.name.clone(),
                    child: child.name().to_string(),
                });
            }
        }
        self.finish(ActivityKind::Sequential { children })
    }

    pub fn while_loop(self, child: Activity, condition: ExprSpec) -> Result<Activity, ConfigError> {
        if !child.is_postponed() {
            return Err(ConfigError::ChildNotPostponed {
                parent: self.name.clone(),
                child: child.name().to_string(),
            });
        }
        let max_iterations = self.max_iterations;
        self.finish(ActivityKind::While {
            child,
            condition,
            max_iterations,
        })
    }

    fn finish(self, kind: ActivityKind) -> Result<Activity, ConfigError> {
        let id = self
            .id
            .unwrap_or_else(|| self.registry.next_activity_id());
        let mut plugins = self.plugins;
        // stable sort keeps registration order within one priority
        plugins.sort_by_key(|plugin| plugin.priority());
        let done = self.env.event();
        let activity = Activity {
            inner: Rc::new(ActivityData {
                env: self.env,
                registry: self.registry.clone(),
                id,
                name: self.name,
                phase: Cell::new(ActivityPhase::Created),
                done: RefCell::new(done),
                log: ActivityLog::new(),
                additional_logs: self.additional_logs,
                start_condition: self.start_condition,
                postponed: self.postpone_start,
                ledger: self.ledger,
                keep_resources: self.keep_resources,
                plugins,
                kind,
            }),
        };
        self.registry.register_activity(&activity)?;
        Ok(activity)
    }
}
