//! Concepts that take part in operations, composed from small capability
//! traits instead of one deep hierarchy. Activities accept trait objects
//! (`Rc<dyn StorageSite>`, `Rc<dyn Mover>`), so a concept qualifies for a
//! role exactly when it carries the required capabilities.

use std::cell::Cell;
use std::rc::Rc;

use contracts::SubContainerSpec;
use haulsim_runtime::{Env, Resource};

use crate::container::EventContainer;
use crate::error::ConfigError;
use crate::log::ActivityLog;
use crate::registry::Registry;

/// Planar coordinates, in metres.
pub type Position = (f64, f64);

pub trait HasContainer {
    fn container(&self) -> &EventContainer;
}

pub trait HasResource {
    fn resource(&self) -> &Resource;
}

pub trait Loggable {
    fn log(&self) -> &ActivityLog;
}

pub trait Locatable {
    fn position(&self) -> Position;
}

pub trait Movable: Locatable {
    /// Speed at the current fill state, in m/s.
    fn current_speed(&self) -> f64;

    fn relocate(&self, to: Position);

    fn movement_duration(&self, to: Position) -> f64 {
        let (x0, y0) = self.position();
        let (x1, y1) = to;
        let distance = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        distance / self.current_speed()
    }
}

pub trait Concept: Loggable {
    fn name(&self) -> &str;
}

/// A concept that can hold material, be claimed exclusively, and be sailed
/// to. Origins, destinations, and transfer processors all take this shape.
pub trait StorageSite: Concept + HasContainer + HasResource + Locatable {}

impl<T: Concept + HasContainer + HasResource + Locatable> StorageSite for T {}

/// A storage site that can also move itself.
pub trait Mover: StorageSite + Movable {}

impl<T: StorageSite + Movable> Mover for T {}

/// A fixed location with storage and a berth.
#[derive(Clone)]
pub struct Site {
    inner: Rc<SiteInner>,
}

struct SiteInner {
    name: String,
    container: EventContainer,
    resource: Resource,
    log: ActivityLog,
    position: Position,
}

impl Site {
    pub fn new(
        env: &Env,
        registry: &Registry,
        name: impl Into<String>,
        position: Position,
        subcontainers: &[SubContainerSpec],
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let container = EventContainer::with_subcontainers(env, subcontainers)?;
        registry.register_concept(&name, &container);
        Ok(Self {
            inner: Rc::new(SiteInner {
                name,
                container,
                resource: Resource::new(env),
                log: ActivityLog::new(),
                position,
            }),
        })
    }
}

impl Concept for Site {
    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl HasContainer for Site {
    fn container(&self) -> &EventContainer {
        &self.inner.container
    }
}

impl HasResource for Site {
    fn resource(&self) -> &Resource {
        &self.inner.resource
    }
}

impl Loggable for Site {
    fn log(&self) -> &ActivityLog {
        &self.inner.log
    }
}

impl Locatable for Site {
    fn position(&self) -> Position {
        self.inner.position
    }
}

/// A self-propelled carrier whose speed may depend on how full it is.
#[derive(Clone)]
pub struct Vessel {
    inner: Rc<VesselInner>,
}

struct VesselInner {
    name: String,
    container: EventContainer,
    resource: Resource,
    log: ActivityLog,
    position: Cell<Position>,
    speed: Box<dyn Fn(f64) -> f64>,
}

impl Vessel {
    pub fn new(
        env: &Env,
        registry: &Registry,
        name: impl Into<String>,
        position: Position,
        subcontainers: &[SubContainerSpec],
        speed: impl Fn(f64) -> f64 + 'static,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let container = EventContainer::with_subcontainers(env, subcontainers)?;
        registry.register_concept(&name, &container);
        Ok(Self {
            inner: Rc::new(VesselInner {
                name,
                container,
                resource: Resource::new(env),
                log: ActivityLog::new(),
                position: Cell::new(position),
                speed: Box::new(speed),
            }),
        })
    }

    pub fn with_constant_speed(
        env: &Env,
        registry: &Registry,
        name: impl Into<String>,
        position: Position,
        subcontainers: &[SubContainerSpec],
        speed: f64,
    ) -> Result<Self, ConfigError> {
        Self::new(env, registry, name, position, subcontainers, move |_| speed)
    }
}

impl Concept for Vessel {
    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl HasContainer for Vessel {
    fn container(&self) -> &EventContainer {
        &self.inner.container
    }
}

impl HasResource for Vessel {
    fn resource(&self) -> &Resource {
        &self.inner.resource
    }
}

impl Loggable for Vessel {
    fn log(&self) -> &ActivityLog {
        &self.inner.log
    }
}

impl Locatable for Vessel {
    fn position(&self) -> Position {
        self.inner.position.get()
    }
}

impl Movable for Vessel {
    fn current_speed(&self) -> f64 {
        (self.inner.speed)(self.inner.container.fill_fraction())
    }

    fn relocate(&self, to: Position) {
        self.inner.position.set(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vessel_speed_follows_fill_fraction() {
        let env = Env::new();
        let registry = Registry::new();
        let vessel = Vessel::new(
            &env,
            &registry,
            "barge",
            (0.0, 0.0),
            &[SubContainerSpec::new("default", 100.0, 0.0)],
            // loaded speed drops linearly from 10 to 5
            |fill| 10.0 - 5.0 * fill,
        )
        .unwrap();
        assert_eq!(vessel.current_speed(), 10.0);
        vessel.container().put("default", 100.0, "a-1");
        assert_eq!(vessel.current_speed(), 5.0);
    }

    #[test]
    fn movement_duration_is_distance_over_speed() {
        let env = Env::new();
        let registry = Registry::new();
        let vessel = Vessel::with_constant_speed(
            &env,
            &registry,
            "barge",
            (0.0, 0.0),
            &[SubContainerSpec::new("default", 100.0, 0.0)],
            4.0,
        )
        .unwrap();
        assert_eq!(vessel.movement_duration((300.0, 400.0)), 125.0);
        vessel.relocate((300.0, 400.0));
        assert_eq!(vessel.movement_duration((300.0, 400.0)), 0.0);
    }

    #[test]
    fn sites_register_their_concept() {
        let env = Env::new();
        let registry = Registry::new();
        let site = Site::new(
            &env,
            &registry,
            "quarry",
            (0.0, 0.0),
            &[SubContainerSpec::new("default", 500.0, 250.0)],
        )
        .unwrap();
        let looked_up = registry.concept("quarry").unwrap();
        assert_eq!(looked_up.level("default"), 250.0);
        assert_eq!(site.container().level("default"), 250.0);
    }
}
