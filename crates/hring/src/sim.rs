//! Simulation driver and plugin system.
//!
//! [`Simulation`] owns the [`World`] and one [`Schedule`] per [`Stage`]. The
//! host calls [`advance`](Simulation::advance) once per frame with the
//! simulated time that passed; that is the only way the engine moves.
//!
//! ```text
//! advance(dt)
//!   Clock       age every frame
//!   Gameplay    movement, then user systems reading frame readiness
//!   Effects     advance sequences, retire finished ones
//!   Settle      ready frames consume one fire
//!   Visibility  recompute fog if the revision moved
//!   Cleanup     flush deferred disposals
//! ```
//!
//! # Example
//!
//! ```ignore
//! use hring::prelude::*;
//!
//! let mut sim = Simulation::new(SimConfig::default())?;
//! sim.add_system(Stage::Gameplay, |world: &mut World| {
//!     // game logic here
//! });
//! sim.advance(0.016);
//! ```

use crate::config::SimConfig;
use crate::ecs::{Schedule, System, World};
use crate::error::SimError;
use crate::frame::{age_frames, settle_frames};
use crate::generation::Revision;
use crate::movement::walk;
use crate::sequence::{SequenceRegistry, advance_sequences};
use crate::time::Time;
use crate::visibility::{VisibilityEngine, update_visibility};

/// The fixed phases of a tick, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Clock,
    Gameplay,
    Effects,
    Settle,
    Visibility,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Clock,
        Stage::Gameplay,
        Stage::Effects,
        Stage::Settle,
        Stage::Visibility,
        Stage::Cleanup,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Bundles related resources and systems.
///
/// ```ignore
/// pub struct Monsters;
///
/// impl Plugin for Monsters {
///     fn build(&self, sim: &mut Simulation) {
///         sim.insert_resource(SpawnTable::default());
///         sim.add_system(Stage::Gameplay, wander);
///     }
/// }
/// ```
pub trait Plugin {
    fn build(&self, sim: &mut Simulation);
}

pub struct Simulation {
    world: World,
    stages: [Schedule; 6],
    config: SimConfig,
}

impl Simulation {
    /// Validate `config` and build a world with the engine's resources and
    /// built-in systems.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimConfig) -> Self {
        let mut world = World::new();
        world.insert_resource(Time::new());
        world.insert_resource(Revision::default());
        world.insert_resource(config.torus());
        world.insert_resource(config.optics());
        world.insert_resource(SequenceRegistry::default());
        world.insert_resource(VisibilityEngine::new());

        #[cfg(feature = "diagnostics")]
        if let Some(addr) = config.diagnostics_addr.as_deref() {
            if !crate::diag::init_logger() {
                log::warn!("another logger is installed; diagnostics will carry no log records");
            }
            match crate::diag::DiagSender::connect(addr) {
                Ok(sender) => {
                    log::info!("sending diagnostics to {addr}");
                    world.insert_resource(sender);
                }
                Err(e) => log::warn!("diagnostics disabled: {e}"),
            }
        }

        let mut sim = Self {
            world,
            stages: Default::default(),
            config,
        };
        sim.add_system(Stage::Clock, age_frames);
        sim.add_system(Stage::Gameplay, walk);
        sim.add_system(Stage::Effects, advance_sequences);
        sim.add_system(Stage::Settle, settle_frames);
        sim.add_system(Stage::Visibility, update_visibility);
        sim.add_system(Stage::Cleanup, |world: &mut World| {
            let n = world.flush_deferred();
            if n > 0 {
                log::trace!("flushed {n} deferred disposals");
            }
        });
        sim
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Append a system to a stage, after the systems already there.
    pub fn add_system<S: System + 'static>(&mut self, stage: Stage, system: S) -> &mut Self {
        self.stages[stage.index()].add_system(system);
        self
    }

    pub fn insert_resource<T: 'static + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.world.insert_resource(value);
        self
    }

    pub fn add_plugin(&mut self, plugin: impl Plugin) -> &mut Self {
        plugin.build(self);
        self
    }

    pub fn schedule(&self, stage: Stage) -> &Schedule {
        &self.stages[stage.index()]
    }

    /// Run one tick covering `dt` of simulated time.
    pub fn advance(&mut self, dt: f32) {
        self.world.resource_mut::<Time>().advance(dt);
        log::trace!("tick {} (dt {dt})", self.world.resource::<Time>().tick());
        for schedule in &mut self.stages {
            schedule.run(&mut self.world);
        }

        #[cfg(feature = "diagnostics")]
        {
            let timings = self
                .stages
                .iter()
                .flat_map(|s| s.timings().iter().cloned())
                .collect();
            crate::diag::collect_stats(&mut self.world, timings);
            crate::diag::send_diagnostics(&mut self.world);
        }
    }

    /// Number of ticks run so far.
    pub fn tick(&self) -> u64 {
        self.world.resource::<Time>().tick()
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::build(SimConfig::default())
    }
}
