//! # System — Functions Over the World
//!
//! A system is any `FnMut(&mut World)`. A [`Schedule`] runs its systems in the
//! order they were added; there is no parallelism and no dependency graph. The
//! simulation keeps one schedule per stage, which is how the fixed per-tick
//! ordering (clocks before gameplay, effects before settling, visibility last)
//! is expressed.

use super::world::World;

pub trait System {
    fn run(&mut self, world: &mut World);
}

impl<F: FnMut(&mut World)> System for F {
    fn run(&mut self, world: &mut World) {
        (self)(world);
    }
}

struct NamedSystem {
    name: String,
    system: Box<dyn System>,
}

/// Wall-clock cost of one system during the most recent run.
#[cfg(feature = "diagnostics")]
#[derive(Debug, Clone, serde::Serialize)]
pub struct SystemTiming {
    pub name: String,
    pub duration_us: f64,
}

/// An ordered list of systems.
pub struct Schedule {
    systems: Vec<NamedSystem>,
    #[cfg(feature = "diagnostics")]
    timings: Vec<SystemTiming>,
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            #[cfg(feature = "diagnostics")]
            timings: Vec::new(),
        }
    }

    pub fn add_system<S: System + 'static>(&mut self, system: S) {
        self.systems.push(NamedSystem {
            name: short_system_name(std::any::type_name::<S>()),
            system: Box::new(system),
        });
    }

    pub fn run(&mut self, world: &mut World) {
        #[cfg(feature = "diagnostics")]
        self.timings.clear();
        for ns in &mut self.systems {
            log::trace!("running system {}", ns.name);
            #[cfg(feature = "diagnostics")]
            let start = std::time::Instant::now();
            ns.system.run(world);
            #[cfg(feature = "diagnostics")]
            self.timings.push(SystemTiming {
                name: ns.name.clone(),
                duration_us: start.elapsed().as_secs_f64() * 1_000_000.0,
            });
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|ns| ns.name.as_str())
    }

    #[cfg(feature = "diagnostics")]
    pub fn timings(&self) -> &[SystemTiming] {
        &self.timings
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

/// `hring::frame::age_frames` → `age_frames`, closures → `<closure>`.
fn short_system_name(full: &str) -> String {
    let name = full.rsplit("::").next().unwrap_or(full);
    if name.contains("closure") {
        "<closure>".to_string()
    } else {
        name.to_string()
    }
}
