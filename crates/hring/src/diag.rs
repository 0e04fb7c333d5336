//! Diagnostics: per-tick statistics, optionally shipped as JSON over UDP.
//!
//! Enabled by the `diagnostics` feature flag. After every tick the simulation
//! refreshes the [`SimStats`] resource. When the config names a
//! `diagnostics_addr`, a [`DiagSender`] resource is inserted as well and
//! [`send_diagnostics`] ships a snapshot there, throttled to 10 Hz. Sending is
//! fire-and-forget: nothing on the wire can stall or fail a tick.
//!
//! [`init_logger`] installs an `env_logger` backed logger that also captures
//! recent records, which ride along in the datagrams. The simulation installs
//! it itself whenever a diagnostics address is configured.

use std::collections::VecDeque;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use log::Log;
use serde::Serialize;

use crate::ecs::World;
use crate::ecs::system::SystemTiming;
use crate::error::SimError;
use crate::frame::{Frame, FrameTally};
use crate::generation::Notify;
use crate::sequence::SequenceRegistry;
use crate::time::Time;
use crate::visibility::VisibilityEngine;

const SEND_INTERVAL: Duration = Duration::from_millis(100);
const LOG_CAPACITY: usize = 256;
const LOGS_PER_DATAGRAM: usize = 32;

/// Statistics of the most recent tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimStats {
    pub tick: u64,
    pub elapsed: f64,
    pub revision: u64,
    pub entity_count: usize,
    pub archetype_count: usize,
    pub frames: usize,
    pub frames_fired: u32,
    pub sequences: usize,
    pub visibility_transitions: usize,
    pub spawned: u32,
    pub despawned: u32,
    pub system_timings: Vec<SystemTiming>,
}

/// Refresh [`SimStats`] from the world. `timings` are the per-system costs of
/// the tick that just ran.
pub(crate) fn collect_stats(world: &mut World, timings: Vec<SystemTiming>) {
    let (spawned, despawned) = world.take_churn();
    let time = world.get_resource::<Time>().copied().unwrap_or_default();
    let stats = SimStats {
        tick: time.tick(),
        elapsed: time.elapsed(),
        revision: world.revision(),
        entity_count: world.entity_count(),
        archetype_count: world.archetype_count(),
        frames: world.entities_with::<Frame>().len(),
        frames_fired: world.get_resource::<FrameTally>().map_or(0, |t| t.fired),
        sequences: world
            .get_resource::<SequenceRegistry>()
            .map_or(0, SequenceRegistry::len),
        visibility_transitions: world
            .get_resource::<VisibilityEngine>()
            .map_or(0, VisibilityEngine::last_transitions),
        spawned,
        despawned,
        system_timings: timings,
    };
    world.insert_resource(stats);
}

// ── DiagSender ───────────────────────────────────────────────────────────

/// Resource owning the outbound socket and the throttle.
pub struct DiagSender {
    socket: UdpSocket,
    last_send: Option<Instant>,
}

impl DiagSender {
    /// Bind an ephemeral port and aim it at `addr`.
    pub fn connect(addr: &str) -> Result<Self, SimError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            last_send: None,
        })
    }

    fn due(&mut self, now: Instant) -> bool {
        match self.last_send {
            Some(last) if now.duration_since(last) < SEND_INTERVAL => false,
            _ => {
                self.last_send = Some(now);
                true
            }
        }
    }
}

#[derive(Serialize)]
struct Datagram<'a> {
    stats: &'a SimStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    logs: Vec<CapturedLog>,
}

/// Ship the current [`SimStats`], at most ten times per second.
pub fn send_diagnostics(world: &mut World) {
    let Some(mut sender) = world.resource_remove::<DiagSender>() else {
        return;
    };
    if sender.due(Instant::now()) {
        if let Some(stats) = world.get_resource::<SimStats>() {
            let datagram = Datagram {
                stats,
                logs: drain_captured_logs(LOGS_PER_DATAGRAM),
            };
            if let Ok(json) = serde_json::to_vec(&datagram) {
                let _ = sender.socket.send(&json);
            }
        }
    }
    world.insert_resource(sender);
}

// ── Log Capture ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
struct CapturedLog {
    level: String,
    target: String,
    message: String,
    secs: f32,
}

static LOG_RING: Mutex<VecDeque<CapturedLog>> = Mutex::new(VecDeque::new());
static LOG_START: OnceLock<Instant> = OnceLock::new();
static DIAG_LOGGER: OnceLock<DiagLogger> = OnceLock::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Writes through `env_logger` and keeps the most recent records.
struct DiagLogger {
    inner: env_logger::Logger,
}

impl Log for DiagLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata) || metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            self.inner.log(record);
        }
        let entry = CapturedLog {
            level: record.level().to_string(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            secs: LOG_START.get().map_or(0.0, |s| s.elapsed().as_secs_f32()),
        };
        if let Ok(mut ring) = LOG_RING.lock() {
            if ring.len() >= LOG_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(entry);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the capturing logger. Honors `RUST_LOG` like `env_logger::init`.
/// Returns `false` if another logger was installed first. Calling it again
/// once installed is a no-op.
pub fn init_logger() -> bool {
    if INSTALLED.load(Ordering::Acquire) {
        return true;
    }
    LOG_START.get_or_init(Instant::now);
    let inner = env_logger::Builder::new().parse_default_env().build();
    let max_level = inner.filter();
    let logger = DIAG_LOGGER.get_or_init(|| DiagLogger { inner });
    if log::set_logger(logger).is_err() {
        return false;
    }
    log::set_max_level(max_level.max(log::LevelFilter::Info));
    INSTALLED.store(true, Ordering::Release);
    true
}

fn drain_captured_logs(max: usize) -> Vec<CapturedLog> {
    match LOG_RING.lock() {
        Ok(mut ring) => {
            let n = ring.len().min(max);
            ring.drain(..n).collect()
        }
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_allows_ten_per_second() {
        let mut sender = DiagSender::connect("127.0.0.1:9").unwrap();
        let t0 = Instant::now();
        assert!(sender.due(t0));
        assert!(!sender.due(t0 + Duration::from_millis(50)));
        assert!(sender.due(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn stats_reflect_the_world() {
        let mut world = World::new();
        world.spawn((Frame::new(1.0),));
        world.spawn((Frame::manual(),));
        world.insert_resource(FrameTally { fired: 1 });
        collect_stats(&mut world, Vec::new());
        let stats = world.resource::<SimStats>();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.frames_fired, 1);
        assert_eq!(stats.entity_count, 2);
        assert_eq!(stats.spawned, 2);
    }

    #[test]
    fn captured_records_ride_along() {
        assert!(init_logger());
        assert!(init_logger());
        log::warn!("hring capture marker");
        let datagram = Datagram {
            stats: &SimStats::default(),
            logs: drain_captured_logs(LOG_CAPACITY),
        };
        let json = serde_json::to_value(&datagram).unwrap();
        let logs = json["logs"].as_array().cloned().unwrap_or_default();
        assert!(
            logs.iter()
                .any(|l| l["message"] == "hring capture marker" && l["level"] == "WARN"),
            "{logs:?}"
        );
    }

    #[test]
    fn datagram_is_json() {
        let stats = SimStats {
            tick: 3,
            ..SimStats::default()
        };
        let json = serde_json::to_value(Datagram {
            stats: &stats,
            logs: Vec::new(),
        })
        .unwrap();
        assert_eq!(json["stats"]["tick"], 3);
        assert!(json.get("logs").is_none());
    }
}
