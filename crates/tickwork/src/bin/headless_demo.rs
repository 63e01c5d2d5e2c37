//! # TICKWORK Headless Demo
//!
//! Runs a short simulated session with no window and no engine:
//! - `Gunner` is tick-bound to `FixedUpdate`, fires pooled projectiles and
//!   reports hits on the bus
//! - `Scoreboard` only listens to the bus
//! - a repeating wave timer pulses every 250ms and clears a wave every second
//!
//! ```bash
//! RUST_LOG=debug cargo run --bin headless_demo -- tickwork.toml
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tickwork::core::{
    EventBus, ObjectPool, Poolable, Service, ServiceRegistry, TickPhase, TickService, TimeMode,
    TimerSpec,
};
use tickwork::{HostLoop, Runtime, RuntimeResult};
use tracing_subscriber::EnvFilter;

/// 60 FPS host frames.
const FRAME_TIME: Duration = Duration::from_micros(16_666);

/// Frames to simulate (about five seconds).
const FRAMES: u64 = 300;

#[derive(Default)]
struct Projectile {
    position: [f32; 2],
    velocity: [f32; 2],
}

impl Poolable for Projectile {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Fires one projectile per fixed step; every eighth one is a hit.
struct Gunner {
    pool: Arc<ObjectPool>,
    bus: Arc<EventBus>,
    shots: AtomicU32,
}

impl Service for Gunner {
    fn construct(registry: &ServiceRegistry) -> Self {
        Self {
            pool: registry.get::<ObjectPool>(),
            bus: registry.get::<EventBus>(),
            shots: AtomicU32::new(0),
        }
    }
}

impl TickService for Gunner {
    const PHASE: TickPhase = TickPhase::FixedUpdate;

    fn tick(&self) {
        let shot = self.shots.fetch_add(1, Ordering::Relaxed) + 1;
        let mut projectile: Projectile = self.pool.acquire("projectile");
        projectile.velocity = [0.0, 30.0];
        projectile.position[1] += projectile.velocity[1] * 0.02;

        if shot % 8 == 0 {
            let _ = self.bus.publish("enemy.down", &10_u64);
        }
        let _ = self.pool.release("projectile", projectile);
    }
}

/// Keeps the score. Knows nothing but the bus.
struct Scoreboard {
    score: Arc<AtomicU64>,
    waves: Arc<AtomicU32>,
}

impl Service for Scoreboard {
    fn construct(registry: &ServiceRegistry) -> Self {
        let bus = registry.get::<EventBus>();
        let score = Arc::new(AtomicU64::new(0));
        let waves = Arc::new(AtomicU32::new(0));

        let total = Arc::clone(&score);
        if let Err(err) = bus.subscribe("enemy.down", move |points: &u64| {
            total.fetch_add(*points, Ordering::Relaxed);
        }) {
            tracing::error!(%err, "scoreboard could not subscribe");
        }
        let cleared = Arc::clone(&waves);
        if let Err(err) = bus.subscribe("wave.cleared", move |wave: &u32| {
            cleared.store(*wave, Ordering::Relaxed);
            tracing::info!(wave, "wave cleared");
        }) {
            tracing::error!(%err, "scoreboard could not subscribe");
        }

        Self { score, waves }
    }
}

fn main() -> RuntimeResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = match std::env::args().nth(1) {
        Some(path) => Runtime::from_config_file(path)?,
        None => Runtime::new(),
    };

    let scoreboard = runtime.service::<Scoreboard>();
    let _ = runtime.registry().tick_bound::<Gunner>();

    // Waves: a pulse every 250ms, a cleared wave every second.
    let bus = Arc::clone(runtime.events());
    let pulse_bus = Arc::clone(runtime.events());
    let wave = Arc::new(AtomicU32::new(0));
    runtime.events().subscribe_signal("wave.pulse", || tracing::debug!("wave pulse"))?;
    let _ = runtime.timers().create(
        TimerSpec::repeating(Duration::from_secs(1))
            .interval(Duration::from_millis(250))
            .on_interval(move |_| {
                let _ = pulse_bus.publish_signal("wave.pulse");
            })
            .on_complete(move |_| {
                let number = wave.fetch_add(1, Ordering::Relaxed) + 1;
                let _ = bus.publish("wave.cleared", &number);
            }),
    )?;

    // A decoy that lingers on screen for half a wall-clock second.
    let decoy: Projectile = runtime.pool().acquire("projectile");
    let _ = runtime.release_after("projectile", "", decoy, Duration::from_millis(500), TimeMode::WallClock)?;

    let mut host = HostLoop::new(runtime);
    let totals = host.run_frames(FRAMES, FRAME_TIME).clone();

    let runtime = host.runtime();
    let projectiles = runtime.pool().stats("projectile", "").unwrap_or_default();
    tracing::info!(
        frames = totals.frames_recorded,
        fixed_steps = totals.fixed_steps,
        timers_fired = totals.timers_fired,
        slow_frames = totals.slow_frames,
        "session finished"
    );
    tracing::info!(
        score = scoreboard.score.load(Ordering::Relaxed),
        waves = scoreboard.waves.load(Ordering::Relaxed),
        "scoreboard"
    );
    tracing::info!(
        created = projectiles.created,
        reused = projectiles.reused,
        idle = projectiles.idle,
        "projectile pool"
    );
    Ok(())
}
