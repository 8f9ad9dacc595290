//! The animation engine: single owner of the face, the particles and the
//! supervisor. Everything that wants to change state sends an
//! [`EngineCommand`] into the engine's queue; the tick loop drains it at the
//! start of every tick, in arrival order, and then runs the tick body.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::command::Command;
use crate::config::Config;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::expression::{ExpressionTable, IDLE, SLEEPING};
use crate::face::FaceState;
use crate::motion::{Motion, MotionInput};
use crate::particles::{ParticleKind, ParticleSystem};
use crate::supervisor::IdleSupervisor;
use crate::types::*;

/// Largest `dt` a single tick will integrate. Longer stalls are skipped over.
pub const MAX_DT: f32 = 0.25;

/// Longest auto-revert a command may request, in seconds. Longer or
/// unrepresentable durations are ignored.
pub const MAX_REVERT_SECS: f64 = 86_400.0;

/// Messages that can be sent TO the engine (from the channel, renderer, timers)
#[derive(Debug)]
pub enum EngineCommand {
    /// A decoded command datagram
    Wire(Command),
    /// Pointer position in canvas pixels
    Focus { x: f32, y: f32 },
    /// Auto-revert timer fired
    RevertToIdle { generation: u64 },
    Stop,
}

/// Everything a tick mutates. Cloned before the tick body runs and restored
/// if the body fails.
#[derive(Debug, Clone)]
struct Animation {
    face: FaceState,
    particles: ParticleSystem,
    motion: Motion,
    float_y: f32,
    elapsed: f32,
    particle_cooldown: f32,
}

pub struct Engine {
    config: Config,
    table: ExpressionTable,
    clock: Arc<dyn Clock>,

    anim: Animation,
    supervisor: IdleSupervisor,
    expression: &'static str,
    speech_amplitude: f32,
    pointer: Option<(f32, f32)>,
    tick: u64,
    fps: u32,
    rejected: u64,
    rng: StdRng,

    event_tx: broadcast::Sender<EngineEvent>,
    snapshot_tx: watch::Sender<FaceSnapshot>,
    command_tx: mpsc::UnboundedSender<EngineCommand>,
    command_rx: mpsc::UnboundedReceiver<EngineCommand>,
}

impl Engine {
    /// Build an engine resting on `idle`.
    pub fn new(config: Config, table: ExpressionTable, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        let (event_tx, _) = broadcast::channel(256);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let idle = table.lookup(IDLE)?;
        let mut params = FaceParameters::default();
        idle.params.apply_to(&mut params);
        let face = FaceState::at_rest(params, config.blend_rate);
        let fps = config.fps_for(idle.low_activity);
        let expression = idle.name;

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let supervisor = IdleSupervisor::new(config.sleep_timeout(), clock.now(), command_tx.clone());

        let anim = Animation {
            face,
            particles: ParticleSystem::new(config.max_particles),
            motion: Motion::new(),
            float_y: 0.0,
            elapsed: 0.0,
            particle_cooldown: 0.0,
        };

        let snapshot = FaceSnapshot {
            expression: expression.to_string(),
            params: *anim.face.live(),
            float_y: 0.0,
            particles: Vec::new(),
            fps,
            tick: 0,
            canvas_width: config.canvas_width,
            canvas_height: config.canvas_height,
        };
        let (snapshot_tx, _) = watch::channel(snapshot);

        Ok(Self {
            config,
            table,
            clock,
            anim,
            supervisor,
            expression,
            speech_amplitude: 0.0,
            pointer: None,
            tick: 0,
            fps,
            rejected: 0,
            rng,
            event_tx,
            snapshot_tx,
            command_tx,
            command_rx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub fn command_sender(&self) -> mpsc::UnboundedSender<EngineCommand> {
        self.command_tx.clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<FaceSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn expression(&self) -> &str {
        self.expression
    }

    pub fn live(&self) -> &FaceParameters {
        self.anim.face.live()
    }

    pub fn target(&self) -> &FaceParameters {
        self.anim.face.target()
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.anim.particles
    }

    pub fn speech_amplitude(&self) -> f32 {
        self.speech_amplitude
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Expression names rejected since start.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    fn broadcast(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    fn center(&self) -> (f32, f32) {
        (self.config.canvas_width / 2.0, self.config.canvas_height / 2.0)
    }

    fn emit_origin(&self) -> (f32, f32) {
        (self.config.canvas_width / 2.0, self.config.canvas_height / 3.0)
    }

    // ── Main loop ──

    /// Tick until [`EngineCommand::Stop`] arrives. The interval follows the
    /// active expression's category, and `dt` is measured from the clock.
    pub async fn run(mut self) {
        info!("Engine running at {} fps on '{}'", self.fps, self.expression);

        let mut fps = self.fps;
        let mut interval = tick_interval(fps);
        let mut last = self.clock.now();

        loop {
            interval.tick().await;
            let now = self.clock.now();
            let dt = now.saturating_duration_since(last).as_secs_f32().min(MAX_DT);
            last = now;

            if !self.step(dt) {
                break;
            }

            if self.fps != fps {
                fps = self.fps;
                interval = tick_interval(fps);
            }
        }

        self.supervisor.cancel();
        info!("Engine stopped after {} ticks", self.tick);
    }

    /// One full tick: drain the queue, check for sleep, run the contained
    /// tick body, publish a snapshot. Returns false once stopped.
    pub fn step(&mut self, dt: f32) -> bool {
        while let Ok(cmd) = self.command_rx.try_recv() {
            match cmd {
                EngineCommand::Wire(command) => self.apply_wire(command),
                EngineCommand::Focus { x, y } => {
                    if x.is_finite() && y.is_finite() {
                        self.pointer = Some((x, y));
                    } else {
                        debug!("Ignoring non-finite focus ({}, {})", x, y);
                    }
                }
                EngineCommand::RevertToIdle { generation } => self.fire_revert(generation),
                EngineCommand::Stop => return false,
            }
        }

        if let Some(generation) = self.supervisor.due(self.clock.now()) {
            self.fire_revert(generation);
        }

        if self.supervisor.should_sleep(self.expression, self.clock.now()) {
            self.enter_known(SLEEPING, TransitionReason::SleepTimeout);
        }

        self.contained_tick(dt);
        self.tick += 1;
        self.publish();
        true
    }

    // ── Commands ──

    fn fire_revert(&mut self, generation: u64) {
        if self
            .supervisor
            .on_fire(generation, self.expression, self.clock.now())
        {
            self.enter_known(IDLE, TransitionReason::AutoRevert);
        }
    }

    fn apply_wire(&mut self, cmd: Command) {
        self.supervisor.record_activity(self.clock.now());

        if self.expression == SLEEPING {
            self.enter_known(IDLE, TransitionReason::Wake);
        }

        let mut entered = None;
        for name in [cmd.expression.as_deref(), cmd.emotion.as_deref()]
            .into_iter()
            .flatten()
        {
            match self.enter(name, TransitionReason::Command) {
                Ok(()) => entered = Some(self.expression),
                Err(e) => {
                    warn!("Rejected command: {}", e);
                    self.rejected += 1;
                    self.broadcast(EngineEvent::Rejected(RejectedData {
                        name: name.to_string(),
                    }));
                }
            }
        }

        if let Some(amplitude) = cmd.amplitude {
            if amplitude.is_finite() {
                self.speech_amplitude = amplitude.clamp(0.0, 1.0);
            }
        }

        if let Some(kind) = cmd.particle.as_deref() {
            let kind = ParticleKind::parse(kind);
            let (x, y) = self.emit_origin();
            self.anim
                .particles
                .emit(&mut self.rng, x, y, &kind, cmd.particle_count());
        }

        match (cmd.duration, entered) {
            (Some(d), Some(expr)) if expr != IDLE => match revert_after(d) {
                Some(after) => {
                    let now = self.clock.now();
                    self.supervisor.arm(expr, after, now);
                }
                None => debug!("Ignoring duration {} (out of range)", d),
            },
            (Some(d), _) => debug!("Ignoring duration {} (nothing to revert)", d),
            _ => {}
        }

        let ack = Ack::new(self.expression, cmd.expression.as_deref());
        self.broadcast(EngineEvent::Ack(ack));
    }

    /// Make `name` the active expression. Any pending revert is cancelled,
    /// including when re-entering the current expression.
    fn enter(&mut self, name: &str, reason: TransitionReason) -> Result<(), EngineError> {
        let expr = self.table.lookup(name)?;
        self.supervisor.cancel();
        self.anim.face.set_target(expr);

        let from = self.expression;
        if from != expr.name {
            self.expression = expr.name;
            self.anim.particle_cooldown = 0.0;
            info!("Expression {} -> {} ({})", from, expr.name, reason);
            self.broadcast(EngineEvent::Expression(TransitionData {
                from: from.to_string(),
                to: expr.name.to_string(),
                reason,
            }));
        }

        let fps = self.config.fps_for(expr.low_activity);
        if fps != self.fps {
            self.fps = fps;
            debug!("Tick rate now {} fps", fps);
            self.broadcast(EngineEvent::Rate(RateData { fps }));
        }
        Ok(())
    }

    /// For the base states the table is guaranteed to hold.
    fn enter_known(&mut self, name: &str, reason: TransitionReason) {
        if let Err(e) = self.enter(name, reason) {
            error!("Cannot enter base state: {}", e);
        }
    }

    // ── Tick ──

    fn contained_tick(&mut self, dt: f32) {
        let backup = self.anim.clone();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.tick_body(dt)));
        let err = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(_) => EngineError::TickPanicked,
        };
        self.anim = backup;
        error!("Tick {} rolled back: {}", self.tick, err);
        self.broadcast(EngineEvent::TickFailed(TickFailedData {
            tick: self.tick,
            error: err.to_string(),
        }));
    }

    fn tick_body(&mut self, dt: f32) -> Result<(), EngineError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(EngineError::NonFiniteTick { field: "dt" });
        }
        let center = self.center();
        let origin = self.emit_origin();
        let expr = self.table.lookup(self.expression)?;
        let anim = &mut self.anim;

        anim.elapsed += dt;
        anim.face.tick(dt);
        anim.float_y = expr.float.offset(anim.elapsed);

        let input = MotionInput {
            expression: expr,
            speech_amplitude: self.speech_amplitude,
            pointer: self.pointer,
            center,
            pointer_range: self.config.pointer_range,
            saccade_distance: self.config.saccade_distance,
            elapsed: anim.elapsed,
        };
        anim.motion.update(&mut anim.face, &input, &mut self.rng, dt);

        if let Some(auto) = &expr.particles {
            anim.particle_cooldown -= dt;
            if anim.particle_cooldown <= 0.0 {
                anim.particles
                    .emit(&mut self.rng, origin.0, origin.1, &auto.kind, auto.count);
                // Carry the remainder so the cadence does not drift with dt.
                anim.particle_cooldown = (anim.particle_cooldown + auto.cooldown).max(0.0);
            }
        }
        anim.particles.tick(dt);

        if let Some(field) = anim
            .face
            .live()
            .first_non_finite()
            .or_else(|| anim.face.target().first_non_finite())
        {
            return Err(EngineError::NonFiniteTick { field });
        }
        if !anim.float_y.is_finite() {
            return Err(EngineError::NonFiniteTick { field: "float_y" });
        }
        Ok(())
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(FaceSnapshot {
            expression: self.expression.to_string(),
            params: *self.anim.face.live(),
            float_y: self.anim.float_y,
            particles: self.anim.particles.particles().to_vec(),
            fps: self.fps,
            tick: self.tick,
            canvas_width: self.config.canvas_width,
            canvas_height: self.config.canvas_height,
        });
    }
}

fn revert_after(seconds: f64) -> Option<Duration> {
    if seconds > 0.0 && seconds <= MAX_REVERT_SECS {
        Duration::try_from_secs_f64(seconds).ok()
    } else {
        None
    }
}

fn tick_interval(fps: u32) -> tokio::time::Interval {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, TokioClock};

    fn engine() -> Engine {
        let config = Config {
            rng_seed: Some(7),
            ..Config::default()
        };
        Engine::new(config, ExpressionTable::builtin(), Arc::new(TokioClock)).unwrap()
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    /// Advance paused time in steps of the engine's current tick period.
    async fn run_for(engine: &mut Engine, seconds: f32) {
        let mut remaining = seconds;
        while remaining > 1e-6 {
            let period = Duration::from_secs_f64(1.0 / engine.fps() as f64);
            tokio::time::advance(period).await;
            settle().await;
            let dt = period.as_secs_f32();
            assert!(engine.step(dt));
            remaining -= dt;
        }
    }

    fn send(engine: &Engine, cmd: Command) {
        engine.command_sender().send(EngineCommand::Wire(cmd)).unwrap();
    }

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    fn transitions(events: &[EngineEvent]) -> Vec<(String, String, TransitionReason)> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Expression(t) => Some((t.from.clone(), t.to.clone(), t.reason)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_at_rest_on_idle() {
        let engine = engine();
        assert_eq!(engine.expression(), IDLE);
        assert_eq!(engine.live(), engine.target());
        assert_eq!(engine.fps(), 20);
        assert_eq!(engine.snapshots().borrow().expression, IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thinking_is_acknowledged() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        send(&engine, Command::expression("thinking"));
        run_for(&mut engine, 0.1).await;

        let acks: Vec<Ack> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Ack(a) => Some(a),
                _ => None,
            })
            .collect();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].state, "thinking");
        assert_eq!(acks[0].command, "thinking");
        assert_eq!(engine.expression(), "thinking");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_expression_rejected_state_unchanged() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        send(&engine, Command::expression("grumpy"));
        run_for(&mut engine, 0.05).await;

        assert_eq!(engine.expression(), IDLE);
        assert_eq!(engine.rejected_count(), 1);
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Rejected(r) if r.name == "grumpy")));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Ack(a) if a.state == IDLE && a.command == "grumpy")));
        assert!(transitions(&events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_asleep_exactly_once() {
        let mut engine = engine();
        let mut rx = engine.subscribe();

        run_for(&mut engine, 299.9).await;
        assert_eq!(engine.expression(), IDLE);

        run_for(&mut engine, 1.2).await;
        assert_eq!(engine.expression(), SLEEPING);

        run_for(&mut engine, 120.0).await;
        let sleeps: Vec<_> = transitions(&drain(&mut rx))
            .into_iter()
            .filter(|t| t.2 == TransitionReason::SleepTimeout)
            .collect();
        assert_eq!(sleeps.len(), 1);
        assert_eq!(engine.expression(), SLEEPING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_goes_through_idle() {
        let mut engine = engine();
        send(&engine, Command::expression(SLEEPING));
        run_for(&mut engine, 0.05).await;
        assert_eq!(engine.expression(), SLEEPING);

        let mut rx = engine.subscribe();
        send(&engine, Command::expression("thinking"));
        run_for(&mut engine, 0.05).await;

        assert_eq!(
            transitions(&drain(&mut rx)),
            vec![
                (SLEEPING.to_string(), IDLE.to_string(), TransitionReason::Wake),
                (IDLE.to_string(), "thinking".to_string(), TransitionReason::Command),
            ]
        );
        assert_eq!(engine.expression(), "thinking");
    }

    #[tokio::test(start_paused = true)]
    async fn test_particle_only_command_wakes() {
        let mut engine = engine();
        send(&engine, Command::expression(SLEEPING));
        run_for(&mut engine, 0.05).await;
        send(&engine, Command::particle("heart"));
        run_for(&mut engine, 0.05).await;
        assert_eq!(engine.expression(), IDLE);
        assert_eq!(engine.particles().count_of(&ParticleKind::Heart), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_reverts_once_from_second_arming() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        send(&engine, Command::expression("happy").with_duration(2.0));
        run_for(&mut engine, 0.5).await;
        send(&engine, Command::expression("happy").with_duration(2.0));

        // First timer would have fired at 2.0s.
        run_for(&mut engine, 1.8).await;
        assert_eq!(engine.expression(), "happy");

        run_for(&mut engine, 0.4).await;
        assert_eq!(engine.expression(), IDLE);

        run_for(&mut engine, 3.0).await;
        let reverts: Vec<_> = transitions(&drain(&mut rx))
            .into_iter()
            .filter(|t| t.2 == TransitionReason::AutoRevert)
            .collect();
        assert_eq!(reverts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_duration_is_ignored() {
        let mut engine = engine();
        let payloads: [&[u8]; 3] = [
            br#"{"expression":"happy","duration":1e30}"#,
            br#"{"expression":"happy","duration":1e17}"#,
            br#"{"expression":"happy","duration":-3}"#,
        ];
        for payload in payloads {
            send(&engine, Command::decode(payload).unwrap());
            assert!(engine.step(0.05));
            assert_eq!(engine.expression(), "happy");
            assert_eq!(engine.supervisor.pending_generation(), None);
        }

        // The engine keeps serving commands afterwards.
        send(&engine, Command::expression("thinking").with_duration(1.0));
        run_for(&mut engine, 1.2).await;
        assert_eq!(engine.expression(), IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emotion_enters_and_acks_unknown() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        send(&engine, Command::emotion("happy"));
        run_for(&mut engine, 0.05).await;

        assert_eq!(engine.expression(), "happy");
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Ack(a) if a.state == "happy" && a.command == "unknown")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_emotion_applies_after_expression() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        let mut cmd = Command::expression("thinking");
        cmd.emotion = Some("happy".to_string());
        send(&engine, cmd);
        run_for(&mut engine, 0.05).await;

        assert_eq!(engine.expression(), "happy");
        assert_eq!(
            transitions(&drain(&mut rx)),
            vec![
                (IDLE.to_string(), "thinking".to_string(), TransitionReason::Command),
                ("thinking".to_string(), "happy".to_string(), TransitionReason::Command),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_emotion_with_duration_reverts() {
        let mut engine = engine();
        send(&engine, Command::emotion("happy").with_duration(2.0));
        run_for(&mut engine, 1.9).await;
        assert_eq!(engine.expression(), "happy");
        run_for(&mut engine, 0.2).await;
        assert_eq!(engine.expression(), IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_clock_drives_sleep_and_revert() {
        let clock = Arc::new(ManualClock::new());
        let config = Config {
            rng_seed: Some(7),
            ..Config::default()
        };
        let mut engine =
            Engine::new(config, ExpressionTable::builtin(), clock.clone()).unwrap();

        send(&engine, Command::expression("happy").with_duration(2.0));
        assert!(engine.step(0.05));
        clock.advance(Duration::from_millis(1900));
        assert!(engine.step(0.05));
        assert_eq!(engine.expression(), "happy");

        // No tokio time has passed; the injected clock alone makes it due.
        clock.advance(Duration::from_millis(200));
        assert!(engine.step(0.05));
        assert_eq!(engine.expression(), IDLE);

        clock.advance(Duration::from_secs(301));
        assert!(engine.step(0.05));
        assert_eq!(engine.expression(), SLEEPING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_timer_leaves_error_holding() {
        let mut engine = engine();
        send(&engine, Command::expression("happy").with_duration(2.0));
        run_for(&mut engine, 0.5).await;
        send(&engine, Command::expression("error"));
        run_for(&mut engine, 2.0).await;

        assert_eq!(engine.expression(), "error");
        assert!(engine.live().shake > 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thinking_bubbles_reach_steady_state() {
        let mut engine = engine();
        send(&engine, Command::expression("thinking"));
        run_for(&mut engine, 2.5).await;
        for _ in 0..25 {
            run_for(&mut engine, 0.1).await;
            let bubbles = engine.particles().count_of(&ParticleKind::Bubble);
            assert!((9..=18).contains(&bubbles), "bubble count {}", bubbles);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_finite_dt_is_contained() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        send(&engine, Command::particle("star"));
        run_for(&mut engine, 0.05).await;
        let before = engine.particles().particles().to_vec();
        let live = *engine.live();

        assert!(engine.step(f32::NAN));
        assert_eq!(engine.particles().particles(), &before[..]);
        assert_eq!(engine.live(), &live);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, EngineEvent::TickFailed(_))));

        // Next tick runs normally.
        run_for(&mut engine, 0.05).await;
        assert!(engine.particles().particles()[0].life < before[0].life);
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_target_rolls_back_live() {
        let mut engine = engine();
        let live = *engine.live();
        engine.anim.face.target_mut().mouth_open = f32::NAN;
        assert!(engine.step(0.05));
        assert_eq!(engine.live(), &live);
        assert_eq!(engine.tick_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_amplitude_drives_mouth() {
        let mut engine = engine();
        send(&engine, Command::expression("speaking").with_amplitude(0.5));
        run_for(&mut engine, 0.1).await;
        assert_eq!(engine.speech_amplitude(), 0.5);
        assert!((engine.live().mouth_open - 0.5).abs() < 1e-6);
        assert!((engine.snapshots().borrow().params.mouth_open - 0.5).abs() < 1e-6);

        send(&engine, Command::default().with_amplitude(7.0));
        run_for(&mut engine, 0.05).await;
        assert_eq!(engine.speech_amplitude(), 1.0);
        assert_eq!(engine.expression(), "speaking");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_follows_category_without_resetting_particles() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        send(&engine, Command::expression("happy").with_particle("heart", Some(4)));
        run_for(&mut engine, 0.1).await;
        assert_eq!(engine.fps(), 30);
        let lives: Vec<f32> = engine.particles().particles().iter().map(|p| p.life).collect();

        send(&engine, Command::expression(IDLE));
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(engine.step(0.05));
        assert_eq!(engine.fps(), 20);
        for (p, before) in engine.particles().particles().iter().zip(&lives) {
            assert!((before - p.life - 0.05).abs() < 1e-4);
        }

        let rates: Vec<u32> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Rate(r) => Some(r.fps),
                _ => None,
            })
            .collect();
        assert_eq!(rates, vec![30, 20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_moves_tracked_pupils() {
        let mut engine = engine();
        engine
            .command_sender()
            .send(EngineCommand::Focus { x: 300.0, y: 150.0 })
            .unwrap();
        run_for(&mut engine, 2.0).await;
        assert!((engine.live().pupil_x - 0.5).abs() < 1e-3);
        assert!(engine.live().pupil_y.abs() < 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_step() {
        let mut engine = engine();
        engine.command_sender().send(EngineCommand::Stop).unwrap();
        assert!(!engine.step(0.05));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_applies_commands_and_stops() {
        let engine = engine();
        let tx = engine.command_sender();
        let snapshots = engine.snapshots();
        let handle = tokio::spawn(engine.run());

        tx.send(EngineCommand::Wire(Command::expression("working"))).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        {
            let snap = snapshots.borrow();
            assert_eq!(snap.expression, "working");
            assert_eq!(snap.fps, 30);
            assert!(snap.tick > 5);
        }

        tx.send(EngineCommand::Stop).unwrap();
        handle.await.unwrap();
    }
}
