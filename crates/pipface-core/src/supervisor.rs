//! Idle/sleep supervisor: inactivity timeout and the auto-revert timer.
//!
//! At most one revert timer is live. Arming cancels the previous one, and
//! every fire carries the generation it was armed with: a fire whose
//! generation is no longer the pending one is ignored, even if the timer task
//! had already pushed it into the queue before it was cancelled.
//!
//! Deadlines are stamped from the engine's injected clock. The timer task only
//! wakes the engine; whether a revert is due is decided against that clock.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::engine::EngineCommand;
use crate::expression::{IDLE, SLEEPING};

/// Default inactivity before falling asleep.
pub const SLEEP_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct PendingRevert {
    generation: u64,
    armed_for: String,
    deadline: Instant,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct IdleSupervisor {
    sleep_timeout: Duration,
    last_activity: Instant,
    generation: u64,
    pending: Option<PendingRevert>,
    queue: mpsc::UnboundedSender<EngineCommand>,
}

impl IdleSupervisor {
    /// `queue` is the engine's own command queue; timer fires go through it.
    pub fn new(
        sleep_timeout: Duration,
        now: Instant,
        queue: mpsc::UnboundedSender<EngineCommand>,
    ) -> Self {
        Self {
            sleep_timeout,
            last_activity: now,
            generation: 0,
            pending: None,
            queue,
        }
    }

    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// True when `current` is awake and has seen no activity for longer than
    /// the timeout.
    pub fn should_sleep(&self, current: &str, now: Instant) -> bool {
        current != SLEEPING && now.saturating_duration_since(self.last_activity) > self.sleep_timeout
    }

    /// Arm a revert to idle at `now + after`, replacing any pending timer.
    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self, expression: &str, after: Duration, now: Instant) -> u64 {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let queue = self.queue.clone();
        let deadline = now + after;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = queue.send(EngineCommand::RevertToIdle { generation });
        });
        debug!(
            "Armed revert #{} for '{}' in {:.2}s",
            generation,
            expression,
            after.as_secs_f64()
        );
        self.pending = Some(PendingRevert {
            generation,
            armed_for: expression.to_string(),
            deadline,
            handle,
        });
        generation
    }

    /// Drop the pending timer, if any. A fire already in flight becomes stale.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
            debug!("Cancelled revert #{}", pending.generation);
        }
    }

    /// Generation of the pending timer if its deadline has passed at `now`.
    pub fn due(&self, now: Instant) -> Option<u64> {
        self.pending
            .as_ref()
            .filter(|p| now >= p.deadline)
            .map(|p| p.generation)
    }

    /// Decide whether a timer fire should revert to idle. Only the pending
    /// generation counts, and only while the arming expression still holds.
    /// A fire that arrives before the deadline leaves the timer pending.
    pub fn on_fire(&mut self, generation: u64, current: &str, now: Instant) -> bool {
        match &self.pending {
            Some(p) if p.generation == generation && now < p.deadline => {
                debug!("Revert #{} woke early, still pending", generation);
                false
            }
            Some(p) if p.generation == generation => {
                let revert = p.armed_for == current && current != IDLE;
                self.pending = None;
                revert
            }
            _ => {
                debug!("Ignoring stale revert #{}", generation);
                false
            }
        }
    }

    pub fn pending_generation(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.generation)
    }
}

impl Drop for IdleSupervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn supervisor() -> (IdleSupervisor, mpsc::UnboundedReceiver<EngineCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (IdleSupervisor::new(SLEEP_TIMEOUT, Instant::now(), tx), rx)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_sleep_after_timeout() {
        let (sup, _rx) = supervisor();
        let start = sup.last_activity();
        assert!(!sup.should_sleep(IDLE, start + Duration::from_secs(300)));
        assert!(sup.should_sleep(IDLE, start + Duration::from_secs(301)));
        assert!(!sup.should_sleep(SLEEPING, start + Duration::from_secs(900)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_pushes_timeout_back() {
        let (mut sup, _rx) = supervisor();
        let start = sup.last_activity();
        sup.record_activity(start + Duration::from_secs(200));
        assert!(!sup.should_sleep(IDLE, start + Duration::from_secs(400)));
        assert!(sup.should_sleep(IDLE, start + Duration::from_secs(501)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_through_queue() {
        let (mut sup, mut rx) = supervisor();
        let gen = sup.arm("happy", Duration::from_secs(2), Instant::now());
        tokio::time::advance(Duration::from_millis(1990)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(20)).await;
        settle().await;
        match rx.try_recv() {
            Ok(EngineCommand::RevertToIdle { generation }) => assert_eq!(generation, gen),
            other => panic!("expected revert, got {:?}", other),
        }
        assert!(sup.on_fire(gen, "happy", Instant::now()));
        assert_eq!(sup.pending_generation(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_cancels_previous_timer() {
        let (mut sup, mut rx) = supervisor();
        sup.arm("happy", Duration::from_secs(2), Instant::now());
        tokio::time::advance(Duration::from_millis(500)).await;
        let second = sup.arm("happy", Duration::from_secs(2), Instant::now());

        tokio::time::advance(Duration::from_millis(1600)).await;
        settle().await;
        assert!(rx.try_recv().is_err(), "first timer must never fire");

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        match rx.try_recv() {
            Ok(EngineCommand::RevertToIdle { generation }) => assert_eq!(generation, second),
            other => panic!("expected revert, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_fire_from_old_generation_is_ignored() {
        let (mut sup, _rx) = supervisor();
        let now = Instant::now();
        let first = sup.arm("happy", Duration::from_secs(2), now);
        let second = sup.arm("thinking", Duration::from_secs(2), now);
        let later = now + Duration::from_secs(2);
        // The first fire slipped into the queue before cancellation landed.
        assert!(!sup.on_fire(first, "happy", later));
        assert_eq!(sup.pending_generation(), Some(second));
        assert!(sup.on_fire(second, "thinking", later));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_ignored_when_expression_moved_on() {
        let (mut sup, _rx) = supervisor();
        let now = Instant::now();
        let gen = sup.arm("happy", Duration::from_secs(2), now);
        assert!(!sup.on_fire(gen, "error", now + Duration::from_secs(2)));
        // Consumed either way.
        assert_eq!(sup.pending_generation(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_follows_manual_clock() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let clock = ManualClock::new();
        let mut sup = IdleSupervisor::new(SLEEP_TIMEOUT, clock.now(), tx);
        let gen = sup.arm("happy", Duration::from_secs(2), clock.now());

        // Tokio time moving on its own does not make the revert due.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(sup.due(clock.now()), None);
        assert!(!sup.on_fire(gen, "happy", clock.now()));
        assert_eq!(sup.pending_generation(), Some(gen));

        clock.advance(Duration::from_millis(2001));
        assert_eq!(sup.due(clock.now()), Some(gen));
        assert!(sup.on_fire(gen, "happy", clock.now()));
    }
}
