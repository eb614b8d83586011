//! Cancelable interval timers, at most one per [`TimerKind`].
//!
//! Each timer is a tokio task driven by `tokio::time::interval` and guarded
//! by its own child `CancellationToken`. Starting a kind that is already
//! running cancels the old task first.

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Idle,
    Earthquake,
}

/// What a tick callback wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

struct Timer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    parent: CancellationToken,
    timers: HashMap<TimerKind, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_parent(CancellationToken::new())
    }

    /// Timers also stop when `parent` is cancelled (process shutdown).
    pub fn with_parent(parent: CancellationToken) -> Self {
        Self {
            parent,
            timers: HashMap::new(),
        }
    }

    /// Run `on_tick` every `period` until it returns [`TickFlow::Stop`] or
    /// the timer is cancelled. The first call happens after one period.
    pub fn start_interval<F>(&mut self, kind: TimerKind, period: Duration, mut on_tick: F)
    where
        F: FnMut() -> TickFlow + Send + 'static,
    {
        self.stop(kind);

        let token = self.parent.child_token();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {
                        if on_tick() == TickFlow::Stop {
                            break;
                        }
                    }
                }
            }
            debug!(?kind, "Timer finished");
        });

        self.timers.insert(kind, Timer { token, handle });
    }

    /// Cancel one timer. Returns whether it was still running.
    pub fn stop(&mut self, kind: TimerKind) -> bool {
        match self.timers.remove(&kind) {
            Some(timer) => {
                let was_running = !timer.handle.is_finished();
                timer.token.cancel();
                was_running
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.token.cancel();
        }
    }

    pub fn is_running(&self, kind: TimerKind) -> bool {
        self.timers
            .get(&kind)
            .is_some_and(|t| !t.handle.is_finished() && !t.token.is_cancelled())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> TickFlow + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
            TickFlow::Continue
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticks_until_stopped() {
        let mut scheduler = Scheduler::new();
        let (count, tick) = counter();
        scheduler.start_interval(TimerKind::Idle, Duration::from_millis(100), tick);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_running(TimerKind::Idle));

        assert!(scheduler.stop(TimerKind::Idle));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!scheduler.is_running(TimerKind::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_existing_timer() {
        let mut scheduler = Scheduler::new();
        let (first, tick_a) = counter();
        let (second, tick_b) = counter();

        scheduler.start_interval(TimerKind::Earthquake, Duration::from_millis(50), tick_a);
        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.start_interval(TimerKind::Earthquake, Duration::from_millis(50), tick_b);
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flow_ends_timer() {
        let mut scheduler = Scheduler::new();
        let mut left = 2;
        scheduler.start_interval(TimerKind::Earthquake, Duration::from_millis(50), move || {
            left -= 1;
            if left == 0 {
                TickFlow::Stop
            } else {
                TickFlow::Continue
            }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!scheduler.is_running(TimerKind::Earthquake));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_and_stop_all() {
        let parent = CancellationToken::new();
        let mut scheduler = Scheduler::with_parent(parent.clone());
        let (idle, tick_a) = counter();
        let (_, tick_b) = counter();
        scheduler.start_interval(TimerKind::Idle, Duration::from_millis(100), tick_a);
        scheduler.start_interval(TimerKind::Earthquake, Duration::from_millis(50), tick_b);

        parent.cancel();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(idle.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_running(TimerKind::Idle));

        scheduler.stop_all();
        assert!(!scheduler.stop(TimerKind::Earthquake));
    }
}
