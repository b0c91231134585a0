//! Timer adapters: timeout, interval, immediate, and frame loops.
//!
//! All four are tracked resources driven by small Tokio tasks. A timeout or
//! immediate that fires naturally removes itself from the registry
//! (`completed-auto-removed`); intervals and frame loops run until canceled.
//!
//! # Frame loops
//!
//! A frame loop re-arms itself after every frame, so canceling the pending
//! frame alone is not enough: the loop body could already be past the wait
//! and about to schedule the next frame. Teardown therefore uses a double
//! mechanism — the cancellation token wakes the pending wait AND the
//! [`FrameLoopState`] machine moves to `Stopping`, which the body checks
//! before every re-arm and before invoking the callback.
//!
//! ```text
//! Running ──request_stop()──► Stopping ──loop observes──► Stopped
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::handle::{HandleMetrics, ResourceKind};
use crate::id::epoch_millis;
use crate::registry::RegistryError;
use crate::scope::LifecycleScope;

/// Supplies frame timing for frame-loop resources.
///
/// The host decides what a "frame" is; tests and headless hosts use
/// [`IntervalFrameScheduler`].
pub trait FrameScheduler: Send + Sync + 'static {
    /// Resolves when the next frame is due.
    fn next_frame(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Fixed-rate frame scheduler over the Tokio clock.
#[derive(Debug, Clone)]
pub struct IntervalFrameScheduler {
    frame: Duration,
}

impl IntervalFrameScheduler {
    /// Creates a scheduler with a fixed frame duration.
    #[must_use]
    pub const fn new(frame: Duration) -> Self {
        Self { frame }
    }

    /// Creates a scheduler targeting `fps` frames per second.
    ///
    /// Zero is clamped to one frame per second.
    #[must_use]
    pub fn at_fps(fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            frame: Duration::from_secs(1) / fps,
        }
    }
}

impl FrameScheduler for IntervalFrameScheduler {
    fn next_frame(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(self.frame))
    }
}

/// Phase of a frame loop's stop machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLoopPhase {
    /// The loop is re-arming frames.
    Running,
    /// Stop requested; the loop exits before its next re-arm.
    Stopping,
    /// The loop has exited.
    Stopped,
}

/// Explicit stop machine shared between a frame loop and its teardown.
#[derive(Debug)]
pub(crate) struct FrameLoopState(AtomicU8);

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

impl FrameLoopState {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(RUNNING))
    }

    /// Requests the stop transition. Only `Running → Stopping` is valid;
    /// repeat requests and requests after exit are no-ops.
    pub(crate) fn request_stop(&self) {
        let _ = self
            .0
            .compare_exchange(RUNNING, STOPPING, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst) == RUNNING
    }

    pub(crate) fn mark_stopped(&self) {
        self.0.store(STOPPED, Ordering::SeqCst);
    }

    pub(crate) fn phase(&self) -> FrameLoopPhase {
        match self.0.load(Ordering::SeqCst) {
            RUNNING => FrameLoopPhase::Running,
            STOPPING => FrameLoopPhase::Stopping,
            _ => FrameLoopPhase::Stopped,
        }
    }
}

impl LifecycleScope {
    /// Schedules a one-shot callback after `delay`.
    ///
    /// The resource auto-removes once the callback has run; canceling the id
    /// before the deadline suppresses the callback entirely.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> Result<String, RegistryError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.timeout_resource(delay, None, None, callback)
    }

    /// Schedules a repeating callback every `period`.
    ///
    /// The first fire happens one period after registration. Runs until
    /// canceled.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn set_interval<F>(&self, period: Duration, callback: F) -> Result<String, RegistryError>
    where
        F: FnMut() + Send + 'static,
    {
        self.interval_resource(period, None, None, callback)
    }

    /// Schedules a callback for the next scheduler turn.
    ///
    /// The resource auto-removes after running.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn set_immediate<F>(&self, callback: F) -> Result<String, RegistryError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_open()?;
        let id = self.next_id(ResourceKind::Immediate);
        let token = CancellationToken::new();
        let metrics = Arc::new(HandleMetrics::new());

        let cancel_token = token.clone();
        self.track(
            ResourceKind::Immediate,
            id.clone(),
            Box::new(move || {
                cancel_token.cancel();
                Ok(())
            }),
            None,
            None,
            Arc::clone(&metrics),
        )?;

        let registry = Arc::downgrade(self.registry());
        let task_id = id.clone();
        self.runtime().spawn(async move {
            tokio::task::yield_now().await;
            if token.is_cancelled() {
                return;
            }
            metrics.record_trigger(epoch_millis());
            callback();
            if let Some(registry) = registry.upgrade() {
                registry.discard(&task_id);
            }
        });
        Ok(id)
    }

    /// Starts a self-rescheduling frame loop.
    ///
    /// `on_frame` receives the zero-based frame index. The loop checks its
    /// stop machine before every re-arm, so no frame callback fires after
    /// cancellation even when a frame is already scheduled at that moment.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn spawn_frame_loop<F>(
        &self,
        scheduler: Arc<dyn FrameScheduler>,
        mut on_frame: F,
    ) -> Result<String, RegistryError>
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.ensure_open()?;
        let id = self.next_id(ResourceKind::FrameLoop);
        let token = CancellationToken::new();
        let metrics = Arc::new(HandleMetrics::new());
        let state = Arc::new(FrameLoopState::new());

        let cancel_token = token.clone();
        let cancel_state = Arc::clone(&state);
        self.track(
            ResourceKind::FrameLoop,
            id.clone(),
            Box::new(move || {
                // Double mechanism: flip the stop machine so an in-flight
                // body does not re-arm, then wake the pending frame wait.
                cancel_state.request_stop();
                cancel_token.cancel();
                Ok(())
            }),
            None,
            None,
            Arc::clone(&metrics),
        )?;

        self.runtime().spawn(async move {
            let mut frame_index: u64 = 0;
            loop {
                if !state.is_running() {
                    break;
                }
                tokio::select! {
                    () = token.cancelled() => break,
                    () = scheduler.next_frame() => {
                        if !state.is_running() || token.is_cancelled() {
                            break;
                        }
                        metrics.record_trigger(epoch_millis());
                        on_frame(frame_index);
                        frame_index += 1;
                    }
                }
            }
            state.mark_stopped();
        });
        Ok(id)
    }

    /// Timeout with cascade metadata; shared with the socket adapter for
    /// pending reconnect timers.
    pub(crate) fn timeout_resource<F>(
        &self,
        delay: Duration,
        description: Option<String>,
        parent: Option<String>,
        callback: F,
    ) -> Result<String, RegistryError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_open()?;
        let id = self.next_id(ResourceKind::Timeout);
        let token = CancellationToken::new();
        let metrics = Arc::new(HandleMetrics::new());

        let cancel_token = token.clone();
        self.track(
            ResourceKind::Timeout,
            id.clone(),
            Box::new(move || {
                cancel_token.cancel();
                Ok(())
            }),
            description,
            parent,
            Arc::clone(&metrics),
        )?;

        let registry = Arc::downgrade(self.registry());
        let task_id = id.clone();
        self.runtime().spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if !token.is_cancelled() {
                        metrics.record_trigger(epoch_millis());
                        callback();
                        if let Some(registry) = registry.upgrade() {
                            registry.discard(&task_id);
                        }
                    }
                }
            }
        });
        Ok(id)
    }

    /// Interval with cascade metadata; shared with the socket adapter for
    /// heartbeats.
    pub(crate) fn interval_resource<F>(
        &self,
        period: Duration,
        description: Option<String>,
        parent: Option<String>,
        mut callback: F,
    ) -> Result<String, RegistryError>
    where
        F: FnMut() + Send + 'static,
    {
        self.ensure_open()?;
        let id = self.next_id(ResourceKind::Interval);
        let token = CancellationToken::new();
        let metrics = Arc::new(HandleMetrics::new());

        let cancel_token = token.clone();
        self.track(
            ResourceKind::Interval,
            id.clone(),
            Box::new(move || {
                cancel_token.cancel();
                Ok(())
            }),
            description,
            parent,
            Arc::clone(&metrics),
        )?;

        self.runtime().spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut timer = tokio::time::interval_at(start, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = timer.tick() => {
                        if token.is_cancelled() {
                            break;
                        }
                        metrics.record_trigger(epoch_millis());
                        callback();
                    }
                }
            }
        });
        Ok(id)
    }
}
