//! Delayed, coalescing update throttle.
//!
//! [`DelayedThrottle`] rate-limits a hot trigger stream (cursor movement)
//! into a bounded-frequency action: the first trigger in an idle period
//! waits one throttle window before the action runs once, and triggers
//! arriving while a wait or a run is outstanding coalesce: at most one run
//! per window, at most one pending at any time. The action executed is
//! always the most recently bound one, so rebinding between trigger and
//! fire takes effect.
//!
//! The phase logic lives in [`ThrottleState`], a plain state machine with a
//! single pending slot, so the coalescing contract is testable without any
//! timing. The async driver around it is one background task: wake on
//! trigger, sleep one window, run the latest action, loop while a trigger
//! landed mid-run.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Phase of the throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePhase {
	/// No wait or run outstanding.
	Idle,
	/// A trigger arrived; the window is counting down.
	Waiting,
	/// The action is executing.
	Running,
}

/// Explicit throttle state machine with one pending slot.
///
/// Triggers during `Waiting` need no bookkeeping: the upcoming fire already
/// covers them, since the action and its inputs are read at fire time.
/// Triggers during `Running` set the pending slot, buying exactly one
/// follow-up window.
#[derive(Debug)]
pub struct ThrottleState {
	phase: ThrottlePhase,
	pending: bool,
}

impl ThrottleState {
	/// A fresh, idle machine.
	pub fn new() -> Self {
		Self {
			phase: ThrottlePhase::Idle,
			pending: false,
		}
	}

	/// Current phase.
	pub fn phase(&self) -> ThrottlePhase {
		self.phase
	}

	/// A trigger arrived. Returns true when the caller must start a wait.
	pub fn on_trigger(&mut self) -> bool {
		match self.phase {
			ThrottlePhase::Idle => {
				self.phase = ThrottlePhase::Waiting;
				true
			}
			ThrottlePhase::Waiting => false,
			ThrottlePhase::Running => {
				self.pending = true;
				false
			}
		}
	}

	/// The wait elapsed; the action starts.
	pub fn on_wait_elapsed(&mut self) {
		debug_assert_eq!(self.phase, ThrottlePhase::Waiting);
		self.phase = ThrottlePhase::Running;
	}

	/// The action finished. Returns true when a coalesced trigger demands
	/// another wait.
	pub fn on_run_complete(&mut self) -> bool {
		debug_assert_eq!(self.phase, ThrottlePhase::Running);
		if self.pending {
			self.pending = false;
			self.phase = ThrottlePhase::Waiting;
			true
		} else {
			self.phase = ThrottlePhase::Idle;
			false
		}
	}
}

impl Default for ThrottleState {
	fn default() -> Self {
		Self::new()
	}
}

/// The action fired by the throttle. Invoked once per fire; each invocation
/// builds a fresh future.
pub type ThrottledAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct ThrottleInner {
	state: Mutex<ThrottleState>,
	action: Mutex<Option<ThrottledAction>>,
	period_ms: AtomicU64,
	wake: Notify,
	cancel: CancellationToken,
}

/// Async driver around [`ThrottleState`].
///
/// The window length may be changed at any time via
/// [`DelayedThrottle::set_period`]; the caller typically widens it while the
/// server reports background work and narrows it when idle.
pub struct DelayedThrottle {
	inner: Arc<ThrottleInner>,
}

impl DelayedThrottle {
	/// Creates a throttle and spawns its driver task.
	///
	/// Must be called from within a tokio runtime.
	pub fn new(period: Duration) -> Self {
		let inner = Arc::new(ThrottleInner {
			state: Mutex::new(ThrottleState::new()),
			action: Mutex::new(None),
			period_ms: AtomicU64::new(period.as_millis() as u64),
			wake: Notify::new(),
			cancel: CancellationToken::new(),
		});
		tokio::spawn(drive(inner.clone()));
		Self { inner }
	}

	/// Binds the action fired on the next window. Latest wins.
	pub fn bind<F, Fut>(&self, action: F)
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let boxed: ThrottledAction =
			Arc::new(move || Box::pin(action()) as BoxFuture<'static, ()>);
		*self.inner.action.lock() = Some(boxed);
	}

	/// Changes the window length. Takes effect from the next wait.
	pub fn set_period(&self, period: Duration) {
		self.inner
			.period_ms
			.store(period.as_millis() as u64, Ordering::Relaxed);
	}

	/// The current window length.
	pub fn period(&self) -> Duration {
		Duration::from_millis(self.inner.period_ms.load(Ordering::Relaxed))
	}

	/// Requests a run. Coalesces with any outstanding wait or run.
	pub fn trigger(&self) {
		let start_wait = self.inner.state.lock().on_trigger();
		if start_wait {
			self.inner.wake.notify_one();
		} else {
			trace!("throttle.coalesced");
		}
	}

	/// Current phase, for introspection.
	pub fn phase(&self) -> ThrottlePhase {
		self.inner.state.lock().phase()
	}

	/// Stops the driver task. Pending triggers are dropped.
	pub fn shutdown(&self) {
		self.inner.cancel.cancel();
	}
}

impl Drop for DelayedThrottle {
	fn drop(&mut self) {
		self.inner.cancel.cancel();
	}
}

async fn drive(inner: Arc<ThrottleInner>) {
	loop {
		tokio::select! {
			_ = inner.cancel.cancelled() => return,
			_ = inner.wake.notified() => {}
		}

		loop {
			let period = Duration::from_millis(inner.period_ms.load(Ordering::Relaxed));
			tokio::select! {
				_ = inner.cancel.cancelled() => return,
				_ = tokio::time::sleep(period) => {}
			}

			inner.state.lock().on_wait_elapsed();

			// Latest binding wins, including rebinds during the wait.
			let action = inner.action.lock().clone();
			if let Some(action) = action {
				action().await;
			}

			let again = inner.state.lock().on_run_complete();
			if !again {
				break;
			}
		}
	}
}
