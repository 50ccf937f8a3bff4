//! Goal-state view controller.
//!
//! [`GoalView`] keeps one position's goal state in sync with the analysis
//! server. Cursor movement retargets the view and trips the throttle; each
//! fire runs one update cycle: acquire the document's session from the
//! cache, issue the goal, term-goal, and widget requests concurrently, and
//! commit the outcome as a fresh immutable [`GoalSnapshot`].
//!
//! # Commit discipline
//!
//! Every cycle is stamped with the target generation it was started for.
//! Commits are compare-and-set against the current generation, so a late
//! response for an overtaken position is received and discarded: the view
//! only ever reflects the most recently requested position's outcome.
//!
//! # Error policy
//!
//! Failures are classified, never thrown past this module: content-modified
//! errors retry the whole cycle immediately (benign churn while the user
//! types), unstructured empty errors revert to the last settled snapshot
//! instead of flashing a blank error, and everything else commits an
//! `Error` snapshot carrying the server's message.

use std::sync::Arc;

use parking_lot::Mutex;
use scry_rpc::{
	AnalysisClient, DocumentPosition, Error, ErrorClass, GoalList, SessionId, TermGoal,
	WidgetList,
};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::config::InfoviewConfig;
use crate::pausable::Pausable;
use crate::snapshot::GoalSnapshot;
use crate::throttle::DelayedThrottle;

/// The most recently requested position plus the generation stamp that
/// binds in-flight work to it.
#[derive(Debug, Clone)]
struct Target {
	position: Option<DocumentPosition>,
	generation: u64,
}

struct ViewInner {
	client: Arc<AnalysisClient>,
	target: Mutex<Target>,
	snapshot_tx: watch::Sender<Arc<GoalSnapshot>>,
	/// Last committed settled snapshot, the revert point for suppressed
	/// empty errors. Starts as the loading snapshot.
	last_settled: Mutex<Arc<GoalSnapshot>>,
	paused: Mutex<Pausable<Arc<GoalSnapshot>>>,
}

/// Per-position goal-state view synchronized with the analysis server.
pub struct GoalView {
	inner: Arc<ViewInner>,
	throttle: DelayedThrottle,
	config: InfoviewConfig,
}

impl GoalView {
	/// Creates a view over the given client.
	///
	/// Must be called from within a tokio runtime; the throttle driver is
	/// spawned immediately.
	pub fn new(client: Arc<AnalysisClient>, config: InfoviewConfig) -> Self {
		let initial = Arc::new(GoalSnapshot::loading());
		let (snapshot_tx, _) = watch::channel(initial.clone());

		let inner = Arc::new(ViewInner {
			client,
			target: Mutex::new(Target {
				position: None,
				generation: 0,
			}),
			snapshot_tx,
			last_settled: Mutex::new(initial.clone()),
			paused: Mutex::new(Pausable::with_value(initial)),
		});

		let throttle = DelayedThrottle::new(config.idle_throttle());
		let action_inner = inner.clone();
		throttle.bind(move || {
			let inner = action_inner.clone();
			async move {
				run_update(inner).await;
			}
		});

		Self {
			inner,
			throttle,
			config,
		}
	}

	/// Retargets the view to a new cursor position.
	///
	/// Equal positions are ignored; a genuine move bumps the generation,
	/// which both discards any in-flight cycle at commit time and trips the
	/// throttle for a fresh one.
	pub fn set_position(&self, position: DocumentPosition) {
		{
			let mut target = self.inner.target.lock();
			if target.position.as_ref() == Some(&position) {
				trace!("goal_view.position_unchanged");
				return;
			}
			target.position = Some(position);
			target.generation += 1;
		}
		self.throttle.trigger();
	}

	/// Forces a re-query of the current position.
	///
	/// Bumps the generation so a cycle already in flight is superseded.
	pub fn refresh(&self) {
		{
			let mut target = self.inner.target.lock();
			if target.position.is_none() {
				return;
			}
			target.generation += 1;
		}
		self.throttle.trigger();
	}

	/// Subscribes to live snapshot commits. Unaffected by pause.
	pub fn subscribe(&self) -> watch::Receiver<Arc<GoalSnapshot>> {
		self.inner.snapshot_tx.subscribe()
	}

	/// The observed snapshot: frozen while paused, live otherwise.
	pub fn snapshot(&self) -> Arc<GoalSnapshot> {
		let paused = self.inner.paused.lock();
		match paused.current() {
			Some(snapshot) => snapshot.clone(),
			None => self.inner.snapshot_tx.borrow().clone(),
		}
	}

	/// Freezes or resumes the observed snapshot.
	///
	/// Purely a read-side filter: the update loop keeps running and the
	/// live channel keeps committing underneath.
	pub fn set_paused(&self, paused: bool) {
		self.inner.paused.lock().set_paused(paused);
	}

	/// Returns true while the observed snapshot is frozen.
	pub fn is_paused(&self) -> bool {
		self.inner.paused.lock().is_paused()
	}

	/// Widens or narrows the throttle window.
	///
	/// Call with `true` while the server reports background work.
	pub fn set_busy(&self, busy: bool) {
		let period = if busy {
			self.config.busy_throttle()
		} else {
			self.config.idle_throttle()
		};
		self.throttle.set_period(period);
	}

	/// Stops the update loop. In-flight work is discarded at commit time.
	pub fn shutdown(&self) {
		self.throttle.shutdown();
	}
}

impl ViewInner {
	fn current_generation(&self) -> u64 {
		self.target.lock().generation
	}

	/// Compare-and-set commit: only the cycle whose generation still matches
	/// the target may publish. Returns false when the snapshot was discarded.
	fn commit(&self, generation: u64, snapshot: Arc<GoalSnapshot>) -> bool {
		let target = self.target.lock();
		if target.generation != generation {
			debug!(
				generation,
				current = target.generation,
				"goal_view.commit_discarded"
			);
			return false;
		}
		if snapshot.is_settled() {
			*self.last_settled.lock() = snapshot.clone();
		}
		self.snapshot_tx.send_replace(snapshot.clone());
		self.paused.lock().publish(snapshot);
		true
	}

	/// Re-commits the last settled snapshot, erasing an `Updating` that will
	/// never resolve.
	fn revert(&self, generation: u64) {
		let last = self.last_settled.lock().clone();
		self.commit(generation, last);
	}
}

/// One update cycle. Runs under the throttle, at most one at a time.
async fn run_update(inner: Arc<ViewInner>) {
	let (position, generation) = {
		let target = inner.target.lock();
		let Some(position) = target.position.clone() else {
			return;
		};
		(position, target.generation)
	};

	// Enter Updating, carrying the previous data to avoid flicker.
	{
		let prev = inner.snapshot_tx.borrow().clone();
		let updating = Arc::new(GoalSnapshot::updating_from(&prev, position.clone()));
		if !inner.commit(generation, updating) {
			return;
		}
	}

	loop {
		// A position change ends the retry loop; the pending trigger runs a
		// fresh cycle for the new target.
		if inner.current_generation() != generation {
			debug!("goal_view.cycle_superseded");
			return;
		}

		let session = match inner.client.sessions().session_for(&position.uri).await {
			Ok(session) => session,
			Err(err) => match err.classify() {
				ErrorClass::Transient => {
					trace!(uri = %position.uri.as_str(), "goal_view.retry_open");
					continue;
				}
				ErrorClass::Empty => {
					debug!("goal_view.suppress_empty_error");
					inner.revert(generation);
					return;
				}
				ErrorClass::Fatal => {
					settle_error(&inner, generation, &position, None, err);
					return;
				}
			},
		};

		// All three are issued before any is awaited: one failing does not
		// orphan the others as unobserved failures.
		let (goals, term_goal, widgets) = tokio::join!(
			session.plain_goal(position.position),
			session.plain_term_goal(position.position),
			session.widgets(position.position),
		);

		match merge_results(goals, term_goal, widgets) {
			Ok((goals, term_goal, widgets)) => {
				let snapshot = Arc::new(GoalSnapshot::ready(
					position.clone(),
					goals,
					term_goal,
					Some(widgets),
					session.id(),
				));
				inner.commit(generation, snapshot);
				return;
			}
			Err(err) => match err.classify() {
				ErrorClass::Transient => {
					trace!(uri = %position.uri.as_str(), "goal_view.retry_content_modified");
					continue;
				}
				ErrorClass::Empty => {
					debug!("goal_view.suppress_empty_error");
					inner.revert(generation);
					return;
				}
				ErrorClass::Fatal => {
					settle_error(&inner, generation, &position, Some(session.id()), err);
					return;
				}
			},
		}
	}
}

fn settle_error(
	inner: &ViewInner,
	generation: u64,
	position: &DocumentPosition,
	session: Option<SessionId>,
	err: Error,
) {
	warn!(uri = %position.uri.as_str(), error = %err, "goal_view.update_failed");
	let snapshot = Arc::new(GoalSnapshot::failed(
		position.clone(),
		err.to_string(),
		session,
	));
	inner.commit(generation, snapshot);
}

/// Collapses the three request outcomes into one error by rank: a transient
/// error wins (the whole cycle retries), then a fatal one (its message is
/// surfaced), and only an all-empty failure stays empty.
fn merge_results(
	goals: Result<Option<GoalList>, Error>,
	term_goal: Result<Option<TermGoal>, Error>,
	widgets: Result<WidgetList, Error>,
) -> Result<(Option<GoalList>, Option<TermGoal>, WidgetList), Error> {
	let mut errors: Vec<&Error> = Vec::new();
	if let Err(err) = &goals {
		errors.push(err);
	}
	if let Err(err) = &term_goal {
		errors.push(err);
	}
	if let Err(err) = &widgets {
		errors.push(err);
	}
	if let Some(err) = errors.iter().find(|e| e.classify() == ErrorClass::Transient) {
		return Err((*err).clone());
	}
	if let Some(err) = errors.iter().find(|e| e.classify() == ErrorClass::Fatal) {
		return Err((*err).clone());
	}
	// Any error left is Empty; `?` surfaces the first.
	Ok((goals?, term_goal?, widgets?))
}
