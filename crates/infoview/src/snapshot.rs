//! Immutable goal-state snapshots.

use scry_rpc::{DocumentPosition, GoalList, SessionId, TermGoal, WidgetList};

/// Lifecycle status of the goal view.
///
/// `Loading` is only ever the initial state; after the first update the view
/// cycles `Updating → {Ready, Error} → Updating → …`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
	/// First observation of a position; nothing fetched yet.
	Loading,
	/// A fetch is in flight. Prior data is carried to avoid flicker.
	Updating,
	/// The last fetch succeeded.
	Ready,
	/// The last fetch failed with a surfaceable error.
	Error,
}

/// Point-in-time view of goal state, safe to hand to multiple readers.
///
/// A snapshot is never mutated: each commit replaces the whole value
/// atomically, and `session` binds it to the epoch that produced it.
#[derive(Debug, Clone)]
pub struct GoalSnapshot {
	/// Where in the lifecycle this snapshot was taken.
	pub status: ViewStatus,
	/// The position the snapshot answers for.
	pub position: Option<DocumentPosition>,
	/// Open goals, when the cursor is in a goal-bearing region.
	pub goals: Option<GoalList>,
	/// Expected type of the surrounding term.
	pub term_goal: Option<TermGoal>,
	/// Widgets anchored at the position.
	pub widgets: Option<WidgetList>,
	/// Human-readable error, present only with [`ViewStatus::Error`].
	pub error: Option<String>,
	/// Session epoch the data was fetched under.
	pub session: Option<SessionId>,
}

impl GoalSnapshot {
	/// The initial snapshot before any position is observed.
	pub fn loading() -> Self {
		Self {
			status: ViewStatus::Loading,
			position: None,
			goals: None,
			term_goal: None,
			widgets: None,
			error: None,
			session: None,
		}
	}

	/// Re-enters `Updating` for a new position, carrying the previous data.
	pub(crate) fn updating_from(prev: &GoalSnapshot, position: DocumentPosition) -> Self {
		Self {
			status: ViewStatus::Updating,
			position: Some(position),
			goals: prev.goals.clone(),
			term_goal: prev.term_goal.clone(),
			widgets: prev.widgets.clone(),
			error: None,
			session: prev.session,
		}
	}

	/// A successful fetch.
	pub(crate) fn ready(
		position: DocumentPosition,
		goals: Option<GoalList>,
		term_goal: Option<TermGoal>,
		widgets: Option<WidgetList>,
		session: SessionId,
	) -> Self {
		Self {
			status: ViewStatus::Ready,
			position: Some(position),
			goals,
			term_goal,
			widgets,
			error: None,
			session: Some(session),
		}
	}

	/// A failed fetch with a surfaceable message.
	pub(crate) fn failed(
		position: DocumentPosition,
		message: String,
		session: Option<SessionId>,
	) -> Self {
		Self {
			status: ViewStatus::Error,
			position: Some(position),
			goals: None,
			term_goal: None,
			widgets: None,
			error: Some(message),
			session,
		}
	}

	/// Returns true for the terminal states of one cycle.
	pub fn is_settled(&self) -> bool {
		matches!(self.status, ViewStatus::Ready | ViewStatus::Error)
	}
}
