//! Read-side freeze over a stream of published values.
//!
//! [`Pausable`] decouples what consumers observe from what producers write.
//! While paused, reads return a copy held at the moment pausing began; the
//! live value keeps tracking every publish underneath, so unpausing always
//! exposes the most recent upstream value. Nothing is lost, delayed, or
//! batched on the producer side.

/// A live value with an optional held snapshot.
#[derive(Debug)]
pub struct Pausable<T> {
	live: Option<T>,
	held: Option<T>,
	paused: bool,
}

impl<T: Clone> Pausable<T> {
	/// A pausable with no value published yet.
	pub fn new() -> Self {
		Self {
			live: None,
			held: None,
			paused: false,
		}
	}

	/// A pausable seeded with an initial value.
	pub fn with_value(initial: T) -> Self {
		Self {
			live: Some(initial),
			held: None,
			paused: false,
		}
	}

	/// Records the newest upstream value. Never blocked by pause.
	///
	/// When pausing predated the first publish, the hold is taken lazily
	/// here: the first value seen while paused becomes the held copy.
	pub fn publish(&mut self, value: T) {
		if self.paused && self.live.is_none() {
			self.held = Some(value.clone());
		}
		self.live = Some(value);
	}

	/// Freezes or resumes the observed value.
	///
	/// Entering pause snapshots the live value; leaving it discards the held
	/// copy and resumes tracking live. Redundant transitions are no-ops, so
	/// a held snapshot is never refreshed mid-pause.
	pub fn set_paused(&mut self, paused: bool) {
		if paused == self.paused {
			return;
		}
		self.paused = paused;
		if paused {
			self.held = self.live.clone();
		} else {
			self.held = None;
		}
	}

	/// Returns true while reads are frozen.
	pub fn is_paused(&self) -> bool {
		self.paused
	}

	/// The observed value: the held copy while paused, live otherwise.
	pub fn current(&self) -> Option<&T> {
		if self.paused {
			self.held.as_ref()
		} else {
			self.live.as_ref()
		}
	}

	/// The newest upstream value regardless of pause.
	pub fn live(&self) -> Option<&T> {
		self.live.as_ref()
	}
}

impl<T: Clone> Default for Pausable<T> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_unpaused_tracks_live() {
		let mut p = Pausable::new();
		assert_eq!(p.current(), None);

		p.publish(1);
		assert_eq!(p.current(), Some(&1));
		p.publish(2);
		assert_eq!(p.current(), Some(&2));
	}

	#[test]
	fn test_paused_reads_are_stable_under_churn() {
		let mut p = Pausable::with_value(1);
		p.set_paused(true);

		for n in 2..=100 {
			p.publish(n);
			assert_eq!(p.current(), Some(&1), "paused reads must not move");
		}
		assert_eq!(p.live(), Some(&100));
	}

	#[test]
	fn test_unpause_exposes_latest_publish() {
		let mut p = Pausable::with_value(0);
		p.set_paused(true);
		for n in 1..=10 {
			p.publish(n);
		}
		p.set_paused(false);
		assert_eq!(p.current(), Some(&10), "update N must win, never an earlier one");
	}

	#[test]
	fn test_pause_before_first_publish_holds_lazily() {
		let mut p: Pausable<u32> = Pausable::new();
		p.set_paused(true);
		assert_eq!(p.current(), None);

		// First value seen while paused becomes the hold.
		p.publish(7);
		p.publish(8);
		assert_eq!(p.current(), Some(&7));

		p.set_paused(false);
		assert_eq!(p.current(), Some(&8));
	}

	#[test]
	fn test_redundant_transitions_do_not_refresh_hold() {
		let mut p = Pausable::with_value(1);
		p.set_paused(true);
		p.publish(2);
		p.set_paused(true);
		assert_eq!(p.current(), Some(&1), "re-pausing must not re-snapshot");
	}

	#[test]
	fn test_repause_takes_fresh_snapshot() {
		let mut p = Pausable::with_value(1);
		p.set_paused(true);
		p.publish(2);
		p.set_paused(false);
		p.set_paused(true);
		assert_eq!(p.current(), Some(&2));
	}
}
