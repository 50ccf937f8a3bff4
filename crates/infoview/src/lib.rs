//! Goal-state synchronization engine.
//!
//! Keeps a UI's view of "program state at the cursor" consistent with a
//! remote language-analysis server across rapid cursor movement, document
//! edits, server latency, and user-requested pausing. The pieces:
//!
//! - [`GoalView`]: the per-position state machine. Throttle-gated update
//!   cycles fetch goals, term goal, and widgets concurrently and commit
//!   immutable [`GoalSnapshot`]s, with stale cycles discarded by generation.
//! - [`DelayedThrottle`]: coalescing rate limiter between the hot cursor
//!   stream and the server.
//! - [`Pausable`]: read-side freeze so a user can pin the current view
//!   while updates continue underneath.
//! - [`DiagnosticsAggregator`]: raw diagnostics with lazy, memoized upgrade
//!   to the interactive form.
//!
//! Session plumbing and wire types live in [`scry_rpc`]; rendering is the
//! consumer's concern; this crate stops at immutable snapshots.

pub mod config;
pub mod diagnostics;
pub mod pausable;
pub mod snapshot;
pub mod throttle;
pub mod view;

pub use config::InfoviewConfig;
pub use diagnostics::{DiagnosticsAggregator, FileDiagnostics};
pub use pausable::Pausable;
pub use snapshot::{GoalSnapshot, ViewStatus};
pub use throttle::{DelayedThrottle, ThrottlePhase, ThrottleState};
pub use view::GoalView;
