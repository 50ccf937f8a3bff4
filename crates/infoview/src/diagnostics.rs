//! Diagnostics aggregation and lazy interactive upgrade.
//!
//! Raw diagnostics are cheap and arrive push-style; interactive diagnostics
//! are richer but cost a round trip. [`DiagnosticsAggregator`] exposes the
//! best currently-known form per document and upgrades on demand only:
//! the fetch runs the first time a consumer actually needs the expanded
//! view, is shared across concurrent consumers, and its result is memoized
//! against the raw set's replacement version. A raw replacement landing
//! mid-fetch invalidates the memo, so a stale upgrade is never exposed.
//!
//! An empty interactive result against a non-empty raw set is read as fetch
//! failure, not as "no diagnostics": the raw set stays authoritative and the
//! memo is dropped so a later demand retries.

use std::collections::HashMap;
use std::sync::Arc;

use lsp_types::{Diagnostic, Uri};
use parking_lot::Mutex;
use scry_rpc::{DocumentStore, Error, InteractiveDiagnostic, SessionHandle};
use tokio::sync::watch;
use tracing::{debug, warn};

/// The diagnostics for one document, at the richest form available.
#[derive(Debug, Clone)]
pub enum FileDiagnostics {
	/// Upgraded, structured form.
	Interactive(Vec<InteractiveDiagnostic>),
	/// Raw push-style form.
	Raw(Vec<Diagnostic>),
}

impl FileDiagnostics {
	/// Returns true for the upgraded form.
	pub fn is_interactive(&self) -> bool {
		matches!(self, FileDiagnostics::Interactive(_))
	}

	/// Number of diagnostics in either form.
	pub fn len(&self) -> usize {
		match self {
			FileDiagnostics::Interactive(list) => list.len(),
			FileDiagnostics::Raw(list) => list.len(),
		}
	}

	/// Returns true when no diagnostics are present.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[derive(Debug)]
enum UpgradeOutcome {
	Ready(Vec<InteractiveDiagnostic>),
	/// Empty reply against a non-empty raw set; treated as fetch failure.
	EmptyResult,
	Failed(Error),
}

/// One upgrade computation, keyed by the raw version it was started against.
struct UpgradeMemo {
	raw_version: u64,
	rx: watch::Receiver<Option<Arc<UpgradeOutcome>>>,
}

/// Per-document diagnostics with lazy, memoized interactive upgrade.
pub struct DiagnosticsAggregator {
	store: Arc<DocumentStore>,
	memos: Mutex<HashMap<Uri, UpgradeMemo>>,
}

impl DiagnosticsAggregator {
	/// Creates an aggregator over the given raw store.
	pub fn new(store: Arc<DocumentStore>) -> Self {
		Self {
			store,
			memos: Mutex::new(HashMap::new()),
		}
	}

	/// The richest currently-known form, without fetching.
	///
	/// Returns the memoized interactive set only when it matches the current
	/// raw version; anything else falls back to raw.
	pub fn current(&self, uri: &Uri) -> FileDiagnostics {
		let version = self.store.diagnostics_version(uri);
		if version > 0 {
			let outcome = {
				let memos = self.memos.lock();
				memos
					.get(uri)
					.filter(|memo| memo.raw_version == version)
					.and_then(|memo| memo.rx.borrow().as_ref().cloned())
			};
			if let Some(outcome) = outcome
				&& let UpgradeOutcome::Ready(list) = &*outcome
			{
				return FileDiagnostics::Interactive(list.clone());
			}
		}
		FileDiagnostics::Raw(self.store.diagnostics(uri))
	}

	/// Demand-driven upgrade of a document's diagnostics.
	///
	/// Computes the interactive form at most once per raw version; concurrent
	/// callers share one fetch. Falls back to the raw form when the fetch
	/// fails or returns an implausible empty set.
	pub async fn upgraded(&self, uri: &Uri, session: &SessionHandle) -> FileDiagnostics {
		loop {
			let version = self.store.diagnostics_version(uri);
			let raw = self.store.diagnostics(uri);
			if raw.is_empty() {
				return FileDiagnostics::Raw(raw);
			}

			// Leader election on the memo for this raw version.
			let (rx, leader_tx) = {
				let mut memos = self.memos.lock();
				match memos.get(uri) {
					Some(memo) if memo.raw_version == version => (memo.rx.clone(), None),
					_ => {
						let (tx, rx) = watch::channel(None);
						memos.insert(
							uri.clone(),
							UpgradeMemo {
								raw_version: version,
								rx: rx.clone(),
							},
						);
						(rx, Some(tx))
					}
				}
			};

			let outcome = if let Some(tx) = leader_tx {
				let fetched = session.interactive_diagnostics(None).await;
				let outcome = Arc::new(match fetched {
					Ok(list) if list.is_empty() => {
						warn!(uri = %uri.as_str(), "diagnostics.upgrade_empty");
						UpgradeOutcome::EmptyResult
					}
					Ok(list) => UpgradeOutcome::Ready(list),
					Err(err) => {
						warn!(uri = %uri.as_str(), error = %err, "diagnostics.upgrade_failed");
						UpgradeOutcome::Failed(err)
					}
				});
				let _ = tx.send(Some(outcome.clone()));
				Some(outcome)
			} else {
				let mut rx = rx;
				loop {
					let current = rx.borrow().as_ref().cloned();
					if let Some(outcome) = current {
						break Some(outcome);
					}
					if rx.changed().await.is_err() {
						// Leader dropped mid-fetch; re-elect.
						break None;
					}
				}
			};

			let Some(outcome) = outcome else {
				self.invalidate_version(uri, version);
				continue;
			};

			// A raw replacement may have landed while fetching: the memo is
			// stale and must not be exposed.
			if self.store.diagnostics_version(uri) != version {
				debug!(uri = %uri.as_str(), version, "diagnostics.upgrade_stale");
				self.invalidate_version(uri, version);
				continue;
			}

			return match &*outcome {
				UpgradeOutcome::Ready(list) => FileDiagnostics::Interactive(list.clone()),
				UpgradeOutcome::EmptyResult | UpgradeOutcome::Failed(_) => {
					// Failures are not memoized: a later demand retries.
					self.invalidate_version(uri, version);
					FileDiagnostics::Raw(raw)
				}
			};
		}
	}

	/// Drops the memo for a document regardless of version.
	pub fn invalidate(&self, uri: &Uri) {
		self.memos.lock().remove(uri);
	}

	/// The underlying raw store.
	pub fn store(&self) -> &Arc<DocumentStore> {
		&self.store
	}

	/// Drops the memo only when it still belongs to `version`.
	fn invalidate_version(&self, uri: &Uri, version: u64) {
		let mut memos = self.memos.lock();
		if memos.get(uri).is_some_and(|memo| memo.raw_version == version) {
			memos.remove(uri);
		}
	}
}

#[cfg(test)]
mod tests;
