//! Session identity and the per-document session cache.
//!
//! A session is an open, versioned line of communication with the analysis
//! server scoped to one document. [`SessionCache`] ensures exactly one live
//! session per `(document, generation)`: concurrent callers racing to open
//! the same document are collapsed into a single underlying open via a
//! singleflight protocol, and replacing a session advances the document's
//! generation so every handle from the prior epoch can be detected as stale.
//!
//! # Singleflight protocol
//!
//! 1. Fast path: return the running session if one exists.
//! 2. Leader election: the first caller becomes leader, others wait.
//! 3. Leader opens through the transport, publishes the shared result via a
//!    `watch` channel, and removes the inflight entry.
//! 4. Waiters receive the result directly from the channel.
//!
//! A drop guard unwedges waiters if the leader is cancelled mid-open.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lsp_types::Uri;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::transport::{AnalysisTransport, SessionConfig};
use crate::{Error, Result};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity of one session epoch.
///
/// The slot is stable per document; the generation advances every time the
/// document's session is replaced, invalidating all handles from prior
/// generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
	/// Stable per-document slot.
	pub slot: u32,
	/// Validity epoch within the slot.
	pub generation: u32,
}

impl SessionId {
	/// Creates an identity from its parts.
	pub fn new(slot: u32, generation: u32) -> Self {
		Self { slot, generation }
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.slot, self.generation)
	}
}

/// Cheap-clone handle for issuing requests against one open session.
///
/// A handle is an immutable capability token for the duration of one
/// request. It does not own the session; holders that outlive a replacement
/// detect staleness via [`SessionCache::is_current`].
#[derive(Clone)]
pub struct SessionHandle {
	id: SessionId,
	uri: Uri,
	timeout: Duration,
	transport: Arc<dyn AnalysisTransport>,
}

impl fmt::Debug for SessionHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionHandle")
			.field("id", &self.id)
			.field("uri", &self.uri.as_str())
			.finish()
	}
}

impl SessionHandle {
	/// The session's identity.
	pub fn id(&self) -> SessionId {
		self.id
	}

	/// The document this session is scoped to.
	pub fn uri(&self) -> &Uri {
		&self.uri
	}

	/// Issues a typed request against this session.
	pub(crate) async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
	where
		P: Serialize,
		R: DeserializeOwned,
	{
		let params = serde_json::to_value(params)?;
		let value = self
			.transport
			.request(self.id, method, params, Some(self.timeout))
			.await?;
		Ok(serde_json::from_value(value)?)
	}
}

/// Consolidated cache state under a single lock for atomic operations.
///
/// `sessions` and `id_index` MUST be updated together so that replacement
/// and eviction stay consistent. `slot_ids`/`slot_gens` provide stable,
/// generation-aware [`SessionId`] values so the event router can detect and
/// discard events from stale session epochs.
struct CacheState {
	/// Live sessions keyed by document.
	sessions: HashMap<Uri, SessionHandle>,
	/// Reverse index for O(1) eviction by session identity.
	id_index: HashMap<SessionId, Uri>,
	/// Stable slot per document.
	slot_ids: HashMap<Uri, u32>,
	/// Generation counter per slot.
	slot_gens: HashMap<Uri, u32>,
	/// Next available slot.
	next_slot: u32,
}

impl CacheState {
	fn new() -> Self {
		Self {
			sessions: HashMap::new(),
			id_index: HashMap::new(),
			slot_ids: HashMap::new(),
			slot_gens: HashMap::new(),
			next_slot: 0,
		}
	}

	fn slot_for(&mut self, uri: &Uri) -> u32 {
		if let Some(&slot) = self.slot_ids.get(uri) {
			slot
		} else {
			let slot = self.next_slot;
			self.next_slot += 1;
			self.slot_ids.insert(uri.clone(), slot);
			slot
		}
	}

	fn next_gen(&mut self, uri: &Uri) -> u32 {
		let generation = self.slot_gens.get(uri).copied().unwrap_or(0) + 1;
		self.slot_gens.insert(uri.clone(), generation);
		generation
	}
}

/// Tracking state for a session open in progress.
struct InflightOpen {
	tx: watch::Sender<Option<Arc<Result<SessionHandle>>>>,
	rx: watch::Receiver<Option<Arc<Result<SessionHandle>>>>,
}

/// Per-document session cache with generation-based staleness.
///
/// # Concurrency
///
/// - `state`: one `RwLock` keeps the session map, reverse index, and
///   slot/generation counters atomic.
/// - `inflight`: async `Mutex` gate ensures one transport open per document
///   across all callers.
pub struct SessionCache {
	state: RwLock<CacheState>,
	transport: Arc<dyn AnalysisTransport>,
	timeout: Duration,
	inflight: Arc<Mutex<HashMap<Uri, Arc<InflightOpen>>>>,
}

impl SessionCache {
	/// Creates a cache backed by the given transport.
	pub fn new(transport: Arc<dyn AnalysisTransport>) -> Self {
		Self::with_timeout(transport, DEFAULT_REQUEST_TIMEOUT)
	}

	/// Creates a cache with an explicit per-request timeout.
	pub fn with_timeout(transport: Arc<dyn AnalysisTransport>, timeout: Duration) -> Self {
		Self {
			state: RwLock::new(CacheState::new()),
			transport,
			timeout,
			inflight: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Synchronous check for a running session.
	pub fn get(&self, uri: &Uri) -> Option<SessionHandle> {
		self.state.read().sessions.get(uri).cloned()
	}

	/// Returns the current session for a document, opening one if absent.
	///
	/// At most one underlying open happens per `(document, generation)`;
	/// concurrent callers share the same result.
	pub async fn session_for(&self, uri: &Uri) -> Result<SessionHandle> {
		// 1. Fast path
		if let Some(handle) = self.get(uri) {
			return Ok(handle);
		}

		// 2. Leader election
		let (inflight, is_leader) = {
			let mut inflight_map = self.inflight.lock().await;
			if let Some(f) = inflight_map.get(uri) {
				(f.clone(), false)
			} else {
				let (tx, rx) = watch::channel(None);
				let f = Arc::new(InflightOpen { tx, rx });
				inflight_map.insert(uri.clone(), f.clone());
				(f, true)
			}
		};

		if !is_leader {
			// 3a. Wait for leader
			let mut rx = inflight.rx.clone();
			loop {
				let result = rx.borrow().as_ref().cloned();
				if let Some(res) = result {
					return (*res).clone();
				}
				if rx.changed().await.is_err() {
					return Err(Error::Protocol("open aborted (leader dropped)".into()));
				}
			}
		}

		// 3b. Leader work
		let mut guard = OpenGuard::new(
			uri.clone(),
			self.inflight.clone(),
			inflight.clone(),
			self.transport.clone(),
		);

		// Re-check state after lock acquisition to prevent a double open.
		if let Some(handle) = self.get(uri) {
			return guard.complete(Ok(handle));
		}

		let id = {
			let mut state = self.state.write();
			let slot = state.slot_for(uri);
			let generation = state.next_gen(uri);
			SessionId::new(slot, generation)
		};

		info!(uri = %uri.as_str(), %id, "session.open_start");

		let config = SessionConfig::new(id, uri.clone(), self.timeout);
		let opened = self.transport.open(config).await;

		let final_res = match opened {
			Ok(started) => {
				guard.note_opened(started.id);
				let handle = {
					let mut state = self.state.write();
					// Final pathological race check
					if let Some(existing) = state.sessions.get(uri) {
						existing.clone()
					} else {
						let handle = SessionHandle {
							id: started.id,
							uri: uri.clone(),
							timeout: self.timeout,
							transport: self.transport.clone(),
						};
						state.id_index.insert(started.id, uri.clone());
						state.sessions.insert(uri.clone(), handle.clone());
						handle
					}
				};
				Ok(handle)
			}
			Err(err) => {
				warn!(uri = %uri.as_str(), error = %err, "session.open_failed");
				Err(err)
			}
		};

		guard.complete(final_res)
	}

	/// Returns true if the given identity is the live session for its document.
	pub fn is_current(&self, id: SessionId) -> bool {
		self.state.read().id_index.contains_key(&id)
	}

	/// Drops the live session for a document, advancing its generation on
	/// the next open.
	///
	/// Existing handles become stale immediately (`is_current` turns false);
	/// the next [`SessionCache::session_for`] transparently replaces them.
	/// Returns the identity that was evicted, if any.
	pub fn invalidate(&self, uri: &Uri) -> Option<SessionId> {
		let mut state = self.state.write();
		let handle = state.sessions.remove(uri)?;
		state.id_index.remove(&handle.id);
		debug!(uri = %uri.as_str(), id = %handle.id, "session.invalidated");
		Some(handle.id)
	}

	/// Evicts a session by identity. No-op when the identity is already stale.
	///
	/// Called by the event router when the transport reports a close.
	pub fn remove(&self, id: SessionId) -> Option<Uri> {
		let mut state = self.state.write();
		let uri = state.id_index.remove(&id)?;
		state.sessions.remove(&uri);
		Some(uri)
	}

	/// Drops all sessions, returning their identities for transport close.
	pub fn shutdown_all(&self) -> Vec<SessionId> {
		let mut state = self.state.write();
		let ids: Vec<SessionId> = state.id_index.keys().copied().collect();
		state.sessions.clear();
		state.id_index.clear();
		state.slot_ids.clear();
		state.slot_gens.clear();
		ids
	}

	/// Number of live sessions.
	pub fn active_count(&self) -> usize {
		self.state.read().sessions.len()
	}

	/// The underlying transport.
	pub fn transport(&self) -> Arc<dyn AnalysisTransport> {
		self.transport.clone()
	}
}

impl fmt::Debug for SessionCache {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionCache")
			.field("active", &self.active_count())
			.finish()
	}
}

/// Guard that un-wedges the inflight open map on drop if the leader fails
/// or is cancelled.
struct OpenGuard {
	uri: Uri,
	inflight_map: Arc<Mutex<HashMap<Uri, Arc<InflightOpen>>>>,
	inflight: Arc<InflightOpen>,
	transport: Arc<dyn AnalysisTransport>,
	opened_id: Option<SessionId>,
	completed: bool,
}

impl OpenGuard {
	fn new(
		uri: Uri,
		inflight_map: Arc<Mutex<HashMap<Uri, Arc<InflightOpen>>>>,
		inflight: Arc<InflightOpen>,
		transport: Arc<dyn AnalysisTransport>,
	) -> Self {
		Self {
			uri,
			inflight_map,
			inflight,
			transport,
			opened_id: None,
			completed: false,
		}
	}

	fn note_opened(&mut self, id: SessionId) {
		self.opened_id = Some(id);
	}

	fn complete(mut self, res: Result<SessionHandle>) -> Result<SessionHandle> {
		self.completed = true;

		// 1) publish result to waiters (sync, no await points)
		let _ = self.inflight.tx.send(Some(Arc::new(res.clone())));

		// 2) remove inflight entry asynchronously (so cancellation after this
		//    point can't wedge)
		let uri = self.uri.clone();
		let inflight_map = Arc::clone(&self.inflight_map);
		tokio::spawn(async move {
			let mut map = inflight_map.lock().await;
			map.remove(&uri);
		});

		res
	}
}

impl Drop for OpenGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		// Leader exited early: unblock waiters + un-wedge inflight.
		let uri = self.uri.clone();
		let inflight_map = Arc::clone(&self.inflight_map);
		let tx = self.inflight.tx.clone();
		let transport = Arc::clone(&self.transport);
		let opened_id = self.opened_id;

		tokio::spawn(async move {
			// If a session was opened but never registered, close it.
			if let Some(id) = opened_id {
				let _ = transport.close(id).await;
			}

			// Remove inflight entry to allow a subsequent retry.
			{
				let mut map = inflight_map.lock().await;
				map.remove(&uri);
			}

			// Publish a deterministic error so waiters don't hang.
			let _ = tx.send(Some(Arc::new(Err(Error::Protocol(
				"open aborted (leader cancelled)".into(),
			)))));
		});
	}
}
