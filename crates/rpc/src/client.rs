//! Top-level analysis client: cache + store + event router.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::document::{DiagnosticsEventReceiver, DocumentStore};
use crate::session::SessionCache;
use crate::transport::{AnalysisTransport, TransportEvent};

/// Errors from [`AnalysisClient::spawn_router`].
#[derive(Debug, thiserror::Error)]
pub enum SpawnRouterError {
	/// The router was already started for this client.
	#[error("router already started")]
	AlreadyStarted,
	/// No tokio runtime is available on the calling thread.
	#[error("no tokio runtime available")]
	NoRuntime,
}

/// Central manager for analysis-server functionality.
///
/// Owns the [`SessionCache`] and [`DocumentStore`] and runs the background
/// router that feeds transport push events into them.
pub struct AnalysisClient {
	sessions: Arc<SessionCache>,
	store: Arc<DocumentStore>,
	transport: Arc<dyn AnalysisTransport>,
	diagnostics_rx: Option<DiagnosticsEventReceiver>,
	router_started: AtomicBool,
}

impl AnalysisClient {
	/// Creates a client with the given transport and request timeout.
	pub fn new(transport: Arc<dyn AnalysisTransport>, request_timeout: Duration) -> Self {
		let sessions = Arc::new(SessionCache::with_timeout(transport.clone(), request_timeout));
		let (store, diagnostics_rx) = DocumentStore::new();

		Self {
			sessions,
			store,
			transport,
			diagnostics_rx: Some(diagnostics_rx),
			router_started: AtomicBool::new(false),
		}
	}

	/// Spawns the background event router task.
	///
	/// Routes transport push events into the document store and session
	/// cache. Events from stale session generations are dropped. Must be
	/// called from within a tokio runtime.
	pub fn spawn_router(&self) -> Result<JoinHandle<()>, SpawnRouterError> {
		if tokio::runtime::Handle::try_current().is_err() {
			return Err(SpawnRouterError::NoRuntime);
		}

		// Enforce a single router instance per client.
		if self.router_started.swap(true, Ordering::SeqCst) {
			return Err(SpawnRouterError::AlreadyStarted);
		}

		let mut events_rx = self.transport.events();
		let sessions = self.sessions.clone();
		let store = self.store.clone();
		let transport = self.transport.clone();

		Ok(tokio::spawn(async move {
			while let Some(event) = events_rx.recv().await {
				match event {
					TransportEvent::Diagnostics {
						session,
						uri,
						version: _,
						diagnostics,
					} => {
						if !sessions.is_current(session) {
							debug!(
								session = %session,
								uri = %uri.as_str(),
								"router.drop_stale_diagnostics"
							);
							continue;
						}
						store.update_diagnostics(&uri, diagnostics);
					}

					TransportEvent::SessionClosed { session } => {
						if let Some(uri) = sessions.remove(session) {
							warn!(
								session = %session,
								uri = %uri.as_str(),
								"router.session_closed"
							);
						}
						// Close transport-side asynchronously (don't block
						// the router loop).
						let transport = transport.clone();
						tokio::spawn(async move {
							let _ = transport.close(session).await;
						});
					}

					TransportEvent::Disconnected => break,
				}
			}
		}))
	}

	/// Takes the diagnostics event receiver. Returns `None` after the first
	/// call.
	pub fn take_diagnostics_events(&mut self) -> Option<DiagnosticsEventReceiver> {
		self.diagnostics_rx.take()
	}

	/// The session cache.
	pub fn sessions(&self) -> &Arc<SessionCache> {
		&self.sessions
	}

	/// The raw diagnostics store.
	pub fn store(&self) -> &Arc<DocumentStore> {
		&self.store
	}

	/// Closes all sessions.
	pub async fn shutdown_all(&self) {
		let ids = self.sessions.shutdown_all();
		for id in ids {
			let _ = self.transport.close(id).await;
		}
	}
}
