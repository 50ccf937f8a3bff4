//! Transport seam to the analysis server.
//!
//! Everything the engine knows about the wire is the [`AnalysisTransport`]
//! trait: open a session for a document, issue requests against it, close
//! it, and receive push events. Concrete transports (stdio pipe, socket,
//! in-process test fake) live outside this crate.

use std::time::Duration;

use async_trait::async_trait;
use lsp_types::{Diagnostic, Uri};
use tokio::sync::mpsc;

use crate::session::SessionId;
use crate::{JsonValue, Result};

/// Configuration for opening one session.
///
/// The session identity is allocated by the cache before the open so that
/// events arriving during startup can already be attributed to the right
/// generation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
	/// Pre-allocated identity for the session being opened.
	pub id: SessionId,
	/// Document the session is scoped to.
	pub uri: Uri,
	/// Per-request timeout the transport should enforce.
	pub timeout: Duration,
}

impl SessionConfig {
	/// Creates a config with the given identity and document.
	pub fn new(id: SessionId, uri: Uri, timeout: Duration) -> Self {
		Self { id, uri, timeout }
	}
}

/// Result of a successful session open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedSession {
	/// Identity of the opened session.
	pub id: SessionId,
}

/// Push events emitted by the transport.
#[derive(Debug)]
pub enum TransportEvent {
	/// Raw diagnostics for one document. Fully replaces the prior set.
	Diagnostics {
		/// Session the diagnostics were produced under.
		session: SessionId,
		/// Document the diagnostics belong to.
		uri: Uri,
		/// Document version the diagnostics were computed against, if known.
		version: Option<i32>,
		/// The new full set.
		diagnostics: Vec<Diagnostic>,
	},
	/// The server closed a session (restart or document teardown).
	SessionClosed {
		/// The session that is no longer valid.
		session: SessionId,
	},
	/// The transport connection is gone; no further events will arrive.
	Disconnected,
}

/// Wire transport for session lifecycle, requests, and push events.
#[async_trait]
pub trait AnalysisTransport: Send + Sync {
	/// Hands out the push-event stream.
	///
	/// May only be called once per transport; the single receiver is owned
	/// by the event router.
	fn events(&self) -> mpsc::UnboundedReceiver<TransportEvent>;

	/// Opens a session scoped to one document.
	async fn open(&self, config: SessionConfig) -> Result<StartedSession>;

	/// Issues a request against an open session.
	///
	/// `timeout` is the caller's per-request limit; `None` leaves the
	/// transport's own default in force.
	async fn request(
		&self,
		session: SessionId,
		method: &str,
		params: JsonValue,
		timeout: Option<Duration>,
	) -> Result<JsonValue>;

	/// Closes a session. Idempotent.
	async fn close(&self, session: SessionId) -> Result<()>;
}
