//! Client plumbing for a goal-oriented language-analysis server.
//!
//! This crate owns everything between a view and the wire: session identity
//! and the per-document [`SessionCache`], typed analysis requests, the raw
//! diagnostics [`DocumentStore`] fed by push notifications, and the error
//! taxonomy the view layers classify against. The wire itself is behind the
//! [`AnalysisTransport`] trait; this crate never spawns processes or opens
//! connections on its own.
//!
//! Sessions are versioned capability tokens: the cache allocates a stable
//! slot per document plus a generation that advances every time the session
//! is replaced. Holders detect staleness by comparing against
//! [`SessionCache::is_current`], never via exceptions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export of the [`serde_json`] value type used for opaque payloads.
pub use serde_json::Value as JsonValue;

pub mod api;
pub mod client;
pub mod document;
pub mod session;
pub mod transport;

pub use api::{
	DocumentPosition, Goal, GoalList, Hypothesis, InteractiveDiagnostic, InteractiveText,
	LineRange, TermGoal, UserWidget, WidgetList,
};
pub use client::AnalysisClient;
pub use document::{
	DiagnosticsEvent, DiagnosticsEventReceiver, DiagnosticsEventSender, DocumentStore,
};
pub use session::{SessionCache, SessionHandle, SessionId};
pub use transport::{AnalysisTransport, SessionConfig, StartedSession, TransportEvent};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error code signalling that the document changed while the server was
/// processing the request. Distinct from all other codes; never user-visible.
pub const CONTENT_MODIFIED: i64 = -32801;

/// A structured error replied by the analysis server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ResponseError {
	/// Numeric error code.
	pub code: i64,
	/// Human-readable message. May be empty for degenerate errors.
	#[serde(default)]
	pub message: String,
	/// Optional structured payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<JsonValue>,
}

impl ResponseError {
	/// Creates an error with a code and message.
	pub fn new(code: i64, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			data: None,
		}
	}

	/// The well-known "document changed concurrently" error.
	pub fn content_modified() -> Self {
		Self::new(CONTENT_MODIFIED, "content modified")
	}

	/// Returns true when the serialized form of this error carries nothing a
	/// user could act on: no message and no data payload.
	///
	/// This is the named classification rule behind [`ErrorClass::Empty`]. It
	/// deliberately ignores the code: a bare code with no message still
	/// renders as a blank error box, which is worse than staying quiet.
	pub fn is_unstructured(&self) -> bool {
		self.message.is_empty() && self.data.is_none()
	}
}

/// Possible errors.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The session is gone and no reply will arrive.
	#[error("session closed")]
	SessionClosed,
	/// The peer replied undecodable or invalid data.
	#[error("deserialization failed: {0}")]
	Deserialize(String),
	/// The peer replied a structured error.
	#[error("{0}")]
	Response(#[from] ResponseError),
	/// The peer violated the analysis protocol.
	#[error("protocol error: {0}")]
	Protocol(String),
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Deserialize(err.to_string())
	}
}

/// Classification of a request failure, driving the view's recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
	/// Benign churn: the document changed under the request. Retry
	/// immediately, never surface.
	Transient,
	/// The error serializes to nothing meaningful. Suppress rather than
	/// flash a blank error state.
	Empty,
	/// A real protocol or server error. Surface the message.
	Fatal,
}

impl fmt::Display for ErrorClass {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ErrorClass::Transient => "transient",
			ErrorClass::Empty => "empty",
			ErrorClass::Fatal => "fatal",
		};
		f.write_str(name)
	}
}

impl Error {
	/// Classifies this error for the view's recovery policy.
	///
	/// The content-modified code wins over the unstructured check: a
	/// transient error is retried even when the server sent it bare.
	pub fn classify(&self) -> ErrorClass {
		match self {
			Error::Response(err) if err.code == CONTENT_MODIFIED => ErrorClass::Transient,
			Error::Response(err) if err.is_unstructured() => ErrorClass::Empty,
			_ => ErrorClass::Fatal,
		}
	}

	/// Returns true for the "document changed concurrently" error.
	pub fn is_content_modified(&self) -> bool {
		self.classify() == ErrorClass::Transient
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_content_modified_classifies_transient() {
		let err = Error::Response(ResponseError::content_modified());
		assert_eq!(err.classify(), ErrorClass::Transient);
		assert!(err.is_content_modified());
	}

	#[test]
	fn test_bare_content_modified_still_transient() {
		// Empty message must not demote the well-known code to Empty.
		let err = Error::Response(ResponseError::new(CONTENT_MODIFIED, ""));
		assert_eq!(err.classify(), ErrorClass::Transient);
	}

	#[test]
	fn test_unstructured_error_classifies_empty() {
		let err = Error::Response(ResponseError::new(1, ""));
		assert_eq!(err.classify(), ErrorClass::Empty);
	}

	#[test]
	fn test_error_with_data_is_not_empty() {
		let err = Error::Response(ResponseError {
			code: 1,
			message: String::new(),
			data: Some(serde_json::json!({"detail": "x"})),
		});
		assert_eq!(err.classify(), ErrorClass::Fatal);
	}

	#[test]
	fn test_structured_error_classifies_fatal() {
		let err = Error::Response(ResponseError::new(-32000, "boom"));
		assert_eq!(err.classify(), ErrorClass::Fatal);
		assert_eq!(err.to_string(), "boom");
	}

	#[test]
	fn test_non_response_errors_classify_fatal() {
		assert_eq!(Error::SessionClosed.classify(), ErrorClass::Fatal);
		assert_eq!(Error::Protocol("bad frame".into()).classify(), ErrorClass::Fatal);
	}
}
