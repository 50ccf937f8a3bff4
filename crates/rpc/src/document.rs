//! Per-document raw diagnostics state.
//!
//! Raw diagnostics arrive push-style from the server and fully replace the
//! prior set for their document; there is no incremental patching. Every
//! replacement stamps the document with a fresh version drawn from a global
//! counter; the version is the memo key for the lazy interactive upgrade
//! layered on top of this store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lsp_types::{Diagnostic, DiagnosticSeverity, Uri};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

/// Event emitted when the raw diagnostics for a document are replaced.
#[derive(Debug, Clone)]
pub struct DiagnosticsEvent {
	/// Document whose set changed.
	pub uri: Uri,
	/// Number of error diagnostics in the new set.
	pub error_count: usize,
	/// Number of warning diagnostics in the new set.
	pub warning_count: usize,
}

/// Sender for diagnostics events.
pub type DiagnosticsEventSender = mpsc::UnboundedSender<DiagnosticsEvent>;

/// Receiver for diagnostics events.
pub type DiagnosticsEventReceiver = mpsc::UnboundedReceiver<DiagnosticsEvent>;

#[derive(Debug)]
struct DocumentEntry {
	diagnostics: Vec<Diagnostic>,
	version: u64,
}

/// Raw diagnostics per document, with per-document replacement versions.
#[derive(Debug)]
pub struct DocumentStore {
	docs: RwLock<HashMap<Uri, DocumentEntry>>,
	/// Global replacement counter; each update stamps its document with the
	/// next value, so versions are unique across documents and time.
	version: AtomicU64,
	events_tx: DiagnosticsEventSender,
}

impl DocumentStore {
	/// Creates a store and the receiver for its change events.
	pub fn new() -> (Arc<Self>, DiagnosticsEventReceiver) {
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let store = Arc::new(Self {
			docs: RwLock::new(HashMap::new()),
			version: AtomicU64::new(0),
			events_tx,
		});
		(store, events_rx)
	}

	/// Replaces the full diagnostics set for a document.
	pub fn update_diagnostics(&self, uri: &Uri, diagnostics: Vec<Diagnostic>) {
		let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
		let error_count = count_severity(&diagnostics, DiagnosticSeverity::ERROR);
		let warning_count = count_severity(&diagnostics, DiagnosticSeverity::WARNING);

		{
			let mut docs = self.docs.write();
			docs.insert(
				uri.clone(),
				DocumentEntry {
					diagnostics,
					version,
				},
			);
		}

		debug!(
			uri = %uri.as_str(),
			version,
			error_count,
			warning_count,
			"diagnostics.replaced"
		);

		let _ = self.events_tx.send(DiagnosticsEvent {
			uri: uri.clone(),
			error_count,
			warning_count,
		});
	}

	/// The current raw set for a document. Empty when none has arrived.
	pub fn diagnostics(&self, uri: &Uri) -> Vec<Diagnostic> {
		self.docs
			.read()
			.get(uri)
			.map(|entry| entry.diagnostics.clone())
			.unwrap_or_default()
	}

	/// The replacement version for a document. Zero when none has arrived.
	pub fn diagnostics_version(&self, uri: &Uri) -> u64 {
		self.docs.read().get(uri).map(|entry| entry.version).unwrap_or(0)
	}

	/// Number of error diagnostics for a document.
	pub fn error_count(&self, uri: &Uri) -> usize {
		self.docs
			.read()
			.get(uri)
			.map(|entry| count_severity(&entry.diagnostics, DiagnosticSeverity::ERROR))
			.unwrap_or(0)
	}

	/// Number of warning diagnostics for a document.
	pub fn warning_count(&self, uri: &Uri) -> usize {
		self.docs
			.read()
			.get(uri)
			.map(|entry| count_severity(&entry.diagnostics, DiagnosticSeverity::WARNING))
			.unwrap_or(0)
	}

	/// Forgets a document entirely.
	pub fn remove(&self, uri: &Uri) {
		self.docs.write().remove(uri);
	}

	/// Number of tracked documents.
	pub fn len(&self) -> usize {
		self.docs.read().len()
	}

	/// Returns true when no document is tracked.
	pub fn is_empty(&self) -> bool {
		self.docs.read().is_empty()
	}
}

fn count_severity(diagnostics: &[Diagnostic], severity: DiagnosticSeverity) -> usize {
	diagnostics
		.iter()
		.filter(|d| d.severity == Some(severity))
		.count()
}

#[cfg(test)]
mod tests {
	use lsp_types::{Position, Range};

	use super::*;

	fn diag(severity: DiagnosticSeverity, message: &str) -> Diagnostic {
		Diagnostic {
			range: Range::new(Position::new(0, 0), Position::new(0, 1)),
			severity: Some(severity),
			message: message.to_string(),
			..Default::default()
		}
	}

	fn uri() -> Uri {
		"file:///demo.scry".parse().unwrap()
	}

	#[test]
	fn test_update_replaces_full_set() {
		let (store, _rx) = DocumentStore::new();
		let uri = uri();

		store.update_diagnostics(&uri, vec![diag(DiagnosticSeverity::ERROR, "a")]);
		store.update_diagnostics(&uri, vec![diag(DiagnosticSeverity::WARNING, "b")]);

		let diags = store.diagnostics(&uri);
		assert_eq!(diags.len(), 1);
		assert_eq!(diags[0].message, "b");
		assert_eq!(store.error_count(&uri), 0);
		assert_eq!(store.warning_count(&uri), 1);
	}

	#[test]
	fn test_versions_advance_per_replacement() {
		let (store, _rx) = DocumentStore::new();
		let uri = uri();

		assert_eq!(store.diagnostics_version(&uri), 0);
		store.update_diagnostics(&uri, vec![]);
		let v1 = store.diagnostics_version(&uri);
		store.update_diagnostics(&uri, vec![]);
		let v2 = store.diagnostics_version(&uri);
		assert!(v2 > v1);
		assert!(v1 > 0);
	}

	#[test]
	fn test_events_carry_counts() {
		let (store, mut rx) = DocumentStore::new();
		let uri = uri();

		store.update_diagnostics(
			&uri,
			vec![
				diag(DiagnosticSeverity::ERROR, "a"),
				diag(DiagnosticSeverity::ERROR, "b"),
				diag(DiagnosticSeverity::WARNING, "c"),
			],
		);

		let event = rx.try_recv().unwrap();
		assert_eq!(event.uri, uri);
		assert_eq!(event.error_count, 2);
		assert_eq!(event.warning_count, 1);
	}
}
