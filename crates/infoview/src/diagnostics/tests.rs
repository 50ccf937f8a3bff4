use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lsp_types::{Position, Range};
use scry_rpc::transport::{
	AnalysisTransport, SessionConfig, StartedSession, TransportEvent,
};
use scry_rpc::{JsonValue, ResponseError, Result, SessionCache, SessionId};
use tokio::sync::mpsc;

use super::*;

/// Transport whose interactive-diagnostics replies are scripted per call.
struct ScriptedTransport {
	replies: parking_lot::Mutex<VecDeque<Result<JsonValue>>>,
	fetch_count: AtomicUsize,
	/// When set, each fetch parks here until released.
	gate: Option<Arc<tokio::sync::Notify>>,
	entered: Arc<tokio::sync::Notify>,
}

impl ScriptedTransport {
	fn new(gated: bool) -> Arc<Self> {
		Arc::new(Self {
			replies: parking_lot::Mutex::new(VecDeque::new()),
			fetch_count: AtomicUsize::new(0),
			gate: gated.then(|| Arc::new(tokio::sync::Notify::new())),
			entered: Arc::new(tokio::sync::Notify::new()),
		})
	}

	fn push_reply(&self, reply: Result<JsonValue>) {
		self.replies.lock().push_back(reply);
	}

	fn release(&self) {
		if let Some(gate) = &self.gate {
			gate.notify_one();
		}
	}

	fn fetches(&self) -> usize {
		self.fetch_count.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl AnalysisTransport for ScriptedTransport {
	fn events(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
		let (_, rx) = mpsc::unbounded_channel();
		rx
	}

	async fn open(&self, config: SessionConfig) -> Result<StartedSession> {
		Ok(StartedSession { id: config.id })
	}

	async fn request(
		&self,
		_session: SessionId,
		method: &str,
		_params: JsonValue,
		_timeout: Option<Duration>,
	) -> Result<JsonValue> {
		assert_eq!(method, "analysis/interactiveDiagnostics");
		self.fetch_count.fetch_add(1, Ordering::SeqCst);
		self.entered.notify_one();
		if let Some(gate) = &self.gate {
			gate.notified().await;
		}
		self.replies
			.lock()
			.pop_front()
			.unwrap_or_else(|| panic!("no scripted reply left"))
	}

	async fn close(&self, _session: SessionId) -> Result<()> {
		Ok(())
	}
}

fn uri() -> Uri {
	"file:///demo.scry".parse().unwrap()
}

fn raw_diag(message: &str) -> Diagnostic {
	Diagnostic {
		range: Range::new(Position::new(0, 0), Position::new(0, 3)),
		message: message.to_string(),
		..Default::default()
	}
}

fn interactive_reply(messages: &[&str]) -> JsonValue {
	let list: Vec<JsonValue> = messages
		.iter()
		.map(|m| {
			serde_json::json!({
				"range": {
					"start": { "line": 0, "character": 0 },
					"end": { "line": 0, "character": 3 },
				},
				"message": { "text": m },
			})
		})
		.collect();
	JsonValue::Array(list)
}

struct Fixture {
	transport: Arc<ScriptedTransport>,
	aggregator: DiagnosticsAggregator,
	session: scry_rpc::SessionHandle,
	uri: Uri,
}

async fn fixture(gated: bool) -> Fixture {
	let transport = ScriptedTransport::new(gated);
	let cache = SessionCache::new(transport.clone());
	let (store, _events) = DocumentStore::new();
	let uri = uri();
	let session = cache.session_for(&uri).await.unwrap();
	Fixture {
		transport,
		aggregator: DiagnosticsAggregator::new(store),
		session,
		uri,
	}
}

fn message_of(diagnostics: &FileDiagnostics, index: usize) -> String {
	match diagnostics {
		FileDiagnostics::Interactive(list) => list[index].message.strip_tags(),
		FileDiagnostics::Raw(list) => list[index].message.clone(),
	}
}

#[tokio::test]
async fn test_no_raw_diagnostics_means_no_fetch() {
	let f = fixture(false).await;

	let result = f.aggregator.upgraded(&f.uri, &f.session).await;
	assert!(matches!(result, FileDiagnostics::Raw(ref list) if list.is_empty()));
	assert_eq!(f.transport.fetches(), 0);
}

#[tokio::test]
async fn test_upgrade_is_memoized_per_version() {
	let f = fixture(false).await;
	f.aggregator.store().update_diagnostics(&f.uri, vec![raw_diag("plain")]);
	f.transport.push_reply(Ok(interactive_reply(&["rich"])));

	let first = f.aggregator.upgraded(&f.uri, &f.session).await;
	assert!(first.is_interactive());
	assert_eq!(message_of(&first, 0), "rich");

	// Same raw version: memo answers, no second fetch.
	let second = f.aggregator.upgraded(&f.uri, &f.session).await;
	assert!(second.is_interactive());
	assert_eq!(f.transport.fetches(), 1);
}

#[tokio::test]
async fn test_raw_update_invalidates_memo() {
	let f = fixture(false).await;
	f.aggregator.store().update_diagnostics(&f.uri, vec![raw_diag("v1")]);
	f.transport.push_reply(Ok(interactive_reply(&["rich v1"])));

	let first = f.aggregator.upgraded(&f.uri, &f.session).await;
	assert_eq!(message_of(&first, 0), "rich v1");

	// A raw replacement lands; the V1 memo must never be returned again.
	f.aggregator.store().update_diagnostics(&f.uri, vec![raw_diag("v2")]);
	f.transport.push_reply(Ok(interactive_reply(&["rich v2"])));

	let second = f.aggregator.upgraded(&f.uri, &f.session).await;
	assert_eq!(message_of(&second, 0), "rich v2");
	assert_eq!(f.transport.fetches(), 2);
}

#[tokio::test]
async fn test_midflight_raw_update_discards_stale_result() {
	let f = fixture(true).await;
	f.aggregator.store().update_diagnostics(&f.uri, vec![raw_diag("v1")]);
	f.transport.push_reply(Ok(interactive_reply(&["rich v1"])));
	f.transport.push_reply(Ok(interactive_reply(&["rich v2"])));

	let aggregator = Arc::new(f.aggregator);
	let task_aggregator = aggregator.clone();
	let task_uri = f.uri.clone();
	let task_session = f.session.clone();
	let task =
		tokio::spawn(async move { task_aggregator.upgraded(&task_uri, &task_session).await });

	// Wait until the fetch is in flight, then land a raw replacement.
	f.transport.entered.notified().await;
	aggregator.store().update_diagnostics(&f.uri, vec![raw_diag("v2")]);

	// Release the stale fetch, then the recomputation.
	f.transport.release();
	f.transport.entered.notified().await;
	f.transport.release();

	let result = task.await.unwrap();
	assert_eq!(message_of(&result, 0), "rich v2", "stale memo must not be exposed");
	assert_eq!(f.transport.fetches(), 2);
}

#[tokio::test]
async fn test_empty_upgrade_falls_back_to_raw() {
	let f = fixture(false).await;
	f.aggregator.store().update_diagnostics(&f.uri, vec![raw_diag("plain")]);
	f.transport.push_reply(Ok(interactive_reply(&[])));

	let result = f.aggregator.upgraded(&f.uri, &f.session).await;
	assert!(!result.is_interactive(), "empty upgrade means fetch failure, raw stays");
	assert_eq!(message_of(&result, 0), "plain");

	// The failure is not memoized: the next demand retries.
	f.transport.push_reply(Ok(interactive_reply(&["rich"])));
	let retried = f.aggregator.upgraded(&f.uri, &f.session).await;
	assert!(retried.is_interactive());
	assert_eq!(f.transport.fetches(), 2);
}

#[tokio::test]
async fn test_fetch_error_falls_back_to_raw() {
	let f = fixture(false).await;
	f.aggregator.store().update_diagnostics(&f.uri, vec![raw_diag("plain")]);
	f.transport
		.push_reply(Err(ResponseError::new(-32000, "boom").into()));

	let result = f.aggregator.upgraded(&f.uri, &f.session).await;
	assert!(!result.is_interactive());
	assert_eq!(message_of(&result, 0), "plain");

	f.transport.push_reply(Ok(interactive_reply(&["rich"])));
	let retried = f.aggregator.upgraded(&f.uri, &f.session).await;
	assert!(retried.is_interactive());
	assert_eq!(f.transport.fetches(), 2);
}

#[tokio::test]
async fn test_concurrent_upgrades_share_one_fetch() {
	let f = fixture(true).await;
	f.aggregator.store().update_diagnostics(&f.uri, vec![raw_diag("plain")]);
	f.transport.push_reply(Ok(interactive_reply(&["rich"])));

	let aggregator = Arc::new(f.aggregator);
	let a1 = aggregator.clone();
	let a2 = aggregator.clone();
	let (u1, u2) = (f.uri.clone(), f.uri.clone());
	let (s1, s2) = (f.session.clone(), f.session.clone());

	let t1 = tokio::spawn(async move { a1.upgraded(&u1, &s1).await });
	f.transport.entered.notified().await;
	let t2 = tokio::spawn(async move { a2.upgraded(&u2, &s2).await });

	// Give the waiter a moment to park on the memo channel.
	tokio::time::sleep(Duration::from_millis(50)).await;
	f.transport.release();

	let (r1, r2) = tokio::join!(t1, t2);
	assert!(r1.unwrap().is_interactive());
	assert!(r2.unwrap().is_interactive());
	assert_eq!(f.transport.fetches(), 1);
}

#[tokio::test]
async fn test_current_prefers_matching_memo_only() {
	let f = fixture(false).await;
	f.aggregator.store().update_diagnostics(&f.uri, vec![raw_diag("plain")]);

	// Before any upgrade: raw.
	assert!(!f.aggregator.current(&f.uri).is_interactive());

	f.transport.push_reply(Ok(interactive_reply(&["rich"])));
	let _ = f.aggregator.upgraded(&f.uri, &f.session).await;
	assert!(f.aggregator.current(&f.uri).is_interactive());

	// A raw replacement demotes the view back to raw until re-upgraded.
	f.aggregator.store().update_diagnostics(&f.uri, vec![raw_diag("newer")]);
	let current = f.aggregator.current(&f.uri);
	assert!(!current.is_interactive());
	assert_eq!(message_of(&current, 0), "newer");
}
