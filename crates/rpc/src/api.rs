//! Typed requests against a goal-state session.
//!
//! Convenience methods on [`SessionHandle`] for the position-keyed analysis
//! requests, plus the serde wire structs they exchange. Message bodies use
//! [`InteractiveText`]: tagged text whose payloads carry hover and
//! navigation metadata the renderer interprets.

use lsp_types::{DiagnosticSeverity, Position, Range, TextDocumentIdentifier, Uri};
use scry_tagged_text::TaggedText;
use serde::{Deserialize, Serialize};

use crate::session::SessionHandle;
use crate::{JsonValue, Result};

/// Structured program text whose tags carry opaque hover/navigation payloads.
pub type InteractiveText = TaggedText<JsonValue>;

/// A cursor location within one document. Structural equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentPosition {
	/// Document the position points into.
	pub uri: Uri,
	/// Zero-based line/character within the document.
	pub position: Position,
}

impl DocumentPosition {
	/// Creates a position from its parts.
	pub fn new(uri: Uri, line: u32, character: u32) -> Self {
		Self {
			uri,
			position: Position { line, character },
		}
	}
}

/// A named hypothesis line within a goal's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hypothesis {
	/// Names bound to this hypothesis.
	pub names: Vec<String>,
	/// Type of the hypothesis.
	#[serde(rename = "type")]
	pub ty: InteractiveText,
	/// Definition body, when the hypothesis is a let-binding.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<InteractiveText>,
}

/// One open goal at the cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
	/// User-facing name of the goal, when the server provides one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_name: Option<String>,
	/// Hypotheses in scope.
	pub hypotheses: Vec<Hypothesis>,
	/// The goal's conclusion.
	pub target: InteractiveText,
}

/// All goals at the cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalList {
	/// Goals in display order.
	pub goals: Vec<Goal>,
}

/// The expected type at the term surrounding the cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermGoal {
	/// Span of the surrounding term.
	pub range: Range,
	/// Its expected type.
	#[serde(rename = "type")]
	pub ty: InteractiveText,
}

/// A server-defined widget instance anchored near the cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWidget {
	/// Stable widget identifier.
	pub id: String,
	/// Display name, when distinct from the identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Span the widget is anchored to.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub range: Option<Range>,
	/// Opaque widget props, forwarded to the renderer untouched.
	#[serde(default)]
	pub props: JsonValue,
}

/// All widgets at the cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetList {
	/// Widgets in display order.
	pub widgets: Vec<UserWidget>,
}

/// A diagnostic upgraded to structured, hoverable message text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveDiagnostic {
	/// Primary span.
	pub range: Range,
	/// Extended span covering the whole construct, when it differs.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub full_range: Option<Range>,
	/// Severity, when the server assigns one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub severity: Option<DiagnosticSeverity>,
	/// Structured message.
	pub message: InteractiveText,
}

/// Half-open line range restricting a diagnostics request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
	/// First line, inclusive.
	pub start: u32,
	/// Last line, exclusive.
	pub end: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PositionParams {
	text_document: TextDocumentIdentifier,
	position: Position,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DiagnosticsParams {
	#[serde(skip_serializing_if = "Option::is_none")]
	line_range: Option<LineRange>,
}

impl SessionHandle {
	fn position_params(&self, position: Position) -> PositionParams {
		PositionParams {
			text_document: TextDocumentIdentifier {
				uri: self.uri().clone(),
			},
			position,
		}
	}

	/// Fetches the open goals at a position.
	///
	/// `None` means the cursor is outside any goal-bearing region.
	pub async fn plain_goal(&self, position: Position) -> Result<Option<GoalList>> {
		self.request("analysis/goals", self.position_params(position))
			.await
	}

	/// Fetches the expected type of the term at a position.
	pub async fn plain_term_goal(&self, position: Position) -> Result<Option<TermGoal>> {
		self.request("analysis/termGoal", self.position_params(position))
			.await
	}

	/// Fetches the widgets anchored at a position.
	pub async fn widgets(&self, position: Position) -> Result<WidgetList> {
		self.request("analysis/widgets", self.position_params(position))
			.await
	}

	/// Fetches interactive diagnostics for this session's document.
	///
	/// `line_range` restricts the result; `None` fetches the whole file.
	pub async fn interactive_diagnostics(
		&self,
		line_range: Option<LineRange>,
	) -> Result<Vec<InteractiveDiagnostic>> {
		self.request("analysis/interactiveDiagnostics", DiagnosticsParams { line_range })
			.await
	}
}
