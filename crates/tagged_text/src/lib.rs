//! Recursive tagged-text trees.
//!
//! A [`TaggedText`] is program text in which arbitrary spans carry an opaque
//! tag payload (hover targets, navigation anchors, diff markers). The tree is
//! pure data plus a structural evaluator: rendering walks the tree and hands
//! every tagged span to a [`TextSink`], which decides what the tag means. The
//! evaluator itself assigns no meaning to tags.
//!
//! # Invariants
//!
//! Trees are finite and acyclic. The children of an [`TaggedText::Append`]
//! node are rendered strictly left to right; their order is significant
//! content, not presentation.
//!
//! # Wire shape
//!
//! The serde representation is externally tagged: `{"text": "…"}`,
//! `{"append": […]}`, `{"tag": [t, subtree]}`. A payload matching none of
//! the three shapes fails deserialization; that failure is a protocol
//! contract breach and is propagated, never patched over.

use serde::{Deserialize, Serialize};

/// Text annotated with opaque tag payloads on arbitrary subtrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaggedText<T> {
	/// A leaf run of plain text.
	Text(String),
	/// An ordered sequence of subtrees. Order is significant.
	Append(Vec<TaggedText<T>>),
	/// A subtree annotated with a tag payload.
	Tag(T, Box<TaggedText<T>>),
}

/// Consumer of a [`TaggedText`] walk.
///
/// Implementors receive plain text runs via [`TextSink::text`] and tagged
/// subtrees via [`TextSink::tag`]. The default `tag` implementation recurses
/// into the subtree, so sinks that ignore tags only implement `text`.
pub trait TextSink<T> {
	/// A run of plain text.
	fn text(&mut self, content: &str);

	/// A tagged subtree. The handler may recurse via [`TaggedText::render`].
	fn tag(&mut self, tag: &T, subtree: &TaggedText<T>) {
		let _ = tag;
		subtree.render(self);
	}
}

impl<T> TaggedText<T> {
	/// An empty tree.
	pub fn empty() -> Self {
		TaggedText::Text(String::new())
	}

	/// A plain text leaf.
	pub fn text(content: impl Into<String>) -> Self {
		TaggedText::Text(content.into())
	}

	/// A tagged subtree.
	pub fn tagged(tag: T, subtree: TaggedText<T>) -> Self {
		TaggedText::Tag(tag, Box::new(subtree))
	}

	/// Walks the tree in order, feeding every node to `sink`.
	pub fn render<S: TextSink<T> + ?Sized>(&self, sink: &mut S) {
		match self {
			TaggedText::Text(content) => sink.text(content),
			TaggedText::Append(items) => {
				for item in items {
					item.render(sink);
				}
			}
			TaggedText::Tag(tag, subtree) => sink.tag(tag, subtree),
		}
	}

	/// Flattens the tree to plain text, dropping all tags.
	///
	/// Append order is preserved verbatim.
	pub fn strip_tags(&self) -> String {
		struct Plain(String);

		impl<T> TextSink<T> for Plain {
			fn text(&mut self, content: &str) {
				self.0.push_str(content);
			}
		}

		let mut sink = Plain(String::new());
		self.render(&mut sink);
		sink.0
	}

	/// Rebuilds the tree with every tag mapped through `f`.
	///
	/// The structure and text are preserved exactly.
	pub fn map_tags<U>(self, f: &mut impl FnMut(T) -> U) -> TaggedText<U> {
		match self {
			TaggedText::Text(content) => TaggedText::Text(content),
			TaggedText::Append(items) => {
				TaggedText::Append(items.into_iter().map(|item| item.map_tags(f)).collect())
			}
			TaggedText::Tag(tag, subtree) => TaggedText::Tag(f(tag), Box::new(subtree.map_tags(f))),
		}
	}

	/// Returns true when the tree contains no text at all.
	pub fn is_empty(&self) -> bool {
		match self {
			TaggedText::Text(content) => content.is_empty(),
			TaggedText::Append(items) => items.iter().all(TaggedText::is_empty),
			TaggedText::Tag(_, subtree) => subtree.is_empty(),
		}
	}
}

impl<T> Default for TaggedText<T> {
	fn default() -> Self {
		Self::empty()
	}
}
