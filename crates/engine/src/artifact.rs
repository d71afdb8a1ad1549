//! Artifact identity and content snapshots.
//!
//! The engine never owns or mutates source artifacts; it only reads an
//! artifact's identity and a snapshot of its content. Both are cheap to
//! clone so cycle-scoped indices can hold them freely.

use std::fmt;
use std::sync::Arc;

/// Stable identity of a source or generated artifact (typically its
/// project-relative path).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId(Arc<str>);

impl ArtifactId {
	/// Creates an identity from a path-like string.
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	/// Returns the identity as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ArtifactId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for ArtifactId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ArtifactId({})", self.0)
	}
}

impl From<&str> for ArtifactId {
	fn from(s: &str) -> Self {
		Self::new(s)
	}
}

/// Immutable snapshot of an artifact's source text.
///
/// Retry rounds are built from snapshots captured when an unresolved-type
/// problem was observed, not from live artifact state, so a concurrent edit
/// cannot race the retry.
pub type SourceSnapshot = Arc<str>;

/// A unit of source the engine dispatches processors over.
#[derive(Clone, Debug)]
pub struct Artifact {
	id: ArtifactId,
	content: SourceSnapshot,
}

impl Artifact {
	/// Creates an artifact from its identity and current content.
	pub fn new(id: impl Into<ArtifactId>, content: impl Into<SourceSnapshot>) -> Self {
		Self {
			id: id.into(),
			content: content.into(),
		}
	}

	/// Returns the artifact's identity.
	pub fn id(&self) -> &ArtifactId {
		&self.id
	}

	/// Returns the content snapshot taken when this artifact entered the
	/// working set.
	pub fn content(&self) -> &SourceSnapshot {
		&self.content
	}
}

impl From<String> for ArtifactId {
	fn from(s: String) -> Self {
		Self::new(s)
	}
}
