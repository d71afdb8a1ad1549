//! Diagnostics reported against artifacts during a dispatch cycle.

/// Classification of a reported problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemKind {
	/// An error diagnostic.
	Error,
	/// A warning diagnostic.
	Warning,
	/// A reference to a type that does not (yet) exist. Not an engine
	/// error: the round loop consumes this as the retry signal.
	UnresolvedType,
}

/// One diagnostic attached to an artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Problem {
	kind: ProblemKind,
	message: String,
}

impl Problem {
	/// Creates a problem of the given kind.
	pub fn new(kind: ProblemKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}

	/// Shorthand for an unresolved-type diagnostic.
	pub fn unresolved_type(type_name: impl AsRef<str>) -> Self {
		Self::new(
			ProblemKind::UnresolvedType,
			format!("{} cannot be resolved to a type", type_name.as_ref()),
		)
	}

	/// Returns the problem classification.
	pub fn kind(&self) -> ProblemKind {
		self.kind
	}

	/// Returns the human-readable message.
	pub fn message(&self) -> &str {
		&self.message
	}

	/// `true` when this diagnostic reports a reference to a missing type.
	pub fn is_unresolved_type(&self) -> bool {
		self.kind == ProblemKind::UnresolvedType
	}
}
