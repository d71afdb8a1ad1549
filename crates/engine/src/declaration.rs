//! Annotation declarations and the cycle-scoped pending map.

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

/// An annotation type found in the working set during one dispatch cycle,
/// keyed by fully-qualified name. Discarded when the cycle ends.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationDeclaration {
	qualified_name: Arc<str>,
}

impl AnnotationDeclaration {
	/// Creates a declaration for the given fully-qualified annotation name.
	pub fn new(qualified_name: impl Into<Arc<str>>) -> Self {
		Self {
			qualified_name: qualified_name.into(),
		}
	}

	/// Returns the fully-qualified annotation type name.
	pub fn qualified_name(&self) -> &str {
		&self.qualified_name
	}
}

impl fmt::Debug for AnnotationDeclaration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "@{}", self.qualified_name)
	}
}

/// Set of declarations claimed by (or handed to) one factory.
pub type DeclarationSet = FxHashSet<AnnotationDeclaration>;

/// Annotation declarations not yet claimed by any factory in the current
/// resolution pass.
///
/// Claim resolution takes this map by exclusive reference and removes every
/// entry it claims, so the destructive update is visible in the signature
/// rather than hidden behind a shared map.
#[derive(Clone, Debug, Default)]
pub struct PendingDeclarations {
	by_name: FxHashMap<Arc<str>, AnnotationDeclaration>,
}

impl PendingDeclarations {
	/// Creates an empty pending map.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a declaration, keyed by its qualified name.
	pub fn insert(&mut self, decl: AnnotationDeclaration) {
		self.by_name.insert(decl.qualified_name.clone(), decl);
	}

	/// Removes and returns the declaration with the given exact name.
	pub fn remove(&mut self, qualified_name: &str) -> Option<AnnotationDeclaration> {
		self.by_name.remove(qualified_name)
	}

	/// Removes and returns every declaration whose name starts with `prefix`.
	pub fn drain_where_prefixed(&mut self, prefix: &str) -> Vec<AnnotationDeclaration> {
		let names: Vec<Arc<str>> = self
			.by_name
			.keys()
			.filter(|name| name.starts_with(prefix))
			.cloned()
			.collect();
		names
			.into_iter()
			.filter_map(|name| self.by_name.remove(&name))
			.collect()
	}

	/// Removes and returns every remaining declaration.
	pub fn drain_all(&mut self) -> Vec<AnnotationDeclaration> {
		self.by_name.drain().map(|(_, decl)| decl).collect()
	}

	/// Returns `true` when nothing remains unclaimed.
	pub fn is_empty(&self) -> bool {
		self.by_name.is_empty()
	}

	/// Number of declarations still pending.
	pub fn len(&self) -> usize {
		self.by_name.len()
	}

	/// Iterates the still-pending declarations.
	pub fn iter(&self) -> impl Iterator<Item = &AnnotationDeclaration> {
		self.by_name.values()
	}

	/// Copies the still-pending declarations into a set.
	pub fn to_set(&self) -> DeclarationSet {
		self.by_name.values().cloned().collect()
	}
}

impl FromIterator<AnnotationDeclaration> for PendingDeclarations {
	fn from_iter<I: IntoIterator<Item = AnnotationDeclaration>>(iter: I) -> Self {
		let mut pending = Self::new();
		for decl in iter {
			pending.insert(decl);
		}
		pending
	}
}
