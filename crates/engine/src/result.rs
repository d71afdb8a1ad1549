//! The aggregated outcome of a dispatch cycle.

use rustc_hash::FxHashSet;

use crate::artifact::ArtifactId;
use crate::env::{DependencyMap, ProblemMap};

/// Set of artifact identities.
pub type ArtifactSet = FxHashSet<ArtifactId>;

/// Everything one dispatch cycle produced, merged across rounds: artifacts
/// modified and deleted, the dependency and problem maps, and the flags the
/// round loop steers by.
#[derive(Clone, Debug, Default)]
pub struct DispatchResult {
	modified: ArtifactSet,
	deleted: ArtifactSet,
	dependencies: DependencyMap,
	problems: ProblemMap,
	source_path_changed: bool,
	has_generated_types: bool,
}

impl DispatchResult {
	/// The benign empty result: nothing modified, nothing deleted, no
	/// problems. Also what a caught cycle fault degrades to.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Assembles a single round's result.
	pub fn new(
		modified: ArtifactSet,
		deleted: ArtifactSet,
		dependencies: DependencyMap,
		problems: ProblemMap,
		source_path_changed: bool,
		has_generated_types: bool,
	) -> Self {
		Self {
			modified,
			deleted,
			dependencies,
			problems,
			source_path_changed,
			has_generated_types,
		}
	}

	/// A cleanup-only result carrying just deleted artifacts.
	pub fn deletions_only(deleted: ArtifactSet) -> Self {
		Self {
			deleted,
			..Self::default()
		}
	}

	/// Artifacts generated or rewritten this cycle.
	pub fn modified(&self) -> &ArtifactSet {
		&self.modified
	}

	/// Previously generated artifacts retracted this cycle.
	pub fn deleted(&self) -> &ArtifactSet {
		&self.deleted
	}

	/// Type-dependency edges, keyed by artifact.
	pub fn dependencies(&self) -> &DependencyMap {
		&self.dependencies
	}

	/// Problems reported this cycle, keyed by artifact.
	pub fn problems(&self) -> &ProblemMap {
		&self.problems
	}

	/// `true` when processing changed the source path.
	pub fn source_path_changed(&self) -> bool {
		self.source_path_changed
	}

	/// `true` when any source or binary artifact was generated.
	pub fn has_generated_types(&self) -> bool {
		self.has_generated_types
	}

	/// Merges a later round into this result.
	///
	/// Deletions and modifications accumulate as unions; the later round's
	/// dependency and problem entries replace this result's entries for the
	/// same artifact; flags are or-ed.
	pub fn merge(&mut self, later: DispatchResult) {
		self.modified.extend(later.modified);
		self.deleted.extend(later.deleted);
		for (artifact, deps) in later.dependencies {
			self.dependencies.insert(artifact, deps);
		}
		for (artifact, problems) in later.problems {
			self.problems.insert(artifact, problems);
		}
		self.source_path_changed |= later.source_path_changed;
		self.has_generated_types |= later.has_generated_types;
	}

	/// Drops the recorded dependency edges for one artifact. Used before a
	/// retry round reprocesses it.
	pub fn remove_dependencies_from(&mut self, artifact: &ArtifactId) {
		self.dependencies.remove(artifact);
	}

	/// Drops the recorded problems for one artifact. Used before a retry
	/// round reprocesses it.
	pub fn remove_problems_from(&mut self, artifact: &ArtifactId) {
		self.problems.remove(artifact);
	}
}
