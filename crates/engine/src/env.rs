//! Per-round processing environment and its factory.
//!
//! The environment is cycle-session state owned by the host's compiler
//! front-end: the working artifact set, the per-artifact annotation index,
//! and the accumulators processors write into. The engine creates one fresh
//! environment per round and must close it on every exit path, so dispatch
//! wraps it in [`ScopedEnv`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::artifact::{Artifact, ArtifactId, SourceSnapshot};
use crate::declaration::PendingDeclarations;
use crate::factory::RoundCompleteListener;
use crate::problem::Problem;

/// Which kind of cycle the environment was built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
	/// A whole-project (full or incremental) build.
	Build,
	/// An in-memory reconcile of a single artifact.
	Reconcile,
}

/// Problems accumulated per artifact.
pub type ProblemMap = FxHashMap<ArtifactId, Vec<Problem>>;

/// Type-dependency edges accumulated per artifact.
pub type DependencyMap = FxHashMap<ArtifactId, FxHashSet<String>>;

/// Session state for one round of dispatch.
///
/// Created fresh for each round and closed (releasing scratch compiler
/// state) when the round's dispatch finishes. The engine reads indices and
/// accumulators from it; processors record their side effects through it.
pub trait ProcessingEnvironment {
	/// The phase this environment was built for.
	fn phase(&self) -> Phase;

	/// The working artifact set for this round.
	fn artifacts(&self) -> &[Artifact];

	/// Annotation declarations present in one artifact, as a fresh pending
	/// map for claim resolution.
	fn annotation_types_in(&self, artifact: &ArtifactId) -> PendingDeclarations;

	/// Scopes subsequent processor side effects to one artifact.
	fn begin_artifact(&mut self, artifact: &ArtifactId);

	/// Scopes subsequent processor side effects to the whole set (batch
	/// dispatch).
	fn begin_batch(&mut self);

	/// Current diagnostics for one artifact, including compiler-reported
	/// ones. The round loop scans these for unresolved-type problems.
	fn problems_in(&self, artifact: &ArtifactId) -> Vec<Problem>;

	/// Source snapshot for an artifact in the working set.
	fn source_for(&self, artifact: &ArtifactId) -> Option<SourceSnapshot>;

	/// Artifacts generated during this round, mapped to whether the
	/// artifact's previous content was modified.
	fn generated_artifacts(&self) -> FxHashMap<ArtifactId, bool>;

	/// `true` if any source artifact was generated this round.
	fn has_generated_source_artifacts(&self) -> bool;

	/// `true` if any binary artifact was generated this round.
	fn has_generated_binary_artifacts(&self) -> bool;

	/// All problems accumulated this round, keyed by artifact.
	fn problems(&self) -> ProblemMap;

	/// All type-dependency edges accumulated this round.
	fn type_dependencies(&self) -> DependencyMap;

	/// `true` when processing changed the source path (e.g. a new generated
	/// source folder appeared).
	fn source_path_changed(&self) -> bool;

	/// Records a problem against an artifact (processor-facing).
	fn record_problem(&mut self, artifact: &ArtifactId, problem: Problem);

	/// Records a generated artifact (processor-facing). `modified` is `true`
	/// when an existing artifact's content changed.
	fn record_generated(&mut self, artifact: ArtifactId, modified: bool);

	/// Records a type-dependency edge (processor-facing).
	fn record_dependency(&mut self, artifact: &ArtifactId, type_name: String);

	/// Registers a listener notified when the round's dispatch completes.
	fn add_round_listener(&mut self, listener: Arc<dyn RoundCompleteListener>);

	/// Listeners to notify at round completion, in registration order.
	fn round_listeners(&self) -> Vec<Arc<dyn RoundCompleteListener>>;

	/// Releases scratch compiler state. Called exactly once, on every exit
	/// path of the round that owns this environment.
	fn close(&mut self);
}

/// Builds environments for the engine. Implemented by the host on top of
/// its compiler front-end.
pub trait EnvironmentFactory {
	/// Environment over the given artifacts for a build cycle.
	fn for_build(&self, artifacts: &[Artifact]) -> Box<dyn ProcessingEnvironment>;

	/// Environment for a retry round, built from captured source snapshots
	/// rather than live artifact state. `sources` parallels `artifacts`.
	fn for_build_with_sources(
		&self,
		artifacts: &[Artifact],
		sources: &[SourceSnapshot],
	) -> Box<dyn ProcessingEnvironment>;

	/// Environment for an in-memory reconcile of a single artifact.
	fn for_reconcile(&self, artifact: &Artifact) -> Box<dyn ProcessingEnvironment>;
}

/// Close-on-drop wrapper around a round's environment.
///
/// Dispatch runs inside a panic boundary; the drop guarantees `close` runs
/// on the panic path as well as the normal one.
pub struct ScopedEnv {
	env: Box<dyn ProcessingEnvironment>,
}

impl ScopedEnv {
	/// Takes ownership of the environment for the duration of one round.
	pub fn new(env: Box<dyn ProcessingEnvironment>) -> Self {
		Self { env }
	}
}

impl Deref for ScopedEnv {
	type Target = dyn ProcessingEnvironment;

	fn deref(&self) -> &Self::Target {
		&*self.env
	}
}

impl DerefMut for ScopedEnv {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut *self.env
	}
}

impl Drop for ScopedEnv {
	fn drop(&mut self) {
		self.env.close();
	}
}
