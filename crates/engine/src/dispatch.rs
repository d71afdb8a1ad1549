//! The dispatch cycle: artifact filtering, mode selection, claim-driven
//! processor invocation, and the fixed-point retry loop.
//!
//! One cycle is a single synchronous unit of work. Claim resolution walks
//! factories in their configured order, so repeated runs with the same
//! factory configuration dispatch deterministically. Any fault escaping a
//! processor is caught at the cycle boundary and degrades that round to the
//! empty result; it never aborts the surrounding build.

use std::panic::{self, AssertUnwindSafe};

use rustc_hash::FxHashMap;
use tracing::{debug, error, trace};

use crate::artifact::{Artifact, ArtifactId, SourceSnapshot};
use crate::claim::resolve_claim;
use crate::declaration::{DeclarationSet, PendingDeclarations};
use crate::env::{EnvironmentFactory, Phase, ProcessingEnvironment, ScopedEnv};
use crate::factory::{FactoryKind, ProcessorFactory};
use crate::filter::{AnnotationScanner, artifacts_to_process};
use crate::generated::{
	DeletionMode, GeneratedArtifactStore, cleanup_all_generated_for_parent, cleanup_stale_generated,
};
use crate::result::{ArtifactSet, DispatchResult};

/// An artifact that reported an unresolved-type problem, plus the source
/// snapshot captured when the problem was seen. Retry rounds are built from
/// the snapshot, not from live artifact state.
struct MissingType {
	artifact: Artifact,
	source: SourceSnapshot,
}

/// The dispatch engine. Holds the collaborator seams; each call to
/// [`Dispatcher::dispatch_build`] or [`Dispatcher::dispatch_reconcile`] is
/// one independent cycle with its own environment and result.
pub struct Dispatcher<'a> {
	env_factory: &'a dyn EnvironmentFactory,
	scanner: &'a dyn AnnotationScanner,
	store: &'a dyn GeneratedArtifactStore,
}

impl<'a> Dispatcher<'a> {
	/// Creates a dispatcher over the host's collaborators.
	pub fn new(
		env_factory: &'a dyn EnvironmentFactory,
		scanner: &'a dyn AnnotationScanner,
		store: &'a dyn GeneratedArtifactStore,
	) -> Self {
		Self {
			env_factory,
			scanner,
			store,
		}
	}

	/// Runs one build cycle over `candidates`. `full_build` enables
	/// batch-only factories; an incremental build dispatches file-based
	/// factories only.
	pub fn dispatch_build(
		&self,
		candidates: &[Artifact],
		factories: &[Box<dyn ProcessorFactory>],
		full_build: bool,
	) -> DispatchResult {
		let to_process = artifacts_to_process(candidates, self.scanner);
		if factories.is_empty() || to_process.is_empty() {
			trace!(
				candidates = candidates.len(),
				factories = factories.len(),
				"nothing to process this cycle"
			);
			return self.cleanup_only(candidates, DeletionMode::Persisted);
		}
		let env = self.env_factory.for_build(&to_process);
		self.run_rounds(factories, env, full_build)
	}

	/// Runs one reconcile cycle for a single artifact being edited in
	/// memory. Batch-only factories never run here.
	pub fn dispatch_reconcile(
		&self,
		artifact: &Artifact,
		factories: &[Box<dyn ProcessorFactory>],
	) -> DispatchResult {
		if factories.is_empty() || !self.scanner.has_annotations(artifact) {
			trace!(artifact = %artifact.id(), "no annotations to reconcile");
			return self.cleanup_only(std::slice::from_ref(artifact), DeletionMode::InMemory);
		}
		let env = self.env_factory.for_reconcile(artifact);
		self.run_rounds(factories, env, false)
	}

	/// Cleanup-only exit: even when nothing needs processing, outputs
	/// generated for these parents in earlier cycles must be retracted.
	fn cleanup_only(&self, parents: &[Artifact], mode: DeletionMode) -> DispatchResult {
		let mut deleted = ArtifactSet::default();
		for parent in parents {
			deleted.extend(cleanup_all_generated_for_parent(self.store, parent.id(), mode));
		}
		if deleted.is_empty() {
			DispatchResult::empty()
		} else {
			DispatchResult::deletions_only(deleted)
		}
	}

	/// Drives dispatch rounds to the fixed point: retry while the previous
	/// round generated types, some artifacts still reference missing types,
	/// and the latest round produced an artifact not seen before.
	fn run_rounds(
		&self,
		factories: &[Box<dyn ProcessorFactory>],
		env: Box<dyn ProcessingEnvironment>,
		full_build: bool,
	) -> DispatchResult {
		let phase = env.phase();
		let mut missing = Vec::new();
		let mut result = self.run_round(factories, env, full_build, &mut missing);

		if phase != Phase::Build {
			return result;
		}

		let mut progressed = result.has_generated_types();
		while progressed && !missing.is_empty() {
			// The retry will reprocess these artifacts; its findings replace
			// whatever the previous round recorded for them.
			for entry in &missing {
				result.remove_dependencies_from(entry.artifact.id());
				result.remove_problems_from(entry.artifact.id());
			}

			let retry = std::mem::take(&mut missing);
			let artifacts: Vec<Artifact> = retry.iter().map(|m| m.artifact.clone()).collect();
			let sources: Vec<SourceSnapshot> = retry.iter().map(|m| m.source.clone()).collect();
			debug!(artifacts = artifacts.len(), "retrying artifacts with unresolved types");

			let env = self.env_factory.for_build_with_sources(&artifacts, &sources);
			let new_result = self.run_round(factories, env, full_build, &mut missing);

			// Progress means a generated artifact the accumulated result has
			// not seen; without one, permanently-unresolvable references
			// would loop forever.
			progressed = new_result
				.modified()
				.iter()
				.any(|artifact| !result.modified().contains(artifact));
			result.merge(new_result);
		}
		result
	}

	/// Runs one round inside the fault boundary, closing the environment on
	/// every exit path.
	fn run_round(
		&self,
		factories: &[Box<dyn ProcessorFactory>],
		env: Box<dyn ProcessingEnvironment>,
		full_build: bool,
		missing: &mut Vec<MissingType>,
	) -> DispatchResult {
		let mut env = ScopedEnv::new(env);
		let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
			self.round_body(factories, &mut env, full_build, missing)
		}));
		match outcome {
			Ok(result) => result,
			Err(_) => {
				error!(
					artifacts = %artifact_names(env.artifacts()),
					"unexpected processor fault; dropping this round's results"
				);
				DispatchResult::empty()
			}
		}
	}

	fn round_body(
		&self,
		factories: &[Box<dyn ProcessorFactory>],
		env: &mut ScopedEnv,
		full_build: bool,
		missing: &mut Vec<MissingType>,
	) -> DispatchResult {
		let artifacts: Vec<Artifact> = env.artifacts().to_vec();

		// Read the previous cycle's outputs before processors run, so the
		// stale diff is against the pre-round state of the store.
		let mut previous: FxHashMap<ArtifactId, ArtifactSet> = FxHashMap::default();
		for artifact in &artifacts {
			previous.insert(
				artifact.id().clone(),
				self.store.generated_for_parent(artifact.id()),
			);
		}

		let has_batch = factories.iter().any(|f| f.kind() == FactoryKind::BatchOnly);
		if full_build && env.phase() == Phase::Build && has_batch {
			self.dispatch_mixed(factories, &artifacts, env, missing);
		} else {
			self.dispatch_file_based(factories, &artifacts, env, missing);
		}

		for listener in env.round_listeners() {
			listener.round_complete(&**env);
		}

		let mut modified = ArtifactSet::default();
		let mut current = ArtifactSet::default();
		for (artifact, was_modified) in env.generated_artifacts() {
			if was_modified {
				modified.insert(artifact.clone());
			}
			current.insert(artifact);
		}

		let mode = match env.phase() {
			Phase::Reconcile => DeletionMode::InMemory,
			Phase::Build => DeletionMode::Persisted,
		};
		let mut deleted = ArtifactSet::default();
		for artifact in &artifacts {
			if let Some(prev) = previous.get(artifact.id()) {
				deleted.extend(cleanup_stale_generated(
					self.store,
					artifact.id(),
					prev,
					&current,
					mode,
				));
			}
		}

		let has_generated =
			env.has_generated_source_artifacts() || env.has_generated_binary_artifacts();
		DispatchResult::new(
			modified,
			deleted,
			env.type_dependencies(),
			env.problems(),
			env.source_path_changed(),
			has_generated,
		)
	}

	/// File-based mode: each artifact is visited independently; factories
	/// resolve claims against that artifact's own declarations.
	fn dispatch_file_based(
		&self,
		factories: &[Box<dyn ProcessorFactory>],
		artifacts: &[Artifact],
		env: &mut ScopedEnv,
		missing: &mut Vec<MissingType>,
	) {
		for artifact in artifacts {
			env.begin_artifact(artifact.id());
			let mut pending = env.annotation_types_in(artifact.id());
			for factory in factories {
				if factory.kind() == FactoryKind::BatchOnly {
					continue;
				}
				if let Some(claim) = resolve_claim(&factory.supported_annotation_types(), &mut pending) {
					let declarations = claim.into_declarations();
					if !declarations.is_empty() {
						if let Some(mut processor) = factory.processor_for(declarations, &mut **env) {
							trace!(
								factory = factory.name(),
								artifact = %artifact.id(),
								"invoking file-based processor"
							);
							processor.process(&mut **env);
							record_missing_type(artifact, &**env, missing);
						}
					}
				}
				if pending.is_empty() {
					break;
				}
			}
			if !pending.is_empty() {
				trace!(
					artifact = %artifact.id(),
					unclaimed = pending.len(),
					"unclaimed annotations remain"
				);
			}
		}
	}

	/// Mixed mode: factories are classified once against the global
	/// declaration index; batch factories see the whole set first, then
	/// file-based factories run per artifact on the intersection of the
	/// artifact's declarations with their global claim.
	fn dispatch_mixed(
		&self,
		factories: &[Box<dyn ProcessorFactory>],
		artifacts: &[Artifact],
		env: &mut ScopedEnv,
		missing: &mut Vec<MissingType>,
	) {
		let mut per_artifact: FxHashMap<ArtifactId, DeclarationSet> = FxHashMap::default();
		let mut global = PendingDeclarations::new();
		for artifact in artifacts {
			let in_file = env.annotation_types_in(artifact.id()).to_set();
			for declaration in &in_file {
				global.insert(declaration.clone());
			}
			per_artifact.insert(artifact.id().clone(), in_file);
		}

		for artifact in artifacts {
			record_missing_type(artifact, &**env, missing);
		}

		if global.is_empty() {
			trace!("no annotations in the working set");
			return;
		}

		let mut batch_claims: FxHashMap<usize, DeclarationSet> = FxHashMap::default();
		let mut file_claims: FxHashMap<usize, DeclarationSet> = FxHashMap::default();
		for (index, factory) in factories.iter().enumerate() {
			if let Some(claim) = resolve_claim(&factory.supported_annotation_types(), &mut global) {
				let universal = claim.is_universal();
				let bucket = match factory.kind() {
					FactoryKind::BatchOnly => &mut batch_claims,
					FactoryKind::FileBased => &mut file_claims,
				};
				bucket.insert(index, claim.into_declarations());
				if universal {
					// A universal claim took everything; later factories
					// have nothing left to classify against.
					break;
				}
			}
			if global.is_empty() {
				break;
			}
		}
		if !global.is_empty() {
			trace!(unclaimed = global.len(), "unclaimed annotations remain");
		}

		// Claims are fixed now; dispatch in factory-list order so repeated
		// runs behave the same.
		if !batch_claims.is_empty() {
			env.begin_batch();
			for (index, factory) in factories.iter().enumerate() {
				let Some(claim) = batch_claims.get(&index) else {
					continue;
				};
				if claim.is_empty() {
					continue;
				}
				if let Some(mut processor) = factory.processor_for(claim.clone(), &mut **env) {
					trace!(factory = factory.name(), "invoking batch processor");
					processor.process(&mut **env);
				}
			}
		}

		if !file_claims.is_empty() {
			for artifact in artifacts {
				let Some(in_file) = per_artifact.get(artifact.id()) else {
					continue;
				};
				if in_file.is_empty() {
					continue;
				}
				for (index, factory) in factories.iter().enumerate() {
					let Some(for_factory) = file_claims.get(&index) else {
						continue;
					};
					if for_factory.is_empty() {
						continue;
					}
					let claim: DeclarationSet = in_file.intersection(for_factory).cloned().collect();
					if claim.is_empty() {
						continue;
					}
					env.begin_artifact(artifact.id());
					if let Some(mut processor) = factory.processor_for(claim, &mut **env) {
						trace!(
							factory = factory.name(),
							artifact = %artifact.id(),
							"invoking file-based processor"
						);
						processor.process(&mut **env);
					}
				}
			}
		}
	}
}

/// Records `artifact` as a retry candidate when it currently reports an
/// unresolved-type problem. Only meaningful during a build; reconcile never
/// retries. Each artifact is recorded at most once per round.
fn record_missing_type(
	artifact: &Artifact,
	env: &dyn ProcessingEnvironment,
	missing: &mut Vec<MissingType>,
) {
	if env.phase() != Phase::Build {
		return;
	}
	if missing.iter().any(|m| m.artifact.id() == artifact.id()) {
		return;
	}
	let unresolved = env
		.problems_in(artifact.id())
		.iter()
		.any(|problem| problem.is_unresolved_type());
	if !unresolved {
		return;
	}
	match env.source_for(artifact.id()) {
		Some(source) => missing.push(MissingType {
			artifact: artifact.clone(),
			source,
		}),
		None => {
			debug!(artifact = %artifact.id(), "no source snapshot available; skipping retry");
		}
	}
}

/// Artifact names for fault logging.
fn artifact_names(artifacts: &[Artifact]) -> String {
	match artifacts {
		[] => "no artifacts".to_string(),
		[single] => single.id().to_string(),
		many => many
			.iter()
			.map(|a| a.id().as_str())
			.collect::<Vec<_>>()
			.join(", "),
	}
}
