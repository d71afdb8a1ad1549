//! Artifact filter: which candidates actually need processing.

use crate::artifact::Artifact;

/// Cheap syntactic scan for annotation usages, implemented by the host's
/// front-end. The engine only dispatches over artifacts that pass it.
pub trait AnnotationScanner {
	/// `true` when the artifact contains at least one annotation usage.
	fn has_annotations(&self, artifact: &Artifact) -> bool;
}

/// Returns the subset of `candidates` containing annotation usages.
pub fn artifacts_to_process(candidates: &[Artifact], scanner: &dyn AnnotationScanner) -> Vec<Artifact> {
	candidates
		.iter()
		.filter(|artifact| scanner.has_annotations(artifact))
		.cloned()
		.collect()
}
