//! Generated-artifact lifecycle: diffing a cycle's outputs against the
//! previous cycle's and retracting what is no longer produced.
//!
//! The parent-to-generated mapping is owned by an external persistent
//! store; the engine only reads it and requests deletions. Deletion
//! failures are logged and skipped: the cycle never aborts because a stale
//! output could not be removed.

use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, warn};

use crate::artifact::ArtifactId;
use crate::result::ArtifactSet;

/// Failure from the generated-artifact store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
	/// The store could not delete a generated artifact.
	#[error("failed to delete generated artifact {artifact}: {reason}")]
	Delete {
		/// The artifact the deletion targeted.
		artifact: ArtifactId,
		/// Store-specific failure description.
		reason: String,
	},
	/// The store could not be read.
	#[error("generated-artifact store read failed: {0}")]
	Read(String),
}

/// Persistent mapping from a parent artifact to the artifacts it generated
/// in previous cycles. Externally owned; the store serializes concurrent
/// access per parent.
pub trait GeneratedArtifactStore {
	/// Artifacts recorded as generated by `parent` in the previous cycle.
	fn generated_for_parent(&self, parent: &ArtifactId) -> ArtifactSet;

	/// Deletes a generated artifact from disk and the mapping. Returns
	/// `true` when something was actually deleted.
	fn delete_generated(&self, artifact: &ArtifactId, parent: &ArtifactId) -> Result<bool, StoreError>;

	/// In-memory variant used while the parent is being reconciled rather
	/// than built.
	fn delete_generated_in_memory(
		&self,
		artifact: &ArtifactId,
		parent: &ArtifactId,
	) -> Result<bool, StoreError>;
}

/// How a stale generated artifact should be retracted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletionMode {
	/// The parent is being built; delete through the persistent path.
	Persisted,
	/// The parent is being reconciled in memory.
	InMemory,
}

/// Retracts every artifact `parent` generated previously but not in the
/// current cycle. Returns the artifacts actually deleted.
pub fn cleanup_stale_generated(
	store: &dyn GeneratedArtifactStore,
	parent: &ArtifactId,
	previous: &ArtifactSet,
	current: &FxHashSet<ArtifactId>,
	mode: DeletionMode,
) -> ArtifactSet {
	let mut deleted = ArtifactSet::default();
	for artifact in previous {
		if current.contains(artifact) {
			continue;
		}
		debug!(%artifact, %parent, "artifact is no longer generated for parent");
		let outcome = match mode {
			DeletionMode::Persisted => store.delete_generated(artifact, parent),
			DeletionMode::InMemory => store.delete_generated_in_memory(artifact, parent),
		};
		match outcome {
			Ok(true) => {
				deleted.insert(artifact.clone());
			}
			Ok(false) => {}
			Err(error) => {
				warn!(%artifact, %parent, %error, "could not clean up generated artifact");
			}
		}
	}
	deleted
}

/// Retracts everything `parent` ever generated. Used when a cycle runs no
/// processing at all but previously generated outputs may still exist.
pub fn cleanup_all_generated_for_parent(
	store: &dyn GeneratedArtifactStore,
	parent: &ArtifactId,
	mode: DeletionMode,
) -> ArtifactSet {
	let previous = store.generated_for_parent(parent);
	cleanup_stale_generated(store, parent, &previous, &FxHashSet::default(), mode)
}
