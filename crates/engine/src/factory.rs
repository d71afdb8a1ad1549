//! Processor factories and the capability contract the engine dispatches
//! through.
//!
//! Factories are opaque to the engine: it only asks which annotation-type
//! patterns a factory supports, whether it is file-based or batch-only, and
//! for a processor bound to a claimed declaration set. Processor side
//! effects (generated artifacts, problems, dependencies) are observed
//! indirectly through the environment.

use crate::declaration::DeclarationSet;
use crate::env::ProcessingEnvironment;

/// How a factory may be dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactoryKind {
	/// May be invoked once per artifact, against that artifact's own
	/// declarations. Runs in every phase.
	FileBased,
	/// Must see the whole artifact set in one invocation. Only dispatched
	/// during a full build; skipped entirely for incremental builds and
	/// reconciles.
	BatchOnly,
}

/// A pluggable source of processors, registered with the engine in a fixed
/// order that determines claim precedence.
pub trait ProcessorFactory {
	/// Stable name used in trace output.
	fn name(&self) -> &str;

	/// Whether this factory is file-based or batch-only.
	fn kind(&self) -> FactoryKind;

	/// Annotation-type patterns this factory supports: exact qualified
	/// names, `prefix*` wildcards, or the universal `*`. An empty list is
	/// treated as `*`.
	fn supported_annotation_types(&self) -> Vec<String>;

	/// Produces a processor bound to `claim` for one dispatch invocation,
	/// or `None` if the factory declines.
	fn processor_for(
		&self,
		claim: DeclarationSet,
		env: &mut dyn ProcessingEnvironment,
	) -> Option<Box<dyn Processor>>;
}

/// A unit of work bound to one factory's claim. Invoked exactly once per
/// dispatch invocation; has no engine-visible return value.
pub trait Processor {
	/// Runs the processor. Effects are recorded on the environment.
	fn process(&mut self, env: &mut dyn ProcessingEnvironment);
}

/// Notified once after each round's dispatch completes, in registration
/// order.
pub trait RoundCompleteListener {
	/// Called when the round's processors have all run.
	fn round_complete(&self, env: &dyn ProcessingEnvironment);
}
