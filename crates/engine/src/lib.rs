//! Round-based dispatch engine for pluggable annotation processors.
//!
//! Given a batch of compilation artifacts and an ordered list of processor
//! factories, the engine resolves which factory claims which declared
//! annotation, invokes the resulting processors, and iterates until no new
//! artifact is generated.
//!
//! # Architecture
//!
//! * [`filter`]: which candidate artifacts actually need processing
//! * [`claim`]: assigning pending annotation declarations to factories
//! * [`dispatch`]: file-based and mixed dispatch modes, the fixed-point
//!   retry loop, and the cycle fault boundary
//! * [`generated`]: diffing and retracting stale generated artifacts
//! * [`result`]: the merged per-cycle outcome
//! * [`env`]: the per-round environment contract the host implements
//!
//! The engine is synchronous and single-threaded within one cycle; claim
//! resolution follows factory-list order, keeping dispatch deterministic
//! for a fixed configuration. The compiler front-end, the persistent
//! generated-artifact store, and the processors themselves are opaque
//! collaborators behind the traits in [`env`], [`generated`], and
//! [`factory`].

pub mod artifact;
pub mod claim;
pub mod declaration;
pub mod dispatch;
pub mod env;
pub mod factory;
pub mod filter;
pub mod generated;
pub mod problem;
pub mod result;

pub use artifact::{Artifact, ArtifactId, SourceSnapshot};
pub use claim::{Claim, resolve_claim};
pub use declaration::{AnnotationDeclaration, DeclarationSet, PendingDeclarations};
pub use dispatch::Dispatcher;
pub use env::{
	DependencyMap, EnvironmentFactory, Phase, ProblemMap, ProcessingEnvironment, ScopedEnv,
};
pub use factory::{FactoryKind, Processor, ProcessorFactory, RoundCompleteListener};
pub use filter::{AnnotationScanner, artifacts_to_process};
pub use generated::{DeletionMode, GeneratedArtifactStore, StoreError};
pub use problem::{Problem, ProblemKind};
pub use result::{ArtifactSet, DispatchResult};
