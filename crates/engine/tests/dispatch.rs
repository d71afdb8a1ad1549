//! End-to-end dispatch scenarios over fake collaborators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use annex_engine::{
	AnnotationDeclaration, AnnotationScanner, Artifact, ArtifactId, ArtifactSet, DeclarationSet,
	DependencyMap, Dispatcher, EnvironmentFactory, FactoryKind, PendingDeclarations, Phase,
	Problem, ProblemMap, ProcessingEnvironment, Processor, ProcessorFactory,
	RoundCompleteListener, SourceSnapshot, StoreError,
};

/// Observations shared between the test body and the fakes.
#[derive(Default)]
struct Shared {
	/// `begin:<artifact>`, `begin:batch`, `run:<factory>[claim]`,
	/// `listener:<name>` entries in occurrence order.
	log: RefCell<Vec<String>>,
	envs_built: Cell<usize>,
	envs_closed: Cell<usize>,
}

impl Shared {
	fn log(&self, entry: impl Into<String>) {
		self.log.borrow_mut().push(entry.into());
	}

	fn runs(&self) -> Vec<String> {
		self.log
			.borrow()
			.iter()
			.filter(|e| e.starts_with("run:"))
			.cloned()
			.collect()
	}
}

/// Treats every whitespace token starting with `@` as an annotation usage.
struct TokenScanner;

impl AnnotationScanner for TokenScanner {
	fn has_annotations(&self, artifact: &Artifact) -> bool {
		artifact.content().split_whitespace().any(|t| t.starts_with('@'))
	}
}

fn declarations_of(artifact: &Artifact) -> Vec<AnnotationDeclaration> {
	artifact
		.content()
		.split_whitespace()
		.filter_map(|t| t.strip_prefix('@'))
		.map(|name| AnnotationDeclaration::new(name.to_string()))
		.collect()
}

struct FakeEnv {
	shared: Rc<Shared>,
	phase: Phase,
	artifacts: Vec<Artifact>,
	declarations: FxHashMap<ArtifactId, Vec<AnnotationDeclaration>>,
	problems: ProblemMap,
	generated: FxHashMap<ArtifactId, bool>,
	dependencies: DependencyMap,
	listeners: Vec<Arc<dyn RoundCompleteListener>>,
	generated_sources: bool,
}

impl ProcessingEnvironment for FakeEnv {
	fn phase(&self) -> Phase {
		self.phase
	}

	fn artifacts(&self) -> &[Artifact] {
		&self.artifacts
	}

	fn annotation_types_in(&self, artifact: &ArtifactId) -> PendingDeclarations {
		self.declarations
			.get(artifact)
			.into_iter()
			.flatten()
			.cloned()
			.collect()
	}

	fn begin_artifact(&mut self, artifact: &ArtifactId) {
		self.shared.log(format!("begin:{artifact}"));
	}

	fn begin_batch(&mut self) {
		self.shared.log("begin:batch");
	}

	fn problems_in(&self, artifact: &ArtifactId) -> Vec<Problem> {
		self.problems.get(artifact).cloned().unwrap_or_default()
	}

	fn source_for(&self, artifact: &ArtifactId) -> Option<SourceSnapshot> {
		self.artifacts
			.iter()
			.find(|a| a.id() == artifact)
			.map(|a| a.content().clone())
	}

	fn generated_artifacts(&self) -> FxHashMap<ArtifactId, bool> {
		self.generated.clone()
	}

	fn has_generated_source_artifacts(&self) -> bool {
		self.generated_sources
	}

	fn has_generated_binary_artifacts(&self) -> bool {
		false
	}

	fn problems(&self) -> ProblemMap {
		self.problems.clone()
	}

	fn type_dependencies(&self) -> DependencyMap {
		self.dependencies.clone()
	}

	fn source_path_changed(&self) -> bool {
		false
	}

	fn record_problem(&mut self, artifact: &ArtifactId, problem: Problem) {
		self.problems.entry(artifact.clone()).or_default().push(problem);
	}

	fn record_generated(&mut self, artifact: ArtifactId, modified: bool) {
		self.generated.insert(artifact, modified);
		self.generated_sources = true;
	}

	fn record_dependency(&mut self, artifact: &ArtifactId, type_name: String) {
		self.dependencies
			.entry(artifact.clone())
			.or_default()
			.insert(type_name);
	}

	fn add_round_listener(&mut self, listener: Arc<dyn RoundCompleteListener>) {
		self.listeners.push(listener);
	}

	fn round_listeners(&self) -> Vec<Arc<dyn RoundCompleteListener>> {
		self.listeners.clone()
	}

	fn close(&mut self) {
		self.shared.envs_closed.set(self.shared.envs_closed.get() + 1);
	}
}

/// Builds fake environments; each round pops the next scripted problem map
/// (standing in for the compiler front-end's diagnostics for that round).
struct FakeEnvFactory {
	shared: Rc<Shared>,
	problem_script: RefCell<VecDeque<ProblemMap>>,
	listeners: Vec<Arc<dyn RoundCompleteListener>>,
}

impl FakeEnvFactory {
	fn new(shared: Rc<Shared>) -> Self {
		Self {
			shared,
			problem_script: RefCell::new(VecDeque::new()),
			listeners: Vec::new(),
		}
	}

	fn with_problem_script(shared: Rc<Shared>, script: Vec<ProblemMap>) -> Self {
		Self {
			shared,
			problem_script: RefCell::new(script.into()),
			listeners: Vec::new(),
		}
	}

	fn build_env(&self, artifacts: Vec<Artifact>, phase: Phase) -> Box<dyn ProcessingEnvironment> {
		self.shared.envs_built.set(self.shared.envs_built.get() + 1);
		let declarations = artifacts
			.iter()
			.map(|a| (a.id().clone(), declarations_of(a)))
			.collect();
		let problems = self.problem_script.borrow_mut().pop_front().unwrap_or_default();
		Box::new(FakeEnv {
			shared: self.shared.clone(),
			phase,
			artifacts,
			declarations,
			problems,
			generated: FxHashMap::default(),
			dependencies: DependencyMap::default(),
			listeners: self.listeners.clone(),
			generated_sources: false,
		})
	}
}

impl EnvironmentFactory for FakeEnvFactory {
	fn for_build(&self, artifacts: &[Artifact]) -> Box<dyn ProcessingEnvironment> {
		self.build_env(artifacts.to_vec(), Phase::Build)
	}

	fn for_build_with_sources(
		&self,
		artifacts: &[Artifact],
		sources: &[SourceSnapshot],
	) -> Box<dyn ProcessingEnvironment> {
		let rebuilt = artifacts
			.iter()
			.zip(sources)
			.map(|(a, s)| Artifact::new(a.id().clone(), s.clone()))
			.collect();
		self.build_env(rebuilt, Phase::Build)
	}

	fn for_reconcile(&self, artifact: &Artifact) -> Box<dyn ProcessingEnvironment> {
		self.build_env(vec![artifact.clone()], Phase::Reconcile)
	}
}

/// In-memory generated-artifact store with a deletion log.
#[derive(Default)]
struct FakeStore {
	generated: RefCell<FxHashMap<ArtifactId, ArtifactSet>>,
	deletions: RefCell<Vec<String>>,
}

impl FakeStore {
	fn seed(&self, parent: &str, generated: &[&str]) {
		self.generated.borrow_mut().insert(
			ArtifactId::new(parent),
			generated.iter().map(|g| ArtifactId::new(*g)).collect(),
		);
	}

	fn remove(&self, artifact: &ArtifactId, parent: &ArtifactId) -> bool {
		let mut map = self.generated.borrow_mut();
		map.get_mut(parent).is_some_and(|set| set.remove(artifact))
	}
}

impl annex_engine::GeneratedArtifactStore for FakeStore {
	fn generated_for_parent(&self, parent: &ArtifactId) -> ArtifactSet {
		self.generated.borrow().get(parent).cloned().unwrap_or_default()
	}

	fn delete_generated(&self, artifact: &ArtifactId, parent: &ArtifactId) -> Result<bool, StoreError> {
		self.deletions.borrow_mut().push(format!("persisted:{artifact}"));
		Ok(self.remove(artifact, parent))
	}

	fn delete_generated_in_memory(
		&self,
		artifact: &ArtifactId,
		parent: &ArtifactId,
	) -> Result<bool, StoreError> {
		self.deletions.borrow_mut().push(format!("in-memory:{artifact}"));
		Ok(self.remove(artifact, parent))
	}
}

/// Factory whose processors log their claim and optionally generate
/// artifacts or panic.
struct ScriptedFactory {
	name: &'static str,
	kind: FactoryKind,
	patterns: Vec<&'static str>,
	generates: Vec<&'static str>,
	panics: bool,
	shared: Rc<Shared>,
}

impl ScriptedFactory {
	fn file_based(name: &'static str, patterns: &[&'static str], shared: &Rc<Shared>) -> Box<Self> {
		Box::new(Self {
			name,
			kind: FactoryKind::FileBased,
			patterns: patterns.to_vec(),
			generates: Vec::new(),
			panics: false,
			shared: shared.clone(),
		})
	}

	fn batch_only(name: &'static str, patterns: &[&'static str], shared: &Rc<Shared>) -> Box<Self> {
		Box::new(Self {
			name,
			kind: FactoryKind::BatchOnly,
			patterns: patterns.to_vec(),
			generates: Vec::new(),
			panics: false,
			shared: shared.clone(),
		})
	}

	fn generating(mut self: Box<Self>, artifacts: &[&'static str]) -> Box<Self> {
		self.generates = artifacts.to_vec();
		self
	}

	fn panicking(mut self: Box<Self>) -> Box<Self> {
		self.panics = true;
		self
	}
}

impl ProcessorFactory for ScriptedFactory {
	fn name(&self) -> &str {
		self.name
	}

	fn kind(&self) -> FactoryKind {
		self.kind
	}

	fn supported_annotation_types(&self) -> Vec<String> {
		self.patterns.iter().map(|p| p.to_string()).collect()
	}

	fn processor_for(
		&self,
		claim: DeclarationSet,
		_env: &mut dyn ProcessingEnvironment,
	) -> Option<Box<dyn Processor>> {
		let mut names: Vec<String> = claim.iter().map(|d| d.qualified_name().to_string()).collect();
		names.sort();
		Some(Box::new(ScriptedProcessor {
			label: format!("run:{}[{}]", self.name, names.join(",")),
			generates: self.generates.clone(),
			panics: self.panics,
			shared: self.shared.clone(),
		}))
	}
}

struct ScriptedProcessor {
	label: String,
	generates: Vec<&'static str>,
	panics: bool,
	shared: Rc<Shared>,
}

impl Processor for ScriptedProcessor {
	fn process(&mut self, env: &mut dyn ProcessingEnvironment) {
		if self.panics {
			panic!("scripted processor fault");
		}
		self.shared.log(self.label.clone());
		for generated in &self.generates {
			env.record_generated(ArtifactId::new(*generated), true);
		}
	}
}

struct NamedListener {
	name: &'static str,
	shared: Rc<Shared>,
}

impl RoundCompleteListener for NamedListener {
	fn round_complete(&self, _env: &dyn ProcessingEnvironment) {
		self.shared.log(format!("listener:{}", self.name));
	}
}

fn id(s: &str) -> ArtifactId {
	ArtifactId::new(s)
}

fn ids(names: &[&str]) -> ArtifactSet {
	names.iter().map(|n| id(n)).collect()
}

fn unresolved(artifact: &str, type_name: &str) -> ProblemMap {
	let mut map = ProblemMap::default();
	map.insert(id(artifact), vec![Problem::unresolved_type(type_name)]);
	map
}

#[test]
fn wildcard_factory_preempts_later_factories() {
	let shared = Rc::new(Shared::default());
	let env_factory = FakeEnvFactory::new(shared.clone());
	let store = FakeStore::default();
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let factories: Vec<Box<dyn ProcessorFactory>> = vec![
		ScriptedFactory::file_based("wildcard", &["*"], &shared),
		ScriptedFactory::file_based("second", &["com.example.Foo"], &shared),
	];
	let artifacts = vec![
		Artifact::new("X.java", "@com.example.Foo class X {}"),
		Artifact::new("Y.java", "@com.example.Foo class Y {}"),
	];

	dispatcher.dispatch_build(&artifacts, &factories, true);

	// The wildcard factory claims @Foo for each artifact; the second
	// factory never sees a pending declaration.
	assert_eq!(
		shared.runs(),
		vec![
			"run:wildcard[com.example.Foo]".to_string(),
			"run:wildcard[com.example.Foo]".to_string(),
		]
	);
}

#[test]
fn overlapping_claims_stay_disjoint() {
	let shared = Rc::new(Shared::default());
	let env_factory = FakeEnvFactory::new(shared.clone());
	let store = FakeStore::default();
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let factories: Vec<Box<dyn ProcessorFactory>> = vec![
		ScriptedFactory::file_based("prefix", &["com.foo.*"], &shared),
		ScriptedFactory::file_based("exact", &["com.foo.A"], &shared),
	];
	let artifacts = vec![Artifact::new("X.java", "@com.foo.A @com.foo.B class X {}")];

	dispatcher.dispatch_build(&artifacts, &factories, true);

	// The prefix factory claimed both declarations, so the exact factory's
	// pattern matches nothing still pending and it is never invoked.
	assert_eq!(shared.runs(), vec!["run:prefix[com.foo.A,com.foo.B]".to_string()]);
}

#[test]
fn mixed_mode_dispatches_batch_first_then_per_artifact() {
	let shared = Rc::new(Shared::default());
	let env_factory = FakeEnvFactory::new(shared.clone());
	let store = FakeStore::default();
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let factories: Vec<Box<dyn ProcessorFactory>> = vec![
		ScriptedFactory::batch_only("batch", &["com.batch.*"], &shared),
		ScriptedFactory::file_based("file", &["com.file.Mark"], &shared),
	];
	let artifacts = vec![
		Artifact::new("A.java", "@com.batch.Gen @com.file.Mark class A {}"),
		Artifact::new("B.java", "@com.batch.Gen @com.file.Mark class B {}"),
		Artifact::new("C.java", "@com.batch.Gen @com.file.Mark class C {}"),
	];

	dispatcher.dispatch_build(&artifacts, &factories, true);

	assert_eq!(
		shared.runs(),
		vec![
			// One batch invocation over the whole set.
			"run:batch[com.batch.Gen]".to_string(),
			// Then once per artifact containing the file factory's claim.
			"run:file[com.file.Mark]".to_string(),
			"run:file[com.file.Mark]".to_string(),
			"run:file[com.file.Mark]".to_string(),
		]
	);
	let log = shared.log.borrow();
	assert_eq!(log.iter().filter(|e| *e == "begin:batch").count(), 1);
}

#[test]
fn batch_factory_is_gated_to_full_builds() {
	let shared = Rc::new(Shared::default());
	let env_factory = FakeEnvFactory::new(shared.clone());
	let store = FakeStore::default();
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let factories: Vec<Box<dyn ProcessorFactory>> = vec![
		ScriptedFactory::batch_only("batch", &["com.example.Foo"], &shared),
		ScriptedFactory::file_based("file", &["*"], &shared),
	];
	let artifact = Artifact::new("X.java", "@com.example.Foo class X {}");

	// Incremental build: file-based mode, batch factory skipped entirely;
	// the wildcard file factory picks up the declaration instead.
	dispatcher.dispatch_build(std::slice::from_ref(&artifact), &factories, false);
	assert_eq!(shared.runs(), vec!["run:file[com.example.Foo]".to_string()]);

	// Reconcile: same gating.
	shared.log.borrow_mut().clear();
	dispatcher.dispatch_reconcile(&artifact, &factories);
	assert_eq!(shared.runs(), vec!["run:file[com.example.Foo]".to_string()]);
}

#[test]
fn retry_stops_when_no_new_artifact_appears() {
	let shared = Rc::new(Shared::default());
	// The unresolved-type diagnostic persists into round two.
	let env_factory = FakeEnvFactory::with_problem_script(
		shared.clone(),
		vec![unresolved("X.java", "gen.Missing"), unresolved("X.java", "gen.Missing")],
	);
	let store = FakeStore::default();
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let factories: Vec<Box<dyn ProcessorFactory>> =
		vec![ScriptedFactory::file_based("gen", &["*"], &shared).generating(&["gen/G.java"])];
	let artifacts = vec![Artifact::new("X.java", "@com.example.Foo class X {}")];

	let result = dispatcher.dispatch_build(&artifacts, &factories, true);

	// Round two regenerated the same artifact, so the fixed point was
	// reached after exactly two rounds.
	assert_eq!(shared.envs_built.get(), 2);
	assert_eq!(shared.envs_closed.get(), 2);
	assert_eq!(result.modified(), &ids(&["gen/G.java"]));
	// The unresolved-type diagnostic is left in the final result.
	let problems = &result.problems()[&id("X.java")];
	assert!(problems.iter().any(|p| p.is_unresolved_type()));
}

#[test]
fn retry_clears_stale_problems_when_types_resolve() {
	let shared = Rc::new(Shared::default());
	// Round one reports the missing type; round two resolves it.
	let env_factory = FakeEnvFactory::with_problem_script(
		shared.clone(),
		vec![unresolved("X.java", "gen.Missing"), ProblemMap::default()],
	);
	let store = FakeStore::default();
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let factories: Vec<Box<dyn ProcessorFactory>> =
		vec![ScriptedFactory::file_based("gen", &["*"], &shared).generating(&["gen/G.java"])];
	let artifacts = vec![Artifact::new("X.java", "@com.example.Foo class X {}")];

	let result = dispatcher.dispatch_build(&artifacts, &factories, true);

	assert_eq!(shared.envs_built.get(), 2);
	// The first round's problems for X were cleared before the retry and
	// the retry reported none.
	assert!(!result.problems().contains_key(&id("X.java")));
}

#[test]
fn reconcile_never_retries_unresolved_types() {
	let shared = Rc::new(Shared::default());
	let env_factory = FakeEnvFactory::with_problem_script(
		shared.clone(),
		vec![unresolved("X.java", "gen.Missing")],
	);
	let store = FakeStore::default();
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let factories: Vec<Box<dyn ProcessorFactory>> =
		vec![ScriptedFactory::file_based("gen", &["*"], &shared).generating(&["gen/G.java"])];
	let artifact = Artifact::new("X.java", "@com.example.Foo class X {}");

	dispatcher.dispatch_reconcile(&artifact, &factories);

	assert_eq!(shared.envs_built.get(), 1);
}

#[test]
fn stale_generated_artifacts_are_retracted() {
	let shared = Rc::new(Shared::default());
	let env_factory = FakeEnvFactory::new(shared.clone());
	let store = FakeStore::default();
	store.seed("X.java", &["gen/A.java", "gen/B.java"]);
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	// This cycle only generates gen/A.java, so gen/B.java is stale.
	let factories: Vec<Box<dyn ProcessorFactory>> =
		vec![ScriptedFactory::file_based("gen", &["*"], &shared).generating(&["gen/A.java"])];
	let artifacts = vec![Artifact::new("X.java", "@com.example.Foo class X {}")];

	let result = dispatcher.dispatch_build(&artifacts, &factories, true);

	assert_eq!(result.deleted(), &ids(&["gen/B.java"]));
	assert!(result.modified().contains(&id("gen/A.java")));
	assert_eq!(store.deletions.borrow().as_slice(), &["persisted:gen/B.java".to_string()]);
}

#[test]
fn cleanup_still_runs_when_nothing_needs_processing() {
	let shared = Rc::new(Shared::default());
	let env_factory = FakeEnvFactory::new(shared.clone());
	let store = FakeStore::default();
	store.seed("X.java", &["gen/Old.java"]);
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let factories: Vec<Box<dyn ProcessorFactory>> =
		vec![ScriptedFactory::file_based("gen", &["*"], &shared)];
	// No annotations left in the artifact.
	let artifact = Artifact::new("X.java", "class X {}");

	let result = dispatcher.dispatch_reconcile(&artifact, &factories);

	// No environment was ever built, but the previously generated output
	// was retracted through the in-memory path.
	assert_eq!(shared.envs_built.get(), 0);
	assert_eq!(result.deleted(), &ids(&["gen/Old.java"]));
	assert_eq!(
		store.deletions.borrow().as_slice(),
		&["in-memory:gen/Old.java".to_string()]
	);
}

#[test]
fn processor_fault_degrades_to_empty_result_and_closes_env() {
	let shared = Rc::new(Shared::default());
	let env_factory = FakeEnvFactory::new(shared.clone());
	let store = FakeStore::default();
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let factories: Vec<Box<dyn ProcessorFactory>> =
		vec![ScriptedFactory::file_based("faulty", &["*"], &shared).panicking()];
	let artifacts = vec![Artifact::new("X.java", "@com.example.Foo class X {}")];

	let result = dispatcher.dispatch_build(&artifacts, &factories, true);

	assert!(result.modified().is_empty());
	assert!(result.deleted().is_empty());
	assert!(result.problems().is_empty());
	assert_eq!(shared.envs_closed.get(), 1);
}

#[test]
fn round_listeners_notified_once_in_registration_order() {
	let shared = Rc::new(Shared::default());
	let mut env_factory = FakeEnvFactory::new(shared.clone());
	env_factory.listeners = vec![
		Arc::new(NamedListener {
			name: "first",
			shared: shared.clone(),
		}),
		Arc::new(NamedListener {
			name: "second",
			shared: shared.clone(),
		}),
	];
	let store = FakeStore::default();
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let factories: Vec<Box<dyn ProcessorFactory>> =
		vec![ScriptedFactory::file_based("gen", &["*"], &shared)];
	let artifacts = vec![Artifact::new("X.java", "@com.example.Foo class X {}")];

	dispatcher.dispatch_build(&artifacts, &factories, true);

	let notifications: Vec<String> = shared
		.log
		.borrow()
		.iter()
		.filter(|e| e.starts_with("listener:"))
		.cloned()
		.collect();
	assert_eq!(notifications, vec!["listener:first".to_string(), "listener:second".to_string()]);
}

#[test]
fn empty_factory_list_short_circuits_to_cleanup() {
	let shared = Rc::new(Shared::default());
	let env_factory = FakeEnvFactory::new(shared.clone());
	let store = FakeStore::default();
	store.seed("X.java", &["gen/Old.java"]);
	let dispatcher = Dispatcher::new(&env_factory, &TokenScanner, &store);

	let artifacts = vec![Artifact::new("X.java", "@com.example.Foo class X {}")];
	let result = dispatcher.dispatch_build(&artifacts, &[], false);

	assert_eq!(shared.envs_built.get(), 0);
	assert_eq!(result.deleted(), &ids(&["gen/Old.java"]));

	// The full-build variant retracts leftovers the same way.
	store.seed("X.java", &["gen/Old.java"]);
	let result = dispatcher.dispatch_build(&artifacts, &[], true);
	assert_eq!(result.deleted(), &ids(&["gen/Old.java"]));
}
