//! Process-wide module cache with an explicit lifecycle.
//!
//! Module declarations are expensive to extract from an archive, so they
//! are cached once per classpath root for the whole process. The cache is
//! keyed by the root's canonical path, populated on first access, and
//! invalidated explicitly when the host observes a workspace or
//! classpath-change notification. Nothing here is implicit: stale entries
//! survive until someone calls [`ModuleCache::invalidate`] or
//! [`ModuleCache::invalidate_all`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::archive::ClasspathArchive;

/// Module names declared by one classpath root.
pub type ModuleSet = FxHashSet<String>;

/// Cache of module declarations per canonical classpath root.
#[derive(Default)]
pub struct ModuleCache {
	roots: RwLock<FxHashMap<PathBuf, Arc<ModuleSet>>>,
}

impl ModuleCache {
	/// Creates an empty cache. Most callers want [`module_cache`] instead;
	/// separate instances exist for tests.
	pub fn new() -> Self {
		Self::default()
	}

	/// Module names for `archive`, loading and caching them on first
	/// access to that root.
	pub fn modules_for(&self, archive: &ClasspathArchive) -> Arc<ModuleSet> {
		if let Some(modules) = self.roots.read().get(archive.path()) {
			return Arc::clone(modules);
		}
		let loaded = Arc::new(archive.load_module_names());
		debug!(root = %archive.path().display(), modules = loaded.len(), "caching module declarations");
		let mut roots = self.roots.write();
		Arc::clone(roots.entry(archive.path().to_path_buf()).or_insert(loaded))
	}

	/// Whether `archive` declares a module named `module`.
	pub fn serves_module(&self, archive: &ClasspathArchive, module: &str) -> bool {
		self.modules_for(archive).contains(module)
	}

	/// Drops the cached declarations for one root; the next access
	/// reloads them.
	pub fn invalidate(&self, root: &Path) {
		self.roots.write().remove(root);
	}

	/// Drops every cached root, e.g. after a wholesale classpath change.
	pub fn invalidate_all(&self) {
		self.roots.write().clear();
	}
}

/// The process-wide module cache.
pub fn module_cache() -> &'static ModuleCache {
	static CACHE: Lazy<ModuleCache> = Lazy::new(ModuleCache::new);
	&CACHE
}
