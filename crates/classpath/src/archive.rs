//! One archive-backed classpath root with a lazy package cache.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::warn;

use crate::error::ClasspathError;

/// Reads an archive's structure and contents. Implemented by the host's
/// binary-artifact reader; this crate never decodes classfile contents
/// itself.
pub trait ArchiveReader: Send + Sync {
	/// All entry paths in the archive, `/`-separated
	/// (e.g. `com/foo/Bar.class`).
	fn entries(&self) -> Result<Vec<String>, ClasspathError>;

	/// Raw bytes of the type stored at `binary_path`, or `None` when the
	/// entry does not exist.
	fn read_type(&self, binary_path: &str) -> Result<Option<Vec<u8>>, ClasspathError>;

	/// Names of the modules this archive declares.
	fn module_names(&self) -> Result<Vec<String>, ClasspathError>;
}

/// One classpath root, identified by its canonical path.
///
/// The package cache is built from the entry listing on the first
/// [`ClasspathArchive::is_package`] query and dropped again by
/// [`ClasspathArchive::reset`]; every type lookup is gated on it, so a root
/// that cannot contain the requested package answers without touching the
/// reader.
pub struct ClasspathArchive {
	path: PathBuf,
	reader: Box<dyn ArchiveReader>,
	package_cache: Mutex<Option<FxHashSet<String>>>,
}

impl ClasspathArchive {
	/// Opens a root over the given reader. The root path is canonicalized;
	/// on failure the absolute path is used as identity instead.
	pub fn new(root: &Path, reader: Box<dyn ArchiveReader>) -> Self {
		let path = root
			.canonicalize()
			.or_else(|_| std::path::absolute(root))
			.unwrap_or_else(|_| root.to_path_buf());
		Self {
			path,
			reader,
			package_cache: Mutex::new(None),
		}
	}

	/// Canonical identity of this root.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Whether the archive contains the `/`-separated package. The empty
	/// string (default package) is always present.
	pub fn is_package(&self, qualified_package: &str) -> bool {
		let mut cache = self.package_cache.lock();
		cache
			.get_or_insert_with(|| self.build_package_cache())
			.contains(qualified_package)
	}

	/// Raw bytes of the type at `binary_path` (e.g. `com/foo/Bar.class`),
	/// or `None` when the package or entry is absent. Reader failures are
	/// logged and treated as a missing type.
	pub fn find_type(&self, binary_path: &str) -> Option<Vec<u8>> {
		let package = binary_path.rsplit_once('/').map_or("", |(p, _)| p);
		if !self.is_package(package) {
			return None;
		}
		match self.reader.read_type(binary_path) {
			Ok(bytes) => bytes,
			Err(error) => {
				warn!(path = %self.path.display(), binary_path, %error, "type lookup failed");
				None
			}
		}
	}

	/// Simple names of the types directly inside `qualified_package`.
	pub fn type_names_in_package(&self, qualified_package: &str) -> Vec<String> {
		if !self.is_package(qualified_package) {
			return Vec::new();
		}
		let entries = match self.reader.entries() {
			Ok(entries) => entries,
			Err(error) => {
				warn!(path = %self.path.display(), %error, "could not list archive entries");
				return Vec::new();
			}
		};
		entries
			.iter()
			.filter_map(|entry| {
				let (package, file) = entry.rsplit_once('/')?;
				if package != qualified_package {
					return None;
				}
				let (name, _extension) = file.rsplit_once('.')?;
				Some(name.to_string())
			})
			.collect()
	}

	/// Module names declared by this archive. Reader failures are logged
	/// and yield an empty set.
	pub fn load_module_names(&self) -> FxHashSet<String> {
		match self.reader.module_names() {
			Ok(names) => names.into_iter().collect(),
			Err(error) => {
				warn!(path = %self.path.display(), %error, "could not load module declarations");
				FxHashSet::default()
			}
		}
	}

	/// Drops the package cache; the next query rebuilds it from the
	/// reader.
	pub fn reset(&self) {
		*self.package_cache.lock() = None;
	}

	fn build_package_cache(&self) -> FxHashSet<String> {
		let mut packages = FxHashSet::default();
		packages.insert(String::new());
		match self.reader.entries() {
			Ok(entries) => {
				for entry in entries {
					insert_ancestor_packages(&entry, &mut packages);
				}
			}
			Err(error) => {
				warn!(path = %self.path.display(), %error, "could not build package cache");
			}
		}
		packages
	}
}

/// Inserts the package of `entry` and all its ancestors, stopping early
/// when an ancestor is already present.
fn insert_ancestor_packages(entry: &str, packages: &mut FxHashSet<String>) {
	let Some(mut end) = entry.rfind('/') else {
		return;
	};
	loop {
		let package = &entry[..end];
		if !packages.insert(package.to_string()) {
			return;
		}
		match package.rfind('/') {
			Some(next) => end = next,
			None => return,
		}
	}
}
