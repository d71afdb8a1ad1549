//! Archive-backed classpath roots for resolving generated binary types.
//!
//! A [`ClasspathArchive`] wraps one classpath root (a jar-like archive)
//! behind an [`ArchiveReader`] collaborator that lists entries and reads
//! type bytes; decoding classfile contents stays outside this crate. Each
//! archive keeps a lazily built package cache so the common miss case
//! (asking for a type in a package the root does not contain) never touches
//! the reader.
//!
//! Module descriptors are cached process-wide in [`ModuleCache`], keyed by
//! canonical root identity, with an explicit lifecycle: populated on first
//! access per root and invalidated on workspace or classpath-change
//! notifications.

pub mod archive;
pub mod error;
pub mod modules;

pub use archive::{ArchiveReader, ClasspathArchive};
pub use error::ClasspathError;
pub use modules::{ModuleCache, ModuleSet, module_cache};
