//! Error types for classpath-root access.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by an archive reader.
#[derive(Debug, Error)]
pub enum ClasspathError {
	/// The archive could not be opened or listed.
	#[error("failed to read archive {path}: {reason}")]
	Archive {
		/// Canonical path of the archive root.
		path: PathBuf,
		/// Reader-specific failure description.
		reason: String,
	},

	/// An underlying I/O failure.
	#[error("I/O error reading {path}")]
	Io {
		/// Path of the entry or archive that failed.
		path: PathBuf,
		/// The underlying I/O error.
		#[source]
		error: std::io::Error,
	},
}
