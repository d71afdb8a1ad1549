//! Claim resolution: assigning pending annotation declarations to a factory.
//!
//! A factory declares the annotation types it supports as a list of
//! patterns: exact qualified names, `prefix*` wildcards, or the universal
//! `*`. Resolution walks the patterns against the pending map, removing
//! every declaration it claims, so a declaration claimed by one factory can
//! never be claimed again in the same cycle.

use crate::declaration::{DeclarationSet, PendingDeclarations};

/// Outcome of resolving one factory's patterns against the pending map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Claim {
	/// The factory claimed everything still pending (it declared `*`, or
	/// declared no patterns at all). The pending map is left empty; during
	/// mixed-mode classification this short-circuits the remaining
	/// factories.
	Universal(DeclarationSet),
	/// The factory claimed the declarations matched by its exact and
	/// prefix patterns. Never empty.
	Matched(DeclarationSet),
}

impl Claim {
	/// Returns `true` for a universal (`*`) claim.
	pub fn is_universal(&self) -> bool {
		matches!(self, Claim::Universal(_))
	}

	/// Borrows the claimed declarations.
	pub fn declarations(&self) -> &DeclarationSet {
		match self {
			Claim::Universal(set) | Claim::Matched(set) => set,
		}
	}

	/// Consumes the claim, yielding the claimed declarations.
	pub fn into_declarations(self) -> DeclarationSet {
		match self {
			Claim::Universal(set) | Claim::Matched(set) => set,
		}
	}
}

/// Resolves the declarations a factory claims out of `pending`.
///
/// Claimed declarations are removed from `pending`. Returns `None` when the
/// patterns match nothing still pending, which callers must distinguish
/// from a universal claim over an already-empty map (the latter yields
/// `Claim::Universal` with an empty set, and no processor is invoked for
/// it).
///
/// A `prefix*` pattern strips the trailing `*` and the character before it,
/// so `"com.foo.*"` claims names starting with `"com.foo"`.
pub fn resolve_claim(patterns: &[String], pending: &mut PendingDeclarations) -> Option<Claim> {
	if patterns.is_empty() {
		return Some(Claim::Universal(pending.drain_all().into_iter().collect()));
	}

	let mut claimed = DeclarationSet::default();
	for pattern in patterns {
		if pattern == "*" {
			claimed.extend(pending.drain_all());
			return Some(Claim::Universal(claimed));
		} else if let Some(prefix) = wildcard_prefix(pattern) {
			claimed.extend(pending.drain_where_prefixed(prefix));
		} else if let Some(decl) = pending.remove(pattern) {
			claimed.insert(decl);
		}
	}

	if claimed.is_empty() {
		None
	} else {
		Some(Claim::Matched(claimed))
	}
}

/// Returns the claim prefix of a `…*` pattern, or `None` for exact names.
fn wildcard_prefix(pattern: &str) -> Option<&str> {
	let stem = pattern.strip_suffix('*')?;
	// The separator before the `*` is dropped too: "com.foo.*" -> "com.foo".
	match stem.char_indices().last() {
		Some((idx, _)) => Some(&stem[..idx]),
		None => Some(""),
	}
}
