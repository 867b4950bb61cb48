//! Numeric identifiers.

use std::fmt;

/// Identifier of a data management session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub i32);

impl SessionId {
	/// `DM_NO_SESSION`; never names a live session.
	pub const NONE: Self = Self(0);

	pub const fn is_none(self) -> bool {
		self.0 == Self::NONE.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "sid:{}", self.0)
	}
}

/// Correlates a delivered event (or user event) with its response.
///
/// Token values are unique across the whole provider, not just one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub i32);

impl Token {
	/// `DM_INVALID_TOKEN`.
	pub const INVALID: Self = Self(0);
	/// `DM_NO_TOKEN`.
	pub const NONE: Self = Self(-1);

	/// Whether this value could name an issued token.
	pub const fn is_issued(self) -> bool {
		self.0 > 0
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "tok:{}", self.0)
	}
}

/// Filesystem identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FsId(pub u64);

/// Inode number within a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ino(pub u64);
