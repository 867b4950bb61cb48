//! Failure taxonomy for every provider operation.

use thiserror::Error;

/// Errors returned by provider operations.
///
/// Every variant maps onto the POSIX errno a DMAPI caller would observe; see
/// [`Error::errno`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	/// The session id is `NO_SESSION`, unknown, destroyed or was assumed by another session.
	#[error("invalid session")]
	InvalidSession,
	/// The token is `NO_TOKEN`, `INVALID_TOKEN`, unknown or not yet delivered.
	#[error("invalid token")]
	InvalidToken,
	/// The requested right is not a valid request (e.g. requesting NULL).
	#[error("invalid right")]
	InvalidRight,
	/// An argument is out of range or not applicable to the object.
	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),
	/// No handle buffer was supplied.
	#[error("bad handle pointer")]
	BadHandlePointer,
	/// Handle byte length matches no handle kind.
	#[error("bad handle length {0}")]
	BadHandleLength(usize),
	/// The handle kind cannot be used with this operation (e.g. the global handle).
	#[error("handle kind not valid here")]
	BadHandleKind,
	/// The handle names an object that is not (or no longer) registered.
	#[error("stale handle")]
	StaleHandle,
	/// A name lookup found no entry.
	#[error("no such entry")]
	NoEntry,
	/// A name is already present in the parent directory.
	#[error("entry exists")]
	Exists,
	/// The right cannot be granted in the requested mode.
	#[error("right conflict")]
	RightConflict,
	/// The caller does not hold the state required for the transition.
	#[error("permission denied")]
	PermissionDenied,
	/// The hold already exists for this (session, token, object).
	#[error("already held")]
	AlreadyHeld,
	/// Nothing is held to release.
	#[error("not held")]
	NotHeld,
	/// The caller's buffer holds fewer elements than required.
	#[error("buffer too small, {required} required")]
	BufferTooSmall {
		/// Element count or byte length the caller must provide.
		required: usize,
	},
	/// A payload, info string or region list exceeds the configured limit.
	#[error("argument too large")]
	TooLarge,
	/// No message is queued and the caller asked not to wait.
	#[error("operation would block")]
	WouldBlock,
	/// The token was already answered.
	#[error("token already responded to")]
	TokenRetired,
	/// The token is outstanding in a different session.
	#[error("token not in session")]
	TokenNotInSession,
	/// The session still has undelivered messages.
	#[error("session busy")]
	SessionBusy,
	/// A data management application answered `Abort` with this errno.
	#[error("aborted by data management application (errno {0})")]
	Aborted(i32),
}

impl Error {
	/// Returns the errno a DMAPI caller observes for this error.
	pub const fn errno(&self) -> i32 {
		match self {
			Self::InvalidSession | Self::InvalidToken | Self::InvalidRight | Self::InvalidArgument(_) => libc::EINVAL,
			Self::BadHandlePointer => libc::EFAULT,
			Self::BadHandleLength(_) | Self::BadHandleKind | Self::StaleHandle => libc::EBADF,
			Self::NoEntry | Self::TokenNotInSession => libc::ENOENT,
			Self::Exists => libc::EEXIST,
			Self::RightConflict | Self::NotHeld => libc::EACCES,
			Self::PermissionDenied => libc::EPERM,
			Self::AlreadyHeld | Self::SessionBusy => libc::EBUSY,
			Self::BufferTooSmall { .. } | Self::TooLarge => libc::E2BIG,
			Self::WouldBlock => libc::EAGAIN,
			Self::TokenRetired => libc::ESRCH,
			Self::Aborted(errno) => *errno,
		}
	}
}

/// Result alias for provider operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
