//! Object handles.
//!
//! A handle is either the reserved global handle, a filesystem handle, or an
//! object handle naming one inode generation. The byte encoding is fixed
//! length per kind, so decoding only needs the buffer length to tell them
//! apart:
//!
//! | kind   | bytes | layout                                   |
//! |--------|-------|------------------------------------------|
//! | global | 1     | `[0x01]`                                 |
//! | fs     | 8     | fsid (LE u64)                            |
//! | object | 20    | fsid (LE u64), ino (LE u64), igen (LE u32) |

use std::fmt;

use crate::error::{Error, Result};
use crate::ids::{FsId, Ino};

/// Encoded length of the global handle.
pub const GLOBAL_HANDLE_LEN: usize = 1;
/// Encoded length of a filesystem handle.
pub const FS_HANDLE_LEN: usize = 8;
/// Encoded length of an object handle; also the largest handle.
pub const OBJECT_HANDLE_LEN: usize = 20;

const GLOBAL_TAG: u8 = 0x01;

/// Identity of one filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
	pub fsid: FsId,
	pub ino: Ino,
	/// Inode generation; distinguishes reuse of an inode number.
	pub igen: u32,
}

/// Opaque object identity. Ordering is total: global < fs < object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Handle {
	/// The reserved global handle, usable only for dispositions.
	Global,
	/// A mounted filesystem.
	Fs(FsId),
	/// A directory, file or symlink.
	Object(ObjectId),
}

/// What a registered handle names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
	Global,
	Fs,
	Dir,
	File,
	Symlink,
}

impl Handle {
	/// `dm_make_fshandle`.
	pub const fn make_fshandle(fsid: FsId) -> Self {
		Self::Fs(fsid)
	}

	/// `dm_make_handle`.
	pub const fn make_handle(fsid: FsId, ino: Ino, igen: u32) -> Self {
		Self::Object(ObjectId { fsid, ino, igen })
	}

	pub const fn is_global(&self) -> bool {
		matches!(self, Self::Global)
	}

	/// Encoded length in bytes.
	pub const fn encoded_len(&self) -> usize {
		match self {
			Self::Global => GLOBAL_HANDLE_LEN,
			Self::Fs(_) => FS_HANDLE_LEN,
			Self::Object(_) => OBJECT_HANDLE_LEN,
		}
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(self.encoded_len());
		match self {
			Self::Global => out.push(GLOBAL_TAG),
			Self::Fs(fsid) => out.extend_from_slice(&fsid.0.to_le_bytes()),
			Self::Object(obj) => {
				out.extend_from_slice(&obj.fsid.0.to_le_bytes());
				out.extend_from_slice(&obj.ino.0.to_le_bytes());
				out.extend_from_slice(&obj.igen.to_le_bytes());
			}
		}
		out
	}

	/// Decodes a handle buffer.
	///
	/// `None` models a missing handle pointer and fails
	/// [`Error::BadHandlePointer`]; a length matching no kind, or a one-byte
	/// buffer that is not the global tag, fails [`Error::BadHandleLength`].
	pub fn from_bytes(bytes: Option<&[u8]>) -> Result<Self> {
		let bytes = bytes.ok_or(Error::BadHandlePointer)?;
		match bytes.len() {
			GLOBAL_HANDLE_LEN if bytes[0] == GLOBAL_TAG => Ok(Self::Global),
			FS_HANDLE_LEN => Ok(Self::Fs(FsId(read_u64(&bytes[0..8])))),
			OBJECT_HANDLE_LEN => Ok(Self::make_handle(
				FsId(read_u64(&bytes[0..8])),
				Ino(read_u64(&bytes[8..16])),
				read_u32(&bytes[16..20]),
			)),
			len => Err(Error::BadHandleLength(len)),
		}
	}

	pub fn fsid(&self) -> Result<FsId> {
		match self {
			Self::Global => Err(Error::BadHandleKind),
			Self::Fs(fsid) => Ok(*fsid),
			Self::Object(obj) => Ok(obj.fsid),
		}
	}

	pub fn ino(&self) -> Result<Ino> {
		match self {
			Self::Object(obj) => Ok(obj.ino),
			_ => Err(Error::BadHandleKind),
		}
	}

	pub fn igen(&self) -> Result<u32> {
		match self {
			Self::Object(obj) => Ok(obj.igen),
			_ => Err(Error::BadHandleKind),
		}
	}

	/// Handle of the filesystem containing this object.
	pub fn to_fshandle(&self) -> Result<Self> {
		self.fsid().map(Self::Fs)
	}
}

impl fmt::Display for Handle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Global => f.write_str("global"),
			Self::Fs(fsid) => write!(f, "fs:{:x}", fsid.0),
			Self::Object(obj) => write!(f, "obj:{:x}/{}.{}", obj.fsid.0, obj.ino.0, obj.igen),
		}
	}
}

fn read_u64(bytes: &[u8]) -> u64 {
	let mut buf = [0u8; 8];
	buf.copy_from_slice(bytes);
	u64::from_le_bytes(buf)
}

fn read_u32(bytes: &[u8]) -> u32 {
	let mut buf = [0u8; 4];
	buf.copy_from_slice(bytes);
	u32::from_le_bytes(buf)
}
