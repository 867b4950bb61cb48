//! Shared vocabulary of the XDSM data management provider.
//!
//! * [`Handle`]: opaque, totally ordered object identity with a fixed byte encoding
//! * [`EventKind`] / [`EventSet`]: DMAPI event numbering and event masks
//! * [`Region`] / [`RegionFlags`]: byte ranges gating data events
//! * [`Right`], [`Response`], [`MsgType`]: protocol enums
//! * [`Error`]: errno-mapped failure taxonomy
//!
//! Nothing here holds state; the provider crate owns sessions and tables.

pub mod error;
pub mod event;
pub mod handle;
pub mod ids;
pub mod region;
pub mod right;

pub use error::{Error, Result};
pub use event::{
	DataEvent, EVENT_MAX, EventKind, EventMessage, EventPayload, EventSet, MOUNT_RDONLY, MountEvent, MsgType, NamespaceEvent,
	Response,
};
pub use handle::{FS_HANDLE_LEN, GLOBAL_HANDLE_LEN, Handle, HandleKind, OBJECT_HANDLE_LEN, ObjectId};
pub use ids::{FsId, Ino, SessionId, Token};
pub use region::{ByteRange, Region, RegionFlags, regions_admit};
pub use right::{Right, RightFlags};
