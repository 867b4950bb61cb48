//! Event kinds, masks and messages.

use crate::handle::Handle;
use crate::ids::Token;

/// One past the highest event number (`DM_EVENT_MAX`).
pub const EVENT_MAX: u32 = 23;

/// A DMAPI event kind. Discriminants are the DMAPI event numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum EventKind {
	Mount = 1,
	Preunmount = 2,
	Unmount = 3,
	Create = 5,
	Close = 6,
	Postcreate = 7,
	Remove = 8,
	Postremove = 9,
	Rename = 10,
	Postrename = 11,
	Link = 12,
	Postlink = 13,
	Symlink = 14,
	Postsymlink = 15,
	Read = 16,
	Write = 17,
	Truncate = 18,
	Attribute = 19,
	Destroy = 20,
	User = 22,
}

bitflags::bitflags! {
	/// A set of event kinds; bit `n` is event number `n`.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct EventSet: u64 {
		const MOUNT = 1 << 1;
		const PREUNMOUNT = 1 << 2;
		const UNMOUNT = 1 << 3;
		const CREATE = 1 << 5;
		const CLOSE = 1 << 6;
		const POSTCREATE = 1 << 7;
		const REMOVE = 1 << 8;
		const POSTREMOVE = 1 << 9;
		const RENAME = 1 << 10;
		const POSTRENAME = 1 << 11;
		const LINK = 1 << 12;
		const POSTLINK = 1 << 13;
		const SYMLINK = 1 << 14;
		const POSTSYMLINK = 1 << 15;
		const READ = 1 << 16;
		const WRITE = 1 << 17;
		const TRUNCATE = 1 << 18;
		const ATTRIBUTE = 1 << 19;
		const DESTROY = 1 << 20;
		const USER = 1 << 22;
	}
}

impl EventKind {
	pub const ALL: [Self; 20] = [
		Self::Mount,
		Self::Preunmount,
		Self::Unmount,
		Self::Create,
		Self::Close,
		Self::Postcreate,
		Self::Remove,
		Self::Postremove,
		Self::Rename,
		Self::Postrename,
		Self::Link,
		Self::Postlink,
		Self::Symlink,
		Self::Postsymlink,
		Self::Read,
		Self::Write,
		Self::Truncate,
		Self::Attribute,
		Self::Destroy,
		Self::User,
	];

	pub const fn number(self) -> u32 {
		self as u32
	}

	pub fn from_number(number: u32) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.number() == number)
	}

	/// Whether the triggering operation blocks until a response arrives.
	///
	/// USER events are synchronous only when sent as [`MsgType::Sync`].
	pub const fn is_synchronous(self) -> bool {
		matches!(
			self,
			Self::Mount
				| Self::Preunmount
				| Self::Unmount
				| Self::Create
				| Self::Remove
				| Self::Rename
				| Self::Link
				| Self::Symlink
				| Self::Read
				| Self::Write
				| Self::Truncate
		)
	}

	/// Post-events are raised after the operation completed and never answered.
	pub const fn is_post_event(self) -> bool {
		matches!(
			self,
			Self::Postcreate | Self::Postremove | Self::Postrename | Self::Postlink | Self::Postsymlink
		)
	}

	pub const fn as_set(self) -> EventSet {
		EventSet::from_bits_retain(1 << self.number())
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Mount => "mount",
			Self::Preunmount => "preunmount",
			Self::Unmount => "unmount",
			Self::Create => "create",
			Self::Close => "close",
			Self::Postcreate => "postcreate",
			Self::Remove => "remove",
			Self::Postremove => "postremove",
			Self::Rename => "rename",
			Self::Postrename => "postrename",
			Self::Link => "link",
			Self::Postlink => "postlink",
			Self::Symlink => "symlink",
			Self::Postsymlink => "postsymlink",
			Self::Read => "read",
			Self::Write => "write",
			Self::Truncate => "truncate",
			Self::Attribute => "attribute",
			Self::Destroy => "destroy",
			Self::User => "user",
		}
	}
}

impl From<EventKind> for EventSet {
	fn from(kind: EventKind) -> Self {
		kind.as_set()
	}
}

impl FromIterator<EventKind> for EventSet {
	fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
		iter.into_iter().fold(EventSet::empty(), |set, kind| set | kind.as_set())
	}
}

impl EventSet {
	/// Every event number strictly below `max_event`.
	pub const fn below(max_event: u32) -> Self {
		if max_event >= u64::BITS {
			return Self::all();
		}
		Self::from_bits_truncate((1u64 << max_event) - 1)
	}

	pub const fn contains_kind(self, kind: EventKind) -> bool {
		self.contains(kind.as_set())
	}

	/// Number of slots needed to hold this set as an event array:
	/// highest event number + 1, or 0 when empty.
	pub const fn element_count(self) -> usize {
		(u64::BITS - self.bits().leading_zeros()) as usize
	}

	pub fn kinds(self) -> impl Iterator<Item = EventKind> {
		EventKind::ALL.into_iter().filter(move |kind| self.contains_kind(*kind))
	}
}

/// How a USER message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
	Sync,
	Async,
}

/// A data management application's answer to a synchronous event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Response {
	Invalid,
	Continue,
	Abort,
	DontCare,
}

/// A message retrieved with `get_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
	pub kind: EventKind,
	/// Present only on messages that must be answered.
	pub token: Option<Token>,
	/// Per-session delivery order, starting at 1.
	pub sequence: u64,
	pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
	Mount(MountEvent),
	Namespace(NamespaceEvent),
	Data(DataEvent),
	/// CLOSE, ATTRIBUTE and DESTROY carry only the object.
	Object(Handle),
	User(Vec<u8>),
}

/// Mount mode bit: the filesystem is mounted read-only.
pub const MOUNT_RDONLY: u32 = 0x1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEvent {
	pub mode: u32,
	pub fs: Handle,
	/// Directory the filesystem is mounted over, when it is itself managed.
	pub mountpoint: Option<Handle>,
	pub mountpoint_name: String,
	pub device_name: String,
	pub root: Handle,
}

impl MountEvent {
	/// Bytes a caller's buffer needs to receive this event: the mode, every
	/// handle, and both names with their terminators.
	pub fn encoded_len(&self) -> usize {
		let handles = self.fs.encoded_len() + self.mountpoint.as_ref().map_or(0, Handle::encoded_len) + self.root.encoded_len();
		let names = self.mountpoint_name.len() + 1 + self.device_name.len() + 1;
		size_of::<u32>() + handles + names
	}
}

/// Payload of namespace events and of PREUNMOUNT/UNMOUNT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEvent {
	pub mode: u32,
	pub handle1: Handle,
	pub handle2: Option<Handle>,
	pub name1: Option<String>,
	pub name2: Option<String>,
	/// Outcome of the completed operation; set on post-events and UNMOUNT.
	pub retcode: i32,
}

/// READ/WRITE carry the caller's request; TRUNCATE carries the new size as
/// `offset` and a zero length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataEvent {
	pub handle: Handle,
	pub offset: u64,
	pub length: u64,
}
