//! Access rights.

/// Rights a session may hold on one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Right {
	#[default]
	Null,
	Shared,
	Excl,
}

impl Right {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Shared => "shared",
			Self::Excl => "excl",
		}
	}
}

bitflags::bitflags! {
	/// Flags accepted by `request_right`.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct RightFlags: u32 {
		/// `DM_RR_WAIT`: block until the right can be granted.
		const WAIT = 0x1;
	}
}
