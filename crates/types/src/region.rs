//! Managed regions and the data-event filter.

use crate::event::{EventKind, EventSet};

bitflags::bitflags! {
	/// Data operations a region generates events for.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct RegionFlags: u32 {
		const READ = 0x1;
		const WRITE = 0x2;
		const TRUNCATE = 0x4;
	}
}

impl RegionFlags {
	/// `DM_REGION_NOEVENT`.
	pub const NOEVENT: Self = Self::empty();

	/// Region flag gating a data event, if `kind` is one.
	pub const fn for_event(kind: EventKind) -> Option<Self> {
		match kind {
			EventKind::Read => Some(Self::READ),
			EventKind::Write => Some(Self::WRITE),
			EventKind::Truncate => Some(Self::TRUNCATE),
			_ => None,
		}
	}

	/// Data events implied by these flags.
	pub fn events(self) -> EventSet {
		let mut set = EventSet::empty();
		set.set(EventSet::READ, self.contains(Self::READ));
		set.set(EventSet::WRITE, self.contains(Self::WRITE));
		set.set(EventSet::TRUNCATE, self.contains(Self::TRUNCATE));
		set
	}
}

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
	pub start: u64,
	pub end: u64,
}

impl ByteRange {
	/// Range touched by an access of `length` bytes at `offset`.
	pub const fn access(offset: u64, length: u64) -> Self {
		Self { start: offset, end: offset.saturating_add(length) }
	}

	/// Range affected by truncating from `old_size` to `new_size`.
	pub fn truncation(old_size: u64, new_size: u64) -> Self {
		Self { start: old_size.min(new_size), end: old_size.max(new_size) }
	}

	pub const fn is_empty(&self) -> bool {
		self.start >= self.end
	}
}

/// A managed region of a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
	pub offset: u64,
	/// Zero extends the region to end of file.
	pub size: u64,
	pub flags: RegionFlags,
}

impl Region {
	pub const fn new(offset: u64, size: u64, flags: RegionFlags) -> Self {
		Self { offset, size, flags }
	}

	/// Exclusive end, or `None` for a region running to end of file.
	pub const fn end(&self) -> Option<u64> {
		if self.size == 0 { None } else { Some(self.offset.saturating_add(self.size)) }
	}

	pub fn overlaps(&self, range: ByteRange) -> bool {
		if range.is_empty() {
			return false;
		}
		self.offset < range.end && self.end().is_none_or(|end| range.start < end)
	}
}

/// Whether an access over `range` must generate the event gated by `flag`.
///
/// True iff some region carrying `flag` overlaps `range`. NOEVENT regions
/// never match and never mask other regions.
pub fn regions_admit(regions: &[Region], flag: RegionFlags, range: ByteRange) -> bool {
	regions.iter().any(|region| region.flags.intersects(flag) && region.overlaps(range))
}
