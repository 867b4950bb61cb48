//! Per (session, file) managed regions.

use xdsm_types::{ByteRange, Error, Handle, Region, RegionFlags, Result, regions_admit};

use crate::keyed::KeyedCells;

#[derive(Default)]
pub(crate) struct RegionTable {
	cells: KeyedCells<Handle, Vec<Region>>,
}

impl RegionTable {
	/// Replaces the region list of `handle` wholesale.
	pub(crate) fn set(&self, handle: &Handle, regions: &[Region]) {
		self.cells.with(handle, |current| {
			current.clear();
			current.extend_from_slice(regions);
		});
	}

	/// Current regions; fails [`Error::BufferTooSmall`] with the true count
	/// when `nelem` cannot hold them.
	pub(crate) fn get(&self, handle: &Handle, nelem: usize) -> Result<Vec<Region>> {
		let regions = self.cells.peek(handle, |current| current.cloned().unwrap_or_default());
		if nelem < regions.len() {
			return Err(Error::BufferTooSmall { required: regions.len() });
		}
		Ok(regions)
	}

	/// Union of the flags of every region of `handle`.
	pub(crate) fn flags(&self, handle: &Handle) -> RegionFlags {
		self.cells
			.peek(handle, |current| current.map(|regions| regions.iter().fold(RegionFlags::NOEVENT, |acc, r| acc | r.flags)))
			.unwrap_or_default()
	}

	pub(crate) fn admits(&self, handle: &Handle, flag: RegionFlags, range: ByteRange) -> bool {
		self.cells.peek(handle, |current| current.is_some_and(|regions| regions_admit(regions, flag, range)))
	}

	pub(crate) fn forget(&self, pred: impl FnMut(&Handle) -> bool) {
		self.cells.forget(pred);
	}
}
