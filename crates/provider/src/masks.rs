//! Dispositions and event lists of one session.

use rustc_hash::FxHashMap;
use xdsm_types::{EVENT_MAX, Error, EventSet, FsId, Handle, Result};

/// Replaces the events numbered below `max_event` and keeps the rest.
pub(crate) fn merge_below(current: EventSet, events: EventSet, max_event: u32) -> Result<EventSet> {
	if max_event > EVENT_MAX {
		return Err(Error::InvalidArgument("max_event out of range"));
	}
	let low = EventSet::below(max_event);
	Ok(current.difference(low) | events.intersection(low))
}

#[derive(Debug, Default)]
pub(crate) struct MaskRegistry {
	global: EventSet,
	filesystems: FxHashMap<FsId, EventSet>,
	eventlists: FxHashMap<Handle, EventSet>,
}

impl MaskRegistry {
	/// Sets the disposition of the global handle or a filesystem handle.
	/// Callers have already rejected other handle kinds.
	pub(crate) fn set_disposition(&mut self, handle: &Handle, events: EventSet, max_event: u32) -> Result<()> {
		match handle {
			Handle::Global => {
				if !EventSet::MOUNT.contains(events.intersection(EventSet::below(max_event))) {
					return Err(Error::InvalidArgument("only MOUNT may be disposed on the global handle"));
				}
				self.global = merge_below(self.global, events, max_event)?;
			}
			Handle::Fs(fsid) => {
				if events.intersection(EventSet::below(max_event)).contains(EventSet::MOUNT) {
					return Err(Error::InvalidArgument("MOUNT may only be disposed on the global handle"));
				}
				let slot = self.filesystems.entry(*fsid).or_default();
				*slot = merge_below(*slot, events, max_event)?;
			}
			Handle::Object(_) => return Err(Error::InvalidArgument("dispositions apply to filesystems")),
		}
		Ok(())
	}

	pub(crate) fn set_eventlist(&mut self, handle: &Handle, events: EventSet, max_event: u32) -> Result<()> {
		let slot = self.eventlists.entry(*handle).or_default();
		*slot = merge_below(*slot, events, max_event)?;
		Ok(())
	}

	pub(crate) fn eventlist(&self, handle: &Handle) -> EventSet {
		self.eventlists.get(handle).copied().unwrap_or_default()
	}

	pub(crate) fn global(&self) -> EventSet {
		self.global
	}

	/// Effective mask for the first handle of `ancestry` (object, parent
	/// directories, then filesystem). The nearest event list wins; without one
	/// the filesystem disposition applies, together with the global one.
	pub(crate) fn effective(&self, ancestry: &[Handle]) -> EventSet {
		if let Some(list) = ancestry.iter().find_map(|handle| self.eventlists.get(handle)) {
			return *list;
		}
		let fs = ancestry
			.last()
			.and_then(|handle| handle.fsid().ok())
			.and_then(|fsid| self.filesystems.get(&fsid).copied())
			.unwrap_or_default();
		fs | self.global
	}

	/// Non-empty dispositions: global first, then by fsid.
	pub(crate) fn dispositions(&self) -> Vec<(Handle, EventSet)> {
		let mut out = Vec::with_capacity(self.filesystems.len() + 1);
		if !self.global.is_empty() {
			out.push((Handle::Global, self.global));
		}
		let mut filesystems: Vec<_> = self.filesystems.iter().filter(|(_, set)| !set.is_empty()).collect();
		filesystems.sort_by_key(|(fsid, _)| **fsid);
		out.extend(filesystems.into_iter().map(|(fsid, set)| (Handle::Fs(*fsid), *set)));
		out
	}

	pub(crate) fn forget_fs(&mut self, fsid: FsId) {
		self.filesystems.remove(&fsid);
		self.eventlists.retain(|handle, _| handle.fsid().ok() != Some(fsid));
	}

	pub(crate) fn forget(&mut self, handle: &Handle) {
		self.eventlists.remove(handle);
	}
}
