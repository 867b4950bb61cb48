//! Per-session state.

use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::{Mutex, RwLock};
use xdsm_types::{FsId, Handle, SessionId};

use crate::holds::HoldTable;
use crate::masks::MaskRegistry;
use crate::queue::EventQueue;
use crate::regions::RegionTable;
use crate::rights::RightsTable;

/// Everything a session owns. Taking a session over keeps this value,
/// changes its id and info, and cancels retrievals made under the old id.
pub(crate) struct Session {
	id: AtomicI32,
	info: Mutex<String>,
	pub(crate) queue: EventQueue,
	pub(crate) masks: RwLock<MaskRegistry>,
	pub(crate) rights: RightsTable,
	pub(crate) regions: RegionTable,
	pub(crate) holds: HoldTable,
}

impl Session {
	pub(crate) fn new(id: SessionId, info: &str, retired_tokens: usize) -> Self {
		Self {
			id: AtomicI32::new(id.0),
			info: Mutex::new(info.to_owned()),
			queue: EventQueue::new(retired_tokens),
			masks: RwLock::new(MaskRegistry::default()),
			rights: RightsTable::default(),
			regions: RegionTable::default(),
			holds: HoldTable::default(),
		}
	}

	pub(crate) fn id(&self) -> SessionId {
		SessionId(self.id.load(Ordering::Acquire))
	}

	pub(crate) fn info(&self) -> String {
		self.info.lock().clone()
	}

	pub(crate) fn assume(&self, id: SessionId, info: &str) {
		self.id.store(id.0, Ordering::Release);
		*self.info.lock() = info.to_owned();
		self.queue.rebind();
	}

	/// Drops every per-object entry of a destroyed object.
	pub(crate) fn forget_object(&self, handle: &Handle) {
		self.masks.write().forget(handle);
		self.rights.forget(|h| h == handle);
		self.regions.forget(|h| h == handle);
		self.holds.forget(|h| h == handle);
	}

	/// Drops everything that refers to an unmounted filesystem.
	pub(crate) fn forget_fs(&self, fsid: FsId) {
		let on_fs = |h: &Handle| h.fsid().ok() == Some(fsid);
		self.masks.write().forget_fs(fsid);
		self.rights.forget(on_fs);
		self.regions.forget(on_fs);
		self.holds.forget(on_fs);
	}
}
