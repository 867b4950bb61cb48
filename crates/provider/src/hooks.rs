//! Filesystem-side producers.
//!
//! Each hook performs one namespace or data operation against the handle
//! registry and raises the events it implies: the synchronous pre-event
//! first (any abort cancels the operation), then the post-event carrying the
//! outcome. Hooks on a filesystem whose MOUNT is still unanswered wait for
//! that answer, so masks installed while handling MOUNT already apply.

use std::sync::Arc;

use tracing::{debug, info};
use xdsm_types::{
	ByteRange, DataEvent, Error, EventKind, EventPayload, FsId, Handle, HandleKind, NamespaceEvent, RegionFlags,
	Result,
};

use crate::provider::Provider;
use crate::registry::MountState;
use crate::session::Session;

fn namespace(mode: u32, handle1: Handle, handle2: Option<Handle>, name1: Option<&str>, name2: Option<&str>) -> NamespaceEvent {
	NamespaceEvent {
		mode,
		handle1,
		handle2,
		name1: name1.map(str::to_owned),
		name2: name2.map(str::to_owned),
		retcode: 0,
	}
}

fn retcode<T>(result: &Result<T>) -> i32 {
	result.as_ref().map_or_else(Error::errno, |_| 0)
}

impl Provider {
	/// Mounts filesystem `fsid` and raises MOUNT. The filesystem stays in
	/// [`MountState::Mounting`] until every interested session continued;
	/// an abort unregisters it again.
	///
	/// `covers` is the managed directory the filesystem is mounted over, if any.
	pub async fn mount(&self, fsid: FsId, covers: Option<&Handle>, mountpoint: &str, device: &str, mode: u32) -> Result<(Handle, Handle)> {
		if let Some(dir) = covers {
			if self.object_kind(dir)? != HandleKind::Dir {
				return Err(Error::InvalidArgument("mount point is not a directory"));
			}
		}
		let mount = self.registry.add_fs(fsid, covers.copied(), mountpoint, device, mode)?;
		let (fs, root) = (mount.fs, mount.root);
		let payload = EventPayload::Mount(mount);
		let targets = self.interested(EventKind::Mount, &[fs]);
		if let Err(err) = self.deliver(&targets, EventKind::Mount, &payload).await {
			self.registry.remove_fs(fsid);
			self.forget_fs(fsid);
			debug!(fsid = fsid.0, %err, "xdsm.fs.mount_refused");
			return Err(err);
		}
		self.registry.set_mount_state(fsid, MountState::Mounted);
		info!(fsid = fsid.0, mountpoint, device, "xdsm.fs.mounted");
		Ok((fs, root))
	}

	fn mounted_fs(&self, fs: &Handle) -> Result<FsId> {
		if self.object_kind(fs)? != HandleKind::Fs {
			return Err(Error::InvalidArgument("not a filesystem handle"));
		}
		let fsid = fs.fsid()?;
		match self.registry.mount_state(fsid) {
			Some(MountState::Mounted) => Ok(fsid),
			_ => Err(Error::StaleHandle),
		}
	}

	/// Raises PREUNMOUNT; an abort vetoes the unmount.
	pub async fn preunmount(&self, fs: &Handle, mode: u32) -> Result<()> {
		let fsid = self.mounted_fs(fs)?;
		let root = self.registry.root(fsid)?;
		let payload = EventPayload::Namespace(namespace(mode, *fs, Some(root), None, None));
		let targets = self.interested(EventKind::Preunmount, &[*fs]);
		self.deliver(&targets, EventKind::Preunmount, &payload).await
	}

	/// Unmounts: PREUNMOUNT, then UNMOUNT, then the filesystem and every
	/// session's state for it are dropped. An abort of either event leaves
	/// the filesystem mounted.
	pub async fn unmount(&self, fs: &Handle, mode: u32) -> Result<()> {
		self.preunmount(fs, mode).await?;
		let fsid = self.mounted_fs(fs)?;
		self.registry.set_mount_state(fsid, MountState::Unmounting);

		let payload = EventPayload::Namespace(namespace(mode, *fs, None, None, None));
		let targets = self.interested(EventKind::Unmount, &[*fs]);
		if let Err(err) = self.deliver(&targets, EventKind::Unmount, &payload).await {
			self.registry.set_mount_state(fsid, MountState::Mounted);
			return Err(err);
		}
		self.registry.remove_fs(fsid);
		self.forget_fs(fsid);
		info!(fsid = fsid.0, "xdsm.fs.unmounted");
		Ok(())
	}

	/// Waits out a pending MOUNT and returns the ancestry of `dir`.
	async fn enter_dir(&self, dir: &Handle) -> Result<Vec<Handle>> {
		if self.object_kind(dir)? != HandleKind::Dir {
			return Err(Error::InvalidArgument("not a directory"));
		}
		self.registry.wait_mounted(dir.fsid()?).await?;
		self.registry.ancestry(dir)
	}

	/// Creates a directory or regular file (CREATE, POSTCREATE).
	pub async fn create(&self, parent: &Handle, name: &str, kind: HandleKind, mode: u32) -> Result<Handle> {
		if !matches!(kind, HandleKind::Dir | HandleKind::File) {
			return Err(Error::InvalidArgument("create makes directories and files"));
		}
		let ancestry = self.enter_dir(parent).await?;
		self.registry.check_free(parent, name)?;

		let pre = EventPayload::Namespace(namespace(mode, *parent, None, Some(name), None));
		self.deliver(&self.interested(EventKind::Create, &ancestry), EventKind::Create, &pre).await?;

		let created = self.registry.insert(parent, name, kind);
		let mut post = namespace(mode, *parent, created.as_ref().ok().copied(), Some(name), None);
		post.retcode = retcode(&created);
		self.notify(EventKind::Postcreate, &ancestry, EventPayload::Namespace(post));
		created
	}

	/// Creates a symlink `name` pointing at `target` (SYMLINK, POSTSYMLINK).
	pub async fn symlink(&self, parent: &Handle, name: &str, target: &str) -> Result<Handle> {
		let ancestry = self.enter_dir(parent).await?;
		self.registry.check_free(parent, name)?;

		let pre = EventPayload::Namespace(namespace(0, *parent, None, Some(name), Some(target)));
		self.deliver(&self.interested(EventKind::Symlink, &ancestry), EventKind::Symlink, &pre).await?;

		let created = self.registry.insert(parent, name, HandleKind::Symlink);
		let mut post = namespace(0, *parent, created.as_ref().ok().copied(), Some(name), Some(target));
		post.retcode = retcode(&created);
		self.notify(EventKind::Postsymlink, &ancestry, EventPayload::Namespace(post));
		created
	}

	/// Adds hard link `name` in `parent` to `source` (LINK, POSTLINK).
	pub async fn link(&self, parent: &Handle, name: &str, source: &Handle) -> Result<()> {
		let ancestry = self.enter_dir(parent).await?;
		self.object_kind(source)?;
		self.registry.check_free(parent, name)?;

		let pre = EventPayload::Namespace(namespace(0, *parent, Some(*source), Some(name), None));
		self.deliver(&self.interested(EventKind::Link, &ancestry), EventKind::Link, &pre).await?;

		let linked = self.registry.link(parent, name, source);
		let mut post = namespace(0, *parent, Some(*source), Some(name), None);
		post.retcode = retcode(&linked);
		self.notify(EventKind::Postlink, &ancestry, EventPayload::Namespace(post));
		linked
	}

	/// Removes `name` from `parent` (REMOVE, POSTREMOVE). Removing the last
	/// link also raises DESTROY for the object and drops all session state
	/// referring to it.
	pub async fn remove(&self, parent: &Handle, name: &str, mode: u32) -> Result<()> {
		let ancestry = self.enter_dir(parent).await?;
		let object = self.registry.lookup(parent, name)?;
		let object_ancestry = self.registry.ancestry(&object)?;

		let pre = EventPayload::Namespace(namespace(mode, *parent, Some(object), Some(name), None));
		self.deliver(&self.interested(EventKind::Remove, &ancestry), EventKind::Remove, &pre).await?;

		let removed = self.registry.unlink(parent, name);
		let mut post = namespace(mode, *parent, Some(object), Some(name), None);
		post.retcode = retcode(&removed);
		self.notify(EventKind::Postremove, &ancestry, EventPayload::Namespace(post));

		if removed?.destroyed {
			self.destroy(&object, &object_ancestry);
		}
		Ok(())
	}

	/// Raises DESTROY using the ancestry the object had while it existed.
	fn destroy(&self, object: &Handle, ancestry: &[Handle]) {
		self.notify(EventKind::Destroy, ancestry, EventPayload::Object(*object));
		self.forget_object(object);
		debug!(%object, "xdsm.object.destroyed");
	}

	/// Renames `old_name` in `old_parent` to `new_name` in `new_parent`
	/// (RENAME, POSTRENAME). Sessions interested in either directory are told.
	pub async fn rename(&self, old_parent: &Handle, old_name: &str, new_parent: &Handle, new_name: &str) -> Result<()> {
		let old_ancestry = self.enter_dir(old_parent).await?;
		let new_ancestry = self.enter_dir(new_parent).await?;
		self.registry.lookup(old_parent, old_name)?;
		self.registry.check_free(new_parent, new_name)?;

		let payload = namespace(0, *old_parent, Some(*new_parent), Some(old_name), Some(new_name));
		let targets = self.rename_targets(EventKind::Rename, &old_ancestry, &new_ancestry);
		self.deliver(&targets, EventKind::Rename, &EventPayload::Namespace(payload.clone())).await?;

		let renamed = self.registry.rename(old_parent, old_name, new_parent, new_name);
		let post = NamespaceEvent { retcode: retcode(&renamed), ..payload };
		for session in self.rename_targets(EventKind::Postrename, &old_ancestry, &new_ancestry) {
			self.raise_async(&session, EventKind::Postrename, EventPayload::Namespace(post.clone()));
		}
		renamed.map(drop)
	}

	fn rename_targets(&self, kind: EventKind, old: &[Handle], new: &[Handle]) -> Vec<Arc<Session>> {
		self.sessions_snapshot()
			.into_iter()
			.filter(|session| {
				let masks = session.masks.read();
				masks.effective(old).contains_kind(kind) || masks.effective(new).contains_kind(kind)
			})
			.collect()
	}

	/// Reads `length` bytes at `offset` (READ).
	pub async fn read(&self, file: &Handle, offset: u64, length: u64) -> Result<()> {
		self.data_event(EventKind::Read, file, DataEvent { handle: *file, offset, length }, ByteRange::access(offset, length))
			.await
	}

	/// Writes `length` bytes at `offset` (WRITE).
	pub async fn write(&self, file: &Handle, offset: u64, length: u64) -> Result<()> {
		self.data_event(EventKind::Write, file, DataEvent { handle: *file, offset, length }, ByteRange::access(offset, length))
			.await
	}

	/// Truncates from `old_size` to `new_size` (TRUNCATE). The event carries
	/// the new size as its offset.
	pub async fn truncate(&self, file: &Handle, old_size: u64, new_size: u64) -> Result<()> {
		let event = DataEvent { handle: *file, offset: new_size, length: 0 };
		self.data_event(EventKind::Truncate, file, event, ByteRange::truncation(old_size, new_size)).await
	}

	/// Data events reach a session when one of its regions on the file
	/// matches the affected range and its mask, widened by the events its
	/// regions imply, enables the kind.
	async fn data_event(&self, kind: EventKind, file: &Handle, event: DataEvent, range: ByteRange) -> Result<()> {
		if self.object_kind(file)? != HandleKind::File {
			return Err(Error::InvalidArgument("data operations need a regular file"));
		}
		self.registry.wait_mounted(file.fsid()?).await?;
		let ancestry = self.registry.ancestry(file)?;
		let Some(flag) = RegionFlags::for_event(kind) else {
			return Err(Error::InvalidArgument("not a data event"));
		};
		let targets: Vec<_> = self
			.sessions_snapshot()
			.into_iter()
			.filter(|session| {
				let mask = session.masks.read().effective(&ancestry) | session.regions.flags(file).events();
				mask.contains_kind(kind) && session.regions.admits(file, flag, range)
			})
			.collect();
		self.deliver(&targets, kind, &EventPayload::Data(event)).await
	}

	/// Last close of an object (CLOSE).
	pub async fn close(&self, object: &Handle) -> Result<()> {
		self.object_event(EventKind::Close, object).await
	}

	/// Attribute change of an object (ATTRIBUTE).
	pub async fn attribute_changed(&self, object: &Handle) -> Result<()> {
		self.object_event(EventKind::Attribute, object).await
	}

	async fn object_event(&self, kind: EventKind, object: &Handle) -> Result<()> {
		self.object_kind(object)?;
		self.registry.wait_mounted(object.fsid()?).await?;
		let ancestry = self.registry.ancestry(object)?;
		self.notify(kind, &ancestry, EventPayload::Object(*object));
		Ok(())
	}
}
