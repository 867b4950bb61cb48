//! Handle registry: the provider's model of mounted filesystems and their
//! namespaces.
//!
//! Only identity and structure are tracked (kind, parent, names, link count).
//! Each filesystem carries a mount state on a `watch` channel so producers can
//! wait for a pending MOUNT to be answered before raising events on it.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::watch;
use xdsm_types::{Error, FsId, Handle, HandleKind, Ino, MountEvent, Result};

/// Lifecycle of a filesystem in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
	/// MOUNT has been raised and not yet answered.
	Mounting,
	Mounted,
	Unmounting,
}

struct FsEntry {
	/// What MOUNT reported; `dm_get_mountinfo` returns it unchanged.
	mount: MountEvent,
	state: watch::Sender<MountState>,
}

#[derive(Debug, Clone, Copy)]
struct ObjectEntry {
	kind: HandleKind,
	/// Directory the object was created in; the root's parent is its filesystem.
	parent: Handle,
	nlink: u32,
}

#[derive(Default)]
struct Namespace {
	objects: FxHashMap<Handle, ObjectEntry>,
	names: FxHashMap<(Handle, String), Handle>,
}

impl Namespace {
	fn entry(&self, handle: &Handle) -> Result<&ObjectEntry> {
		self.objects.get(handle).ok_or(Error::StaleHandle)
	}

	fn dir(&self, handle: &Handle) -> Result<()> {
		match self.entry(handle)?.kind {
			HandleKind::Dir => Ok(()),
			_ => Err(Error::InvalidArgument("not a directory")),
		}
	}

	fn has_children(&self, dir: &Handle) -> bool {
		self.names.keys().any(|(parent, _)| parent == dir)
	}

	/// Lexically first name of `target` in `dir`.
	fn name_in(&self, dir: &Handle, target: &Handle) -> Option<&str> {
		self.names
			.iter()
			.filter(|((parent, _), linked)| parent == dir && *linked == target)
			.map(|((_, name), _)| name.as_str())
			.min()
	}
}

/// Outcome of unlinking a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Unlinked {
	pub(crate) handle: Handle,
	/// The last name went away and the object was destroyed.
	pub(crate) destroyed: bool,
}

pub struct HandleRegistry {
	filesystems: RwLock<FxHashMap<FsId, FsEntry>>,
	namespace: RwLock<Namespace>,
	next_ino: AtomicU64,
}

impl Default for HandleRegistry {
	fn default() -> Self {
		Self {
			filesystems: RwLock::new(FxHashMap::default()),
			namespace: RwLock::new(Namespace::default()),
			next_ino: AtomicU64::new(1),
		}
	}
}

impl HandleRegistry {
	/// Kind of a registered handle; unregistered handles are stale.
	pub fn kind(&self, handle: &Handle) -> Result<HandleKind> {
		match handle {
			Handle::Global => Ok(HandleKind::Global),
			Handle::Fs(fsid) => self.filesystems.read().get(fsid).map(|_| HandleKind::Fs).ok_or(Error::StaleHandle),
			Handle::Object(_) => self.namespace.read().entry(handle).map(|entry| entry.kind),
		}
	}

	/// `dm_handle_is_valid`.
	pub fn is_valid(&self, handle: &Handle) -> bool {
		self.kind(handle).is_ok()
	}

	pub fn lookup(&self, parent: &Handle, name: &str) -> Result<Handle> {
		let namespace = self.namespace.read();
		namespace.dir(parent)?;
		namespace.names.get(&(*parent, name.to_owned())).copied().ok_or(Error::NoEntry)
	}

	/// Finds the live object with inode `ino` on `fsid`.
	pub fn by_ino(&self, fsid: FsId, ino: Ino) -> Result<Handle> {
		let namespace = self.namespace.read();
		namespace
			.objects
			.keys()
			.find(|handle| matches!(handle, Handle::Object(obj) if obj.fsid == fsid && obj.ino == ino))
			.copied()
			.ok_or(Error::NoEntry)
	}

	pub fn parent(&self, handle: &Handle) -> Result<Handle> {
		self.namespace.read().entry(handle).map(|entry| entry.parent)
	}

	pub fn root(&self, fsid: FsId) -> Result<Handle> {
		self.filesystems.read().get(&fsid).map(|fs| fs.mount.root).ok_or(Error::StaleHandle)
	}

	/// The MOUNT event a filesystem was mounted with.
	pub fn mount_event(&self, fsid: FsId) -> Result<MountEvent> {
		self.filesystems.read().get(&fsid).map(|fs| fs.mount.clone()).ok_or(Error::StaleHandle)
	}

	/// Path of `target` through its name in `dir`, rooted at the mount point.
	///
	/// `dir` must be a directory and `target` a non-directory object, both
	/// live ([`Error::BadHandleKind`] or [`Error::StaleHandle`] otherwise).
	/// A `target` with no name in `dir` is an invalid argument.
	pub fn path(&self, dir: &Handle, target: &Handle) -> Result<String> {
		if !matches!(dir, Handle::Object(_)) || !matches!(target, Handle::Object(_)) {
			return Err(Error::BadHandleKind);
		}
		let mut path = self.mount_event(dir.fsid()?)?.mountpoint_name;

		let namespace = self.namespace.read();
		if namespace.entry(dir)?.kind != HandleKind::Dir || namespace.entry(target)?.kind == HandleKind::Dir {
			return Err(Error::BadHandleKind);
		}
		let leaf = namespace.name_in(dir, target).ok_or(Error::InvalidArgument("target is not in the directory"))?;
		let mut components = vec![leaf];
		let mut current = *dir;
		loop {
			let parent = namespace.entry(&current)?.parent;
			if !matches!(parent, Handle::Object(_)) {
				break;
			}
			components.push(namespace.name_in(&parent, &current).ok_or(Error::StaleHandle)?);
			current = parent;
		}

		path.truncate(path.trim_end_matches('/').len());
		for component in components.iter().rev() {
			path.push('/');
			path.push_str(component);
		}
		Ok(path)
	}

	pub fn mount_state(&self, fsid: FsId) -> Option<MountState> {
		self.filesystems.read().get(&fsid).map(|fs| *fs.state.borrow())
	}

	/// `handle`, its parent directories up to the root, then its filesystem.
	pub fn ancestry(&self, handle: &Handle) -> Result<Vec<Handle>> {
		match handle {
			Handle::Global => Err(Error::BadHandleKind),
			Handle::Fs(_) => {
				self.kind(handle)?;
				Ok(vec![*handle])
			}
			Handle::Object(_) => {
				let namespace = self.namespace.read();
				let mut chain = vec![*handle];
				let mut current = namespace.entry(handle)?.parent;
				while let Handle::Object(_) = current {
					chain.push(current);
					current = namespace.entry(&current)?.parent;
				}
				chain.push(current);
				Ok(chain)
			}
		}
	}

	fn alloc(&self, fsid: FsId) -> Handle {
		Handle::make_handle(fsid, Ino(self.next_ino.fetch_add(1, Ordering::Relaxed)), 0)
	}

	/// Registers a filesystem in [`MountState::Mounting`] and returns the
	/// MOUNT event describing it.
	///
	/// `covers` is the directory the filesystem is mounted over, if managed.
	pub(crate) fn add_fs(
		&self,
		fsid: FsId,
		covers: Option<Handle>,
		mountpoint: &str,
		device: &str,
		mode: u32,
	) -> Result<MountEvent> {
		let fs = Handle::make_fshandle(fsid);
		let mut filesystems = self.filesystems.write();
		if filesystems.contains_key(&fsid) {
			return Err(Error::InvalidArgument("filesystem already mounted"));
		}
		let root = self.alloc(fsid);
		self.namespace.write().objects.insert(root, ObjectEntry { kind: HandleKind::Dir, parent: fs, nlink: 1 });
		let mount = MountEvent {
			mode,
			fs,
			mountpoint: covers,
			mountpoint_name: mountpoint.to_owned(),
			device_name: device.to_owned(),
			root,
		};
		let (state, _) = watch::channel(MountState::Mounting);
		filesystems.insert(fsid, FsEntry { mount: mount.clone(), state });
		Ok(mount)
	}

	pub(crate) fn set_mount_state(&self, fsid: FsId, next: MountState) {
		if let Some(fs) = self.filesystems.read().get(&fsid) {
			fs.state.send_replace(next);
		}
	}

	/// Drops a filesystem and every object on it. Waiters on its mount state
	/// observe the filesystem as stale.
	pub(crate) fn remove_fs(&self, fsid: FsId) {
		self.filesystems.write().remove(&fsid);
		let mut guard = self.namespace.write();
		let namespace = &mut *guard;
		namespace.objects.retain(|handle, _| handle.fsid().ok() != Some(fsid));
		namespace.names.retain(|(parent, _), _| parent.fsid().ok() != Some(fsid));
	}

	/// Waits until a pending MOUNT of `fsid` has been answered.
	pub(crate) async fn wait_mounted(&self, fsid: FsId) -> Result<()> {
		let mut rx = self.filesystems.read().get(&fsid).map(|fs| fs.state.subscribe()).ok_or(Error::StaleHandle)?;
		let mounted = {
			let state = rx.wait_for(|state| *state != MountState::Mounting).await.map_err(|_| Error::StaleHandle)?;
			*state == MountState::Mounted
		};
		if mounted { Ok(()) } else { Err(Error::StaleHandle) }
	}

	/// Fails [`Error::Exists`] if `name` is taken in `parent`.
	pub(crate) fn check_free(&self, parent: &Handle, name: &str) -> Result<()> {
		let namespace = self.namespace.read();
		namespace.dir(parent)?;
		if namespace.names.contains_key(&(*parent, name.to_owned())) {
			return Err(Error::Exists);
		}
		Ok(())
	}

	pub(crate) fn insert(&self, parent: &Handle, name: &str, kind: HandleKind) -> Result<Handle> {
		if !matches!(kind, HandleKind::Dir | HandleKind::File | HandleKind::Symlink) {
			return Err(Error::InvalidArgument("only directories, files and symlinks can be created"));
		}
		let fsid = parent.fsid()?;
		let mut guard = self.namespace.write();
		let namespace = &mut *guard;
		namespace.dir(parent)?;
		let key = (*parent, name.to_owned());
		if namespace.names.contains_key(&key) {
			return Err(Error::Exists);
		}
		let handle = self.alloc(fsid);
		namespace.objects.insert(handle, ObjectEntry { kind, parent: *parent, nlink: 1 });
		namespace.names.insert(key, handle);
		Ok(handle)
	}

	pub(crate) fn link(&self, parent: &Handle, name: &str, source: &Handle) -> Result<()> {
		let mut guard = self.namespace.write();
		let namespace = &mut *guard;
		namespace.dir(parent)?;
		if namespace.entry(source)?.kind == HandleKind::Dir {
			return Err(Error::InvalidArgument("cannot link a directory"));
		}
		if parent.fsid()? != source.fsid()? {
			return Err(Error::InvalidArgument("cross-filesystem link"));
		}
		let key = (*parent, name.to_owned());
		if namespace.names.contains_key(&key) {
			return Err(Error::Exists);
		}
		namespace.names.insert(key, *source);
		if let Some(entry) = namespace.objects.get_mut(source) {
			entry.nlink += 1;
		}
		Ok(())
	}

	pub(crate) fn unlink(&self, parent: &Handle, name: &str) -> Result<Unlinked> {
		let mut guard = self.namespace.write();
		let namespace = &mut *guard;
		namespace.dir(parent)?;
		let key = (*parent, name.to_owned());
		let handle = *namespace.names.get(&key).ok_or(Error::NoEntry)?;
		let entry = *namespace.entry(&handle)?;
		if entry.kind == HandleKind::Dir && namespace.has_children(&handle) {
			return Err(Error::InvalidArgument("directory not empty"));
		}
		namespace.names.remove(&key);
		let destroyed = entry.nlink <= 1;
		if destroyed {
			namespace.objects.remove(&handle);
			return Ok(Unlinked { handle, destroyed });
		}
		let remaining = namespace.names.iter().find(|(_, linked)| **linked == handle).map(|((dir, _), _)| *dir);
		if let Some(entry) = namespace.objects.get_mut(&handle) {
			entry.nlink -= 1;
			if entry.parent == *parent {
				entry.parent = remaining.unwrap_or(entry.parent);
			}
		}
		Ok(Unlinked { handle, destroyed })
	}

	pub(crate) fn rename(&self, old_parent: &Handle, old_name: &str, new_parent: &Handle, new_name: &str) -> Result<Handle> {
		let mut guard = self.namespace.write();
		let namespace = &mut *guard;
		namespace.dir(old_parent)?;
		namespace.dir(new_parent)?;
		let old_key = (*old_parent, old_name.to_owned());
		let handle = *namespace.names.get(&old_key).ok_or(Error::NoEntry)?;
		let new_key = (*new_parent, new_name.to_owned());
		if namespace.names.contains_key(&new_key) {
			return Err(Error::Exists);
		}
		let mut cursor = *new_parent;
		while let Handle::Object(_) = cursor {
			if cursor == handle {
				return Err(Error::InvalidArgument("cannot move a directory into itself"));
			}
			cursor = namespace.entry(&cursor)?.parent;
		}
		namespace.names.remove(&old_key);
		namespace.names.insert(new_key, handle);
		if let Some(entry) = namespace.objects.get_mut(&handle) {
			if entry.parent == *old_parent {
				entry.parent = *new_parent;
			}
		}
		Ok(handle)
	}
}
