//! The provider: session lifecycle and the per-session tables.
//!
//! Event production and delivery live in `dispatch` and `hooks`; this file
//! holds the request/response surface a data management application calls
//! outside of event delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info};
use xdsm_types::{
	Error, EventKind, EventSet, FsId, Handle, HandleKind, MountEvent, Region, Result, Right, RightFlags, SessionId, Token,
};

use crate::config::{ConfigError, ConfigKey, ProviderConfig};
use crate::registry::HandleRegistry;
use crate::session::Session;

/// A DMAPI provider instance.
///
/// All methods take `&self`; wrap the provider in an [`Arc`] to share it
/// between filesystem-side producers and consumer tasks.
pub struct Provider {
	config: ProviderConfig,
	pub(crate) registry: HandleRegistry,
	sessions: RwLock<FxHashMap<SessionId, Arc<Session>>>,
	next_session: AtomicI32,
	next_token: AtomicI32,
}

impl Default for Provider {
	fn default() -> Self {
		Self::new(ProviderConfig::default())
	}
}

impl Provider {
	pub fn new(config: ProviderConfig) -> Self {
		Self {
			config,
			registry: HandleRegistry::default(),
			sessions: RwLock::new(FxHashMap::default()),
			next_session: AtomicI32::new(1),
			next_token: AtomicI32::new(1),
		}
	}

	/// Builds a provider from a TOML configuration document.
	pub fn from_toml(src: &str) -> Result<Self, ConfigError> {
		Ok(Self::new(ProviderConfig::from_toml(src)?))
	}

	pub fn config(&self) -> &ProviderConfig {
		&self.config
	}

	/// The namespace model the filesystem hooks maintain.
	pub fn registry(&self) -> &HandleRegistry {
		&self.registry
	}

	pub(crate) fn next_token(&self) -> Token {
		Token(self.next_token.fetch_add(1, Ordering::Relaxed))
	}

	pub(crate) fn session(&self, sid: SessionId) -> Result<Arc<Session>> {
		if sid.is_none() {
			return Err(Error::InvalidSession);
		}
		self.sessions.read().get(&sid).cloned().ok_or(Error::InvalidSession)
	}

	/// Live sessions in ascending id order.
	pub(crate) fn sessions_snapshot(&self) -> Vec<Arc<Session>> {
		let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
		sessions.sort_by_key(|session| session.id());
		sessions
	}

	/// Creates a session, or takes over `old` when it names a live session.
	pub fn create_session(&self, old: SessionId, info: &str) -> Result<SessionId> {
		if info.len() >= self.config.max_session_info {
			return Err(Error::TooLarge);
		}
		let sid = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
		let mut sessions = self.sessions.write();
		if old.is_none() {
			sessions.insert(sid, Arc::new(Session::new(sid, info, self.config.retired_tokens)));
			info!(sid = sid.0, info, "xdsm.session.create");
		} else {
			let session = sessions.remove(&old).ok_or(Error::InvalidSession)?;
			session.assume(sid, info);
			sessions.insert(sid, session);
			info!(sid = sid.0, old = old.0, info, "xdsm.session.assume");
		}
		Ok(sid)
	}

	/// Destroys a session with an empty queue. Callers blocked on its tokens
	/// fail [`Error::InvalidSession`].
	pub fn destroy_session(&self, sid: SessionId) -> Result<()> {
		if sid.is_none() {
			return Err(Error::InvalidSession);
		}
		let mut sessions = self.sessions.write();
		let session = sessions.get(&sid).ok_or(Error::InvalidSession)?;
		let cancelled = session.queue.close()?;
		sessions.remove(&sid);
		info!(sid = sid.0, cancelled, "xdsm.session.destroy");
		Ok(())
	}

	/// Session info string; `buflen` must fit it plus a terminator.
	pub fn query_session(&self, sid: SessionId, buflen: usize) -> Result<String> {
		let info = self.session(sid)?.info();
		if buflen < info.len() + 1 {
			return Err(Error::BufferTooSmall { required: info.len() + 1 });
		}
		Ok(info)
	}

	pub fn getall_sessions(&self, nelem: usize) -> Result<Vec<SessionId>> {
		let mut ids: Vec<_> = self.sessions.read().keys().copied().collect();
		if nelem < ids.len() {
			return Err(Error::BufferTooSmall { required: ids.len() });
		}
		ids.sort_unstable();
		Ok(ids)
	}

	/// Kind of a registered, non-global handle.
	pub(crate) fn object_kind(&self, handle: &Handle) -> Result<HandleKind> {
		if handle.is_global() {
			return Err(Error::BadHandleKind);
		}
		self.registry.kind(handle)
	}

	/// Validates that `token` is outstanding in `session`.
	fn check_token(session: &Session, token: Token) -> Result<()> {
		if !token.is_issued() || !session.queue.is_outstanding(token) {
			return Err(Error::InvalidToken);
		}
		Ok(())
	}

	/// Sets the disposition of the global handle (MOUNT only) or of a
	/// filesystem handle (anything but MOUNT). Only events numbered below
	/// `max_event` change.
	pub fn set_disposition(&self, sid: SessionId, handle: &Handle, events: EventSet, max_event: u32) -> Result<()> {
		let session = self.session(sid)?;
		match self.registry.kind(handle)? {
			HandleKind::Global | HandleKind::Fs => {}
			_ => return Err(Error::InvalidArgument("dispositions apply to the global or a filesystem handle")),
		}
		session.masks.write().set_disposition(handle, events, max_event)?;
		debug!(sid = sid.0, %handle, events = events.bits(), max_event, "xdsm.mask.disposition");
		Ok(())
	}

	/// Sets the event list of a filesystem or object.
	pub fn set_eventlist(&self, sid: SessionId, handle: &Handle, events: EventSet, max_event: u32) -> Result<()> {
		let session = self.session(sid)?;
		self.object_kind(handle)?;
		session.masks.write().set_eventlist(handle, events, max_event)?;
		debug!(sid = sid.0, %handle, events = events.bits(), max_event, "xdsm.mask.eventlist");
		Ok(())
	}

	/// Event list of an object, including the data events its regions imply.
	pub fn get_eventlist(&self, sid: SessionId, handle: &Handle, nelem: usize) -> Result<EventSet> {
		let session = self.session(sid)?;
		if self.object_kind(handle)? == HandleKind::Dir {
			return Err(Error::InvalidArgument("directories have no readable event list"));
		}
		let events = session.masks.read().eventlist(handle) | session.regions.flags(handle).events();
		if nelem < events.element_count() {
			return Err(Error::BufferTooSmall { required: events.element_count() });
		}
		Ok(events)
	}

	pub fn getall_dispositions(&self, sid: SessionId, nelem: usize) -> Result<Vec<(Handle, EventSet)>> {
		let dispositions = self.session(sid)?.masks.read().dispositions();
		if nelem < dispositions.len() {
			return Err(Error::BufferTooSmall { required: dispositions.len() });
		}
		Ok(dispositions)
	}

	/// Events the provider can generate for `handle`.
	pub fn get_config_events(&self, handle: &Handle, nelem: usize) -> Result<EventSet> {
		self.object_kind(handle)?;
		let events: EventSet = EventKind::ALL.into_iter().collect();
		if nelem < events.element_count() {
			return Err(Error::BufferTooSmall { required: events.element_count() });
		}
		Ok(events)
	}

	pub fn get_config(&self, handle: &Handle, key: ConfigKey) -> Result<u64> {
		self.object_kind(handle)?;
		Ok(self.config.value(key))
	}

	/// The MOUNT event filesystem `fs` was mounted with. `token` may be
	/// [`Token::NONE`]; any other value must be outstanding in the session.
	pub fn get_mountinfo(&self, sid: SessionId, fs: &Handle, token: Token, buflen: usize) -> Result<MountEvent> {
		let session = self.session(sid)?;
		if self.object_kind(fs)? != HandleKind::Fs {
			return Err(Error::InvalidArgument("mount info is kept per filesystem"));
		}
		if token != Token::NONE {
			Self::check_token(&session, token)?;
		}
		let mount = self.registry.mount_event(fs.fsid()?)?;
		if buflen < mount.encoded_len() {
			return Err(Error::BufferTooSmall { required: mount.encoded_len() });
		}
		Ok(mount)
	}

	/// Path of `target` through its name in `dir`; `buflen` must fit it plus
	/// a terminator.
	pub fn handle_to_path(&self, dir: &Handle, target: &Handle, buflen: usize) -> Result<String> {
		let path = self.registry.path(dir, target)?;
		if buflen < path.len() + 1 {
			return Err(Error::BufferTooSmall { required: path.len() + 1 });
		}
		Ok(path)
	}

	/// Replaces the managed regions of a regular file. Always exact.
	pub fn set_region(&self, sid: SessionId, handle: &Handle, regions: &[Region]) -> Result<bool> {
		let session = self.session(sid)?;
		if self.object_kind(handle)? != HandleKind::File {
			return Err(Error::InvalidArgument("regions apply to regular files"));
		}
		if regions.len() > self.config.max_managed_regions {
			return Err(Error::TooLarge);
		}
		session.regions.set(handle, regions);
		debug!(sid = sid.0, %handle, count = regions.len(), "xdsm.region.set");
		Ok(true)
	}

	pub fn get_region(&self, sid: SessionId, handle: &Handle, nelem: usize) -> Result<Vec<Region>> {
		let session = self.session(sid)?;
		if self.object_kind(handle)? != HandleKind::File {
			return Err(Error::InvalidArgument("regions apply to regular files"));
		}
		session.regions.get(handle, nelem)
	}

	/// Session, handle and token validation shared by rights and holds.
	fn token_scope(&self, sid: SessionId, handle: &Handle, token: Token) -> Result<Arc<Session>> {
		let session = self.session(sid)?;
		self.object_kind(handle)?;
		Self::check_token(&session, token)?;
		Ok(session)
	}

	pub fn request_right(&self, sid: SessionId, handle: &Handle, token: Token, right: Right, flags: RightFlags) -> Result<()> {
		let session = self.token_scope(sid, handle, token)?;
		let granted = session.rights.request(token, handle, right, flags)?;
		debug!(sid = sid.0, %handle, token = token.0, right = granted.as_str(), "xdsm.right.request");
		Ok(())
	}

	pub fn release_right(&self, sid: SessionId, handle: &Handle, token: Token) -> Result<()> {
		self.token_scope(sid, handle, token)?.rights.release(handle)
	}

	pub fn upgrade_right(&self, sid: SessionId, handle: &Handle, token: Token) -> Result<()> {
		self.token_scope(sid, handle, token)?.rights.upgrade(handle).map(drop)
	}

	pub fn downgrade_right(&self, sid: SessionId, handle: &Handle, token: Token) -> Result<()> {
		self.token_scope(sid, handle, token)?.rights.downgrade(handle).map(drop)
	}

	pub fn query_right(&self, sid: SessionId, handle: &Handle, token: Token) -> Result<Right> {
		Ok(self.token_scope(sid, handle, token)?.rights.query(handle))
	}

	pub fn obj_ref_hold(&self, sid: SessionId, token: Token, handle: &Handle) -> Result<()> {
		self.token_scope(sid, handle, token)?.holds.hold(token, handle)
	}

	pub fn obj_ref_rele(&self, sid: SessionId, token: Token, handle: &Handle) -> Result<()> {
		self.token_scope(sid, handle, token)?.holds.rele(token, handle)
	}

	pub fn obj_ref_query(&self, sid: SessionId, token: Token, handle: &Handle) -> Result<bool> {
		Ok(self.token_scope(sid, handle, token)?.holds.query(token, handle))
	}

	/// Drops session state that refers to `handle` after it was destroyed.
	pub(crate) fn forget_object(&self, handle: &Handle) {
		for session in self.sessions_snapshot() {
			session.forget_object(handle);
		}
	}

	pub(crate) fn forget_fs(&self, fsid: FsId) {
		for session in self.sessions_snapshot() {
			session.forget_fs(fsid);
		}
	}
}
