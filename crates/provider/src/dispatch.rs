//! Event delivery, retrieval and responses.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, trace};
use xdsm_types::{Error, EventKind, EventMessage, EventPayload, Handle, MsgType, Response, Result, SessionId, Token};

use crate::provider::Provider;
use crate::queue::Verdict;
use crate::session::Session;

impl Provider {
	/// Sessions whose effective mask for `ancestry[0]` admits `kind`.
	pub(crate) fn interested(&self, kind: EventKind, ancestry: &[Handle]) -> Vec<Arc<Session>> {
		self.sessions_snapshot()
			.into_iter()
			.filter(|session| session.masks.read().effective(ancestry).contains_kind(kind))
			.collect()
	}

	/// Delivers `payload` to each target in order.
	///
	/// Synchronous kinds get a fresh token per session and wait for its
	/// answer before moving on; the first abort fails the operation. A target
	/// destroyed before the message could be queued is skipped.
	pub(crate) async fn deliver(&self, targets: &[Arc<Session>], kind: EventKind, payload: &EventPayload) -> Result<()> {
		for session in targets {
			if kind.is_synchronous() {
				self.raise_sync(session, kind, payload.clone()).await?;
			} else {
				self.raise_async(session, kind, payload.clone());
			}
		}
		Ok(())
	}

	async fn raise_sync(&self, session: &Session, kind: EventKind, payload: EventPayload) -> Result<()> {
		let token = self.next_token();
		let (tx, rx) = oneshot::channel();
		let Ok(sequence) = session.queue.push(kind, Some(token), payload, Some(tx)) else {
			return Ok(());
		};
		trace!(sid = session.id().0, token = token.0, sequence, kind = kind.as_str(), "xdsm.event.enqueue");
		match rx.await {
			Ok(Verdict::Continue) => Ok(()),
			Ok(Verdict::Abort(errno)) => {
				debug!(sid = session.id().0, token = token.0, kind = kind.as_str(), errno, "xdsm.event.aborted");
				Err(Error::Aborted(errno))
			}
			Err(_) => {
				debug!(token = token.0, kind = kind.as_str(), "xdsm.event.session_gone");
				Err(Error::InvalidSession)
			}
		}
	}

	pub(crate) fn raise_async(&self, session: &Session, kind: EventKind, payload: EventPayload) {
		if let Ok(sequence) = session.queue.push(kind, None, payload, None) {
			trace!(sid = session.id().0, sequence, kind = kind.as_str(), "xdsm.event.enqueue");
		}
	}

	/// Retrieves up to `max_msgs` messages in queue order.
	///
	/// Without `wait` an empty queue fails [`Error::WouldBlock`]. With it the
	/// call waits for the first message, or fails [`Error::InvalidSession`]
	/// once the session is destroyed or taken over under a new id. Dropping
	/// the future loses nothing.
	pub async fn get_events(&self, sid: SessionId, max_msgs: usize, wait: bool) -> Result<Vec<EventMessage>> {
		let session = self.session(sid)?;
		// Read before the id: a takeover stores the new id, then rebinds.
		let generation = session.queue.generation();
		if session.id() != sid {
			return Err(Error::InvalidSession);
		}
		let batch = session.queue.take(generation, max_msgs, wait).await?;
		trace!(sid = sid.0, count = batch.len(), "xdsm.event.deliver");
		Ok(batch)
	}

	/// Answers a delivered token. Rights acquired under it are released.
	pub fn respond_event(&self, sid: SessionId, token: Token, response: Response, reterror: i32) -> Result<()> {
		let session = self.session(sid)?;
		if !token.is_issued() {
			return Err(Error::InvalidToken);
		}
		let verdict = Verdict::from_response(response, reterror)?;
		session.queue.respond(token, verdict)?;
		let released = session.rights.release_token(token);
		debug!(sid = sid.0, token = token.0, ?verdict, released, "xdsm.event.respond");
		Ok(())
	}

	/// Issues a token with no queued message, for acquiring rights outside an event.
	pub fn create_userevent(&self, sid: SessionId, data: &[u8]) -> Result<Token> {
		let session = self.session(sid)?;
		if data.len() > self.config().max_message_data {
			return Err(Error::TooLarge);
		}
		let token = self.next_token();
		session.queue.register(token, EventPayload::User(data.to_vec()))?;
		debug!(sid = sid.0, token = token.0, "xdsm.event.userevent");
		Ok(token)
	}

	/// Queues a USER message on `target`. A synchronous message blocks until
	/// answered and fails [`Error::Aborted`] on abort.
	pub async fn send_msg(&self, target: SessionId, msgtype: MsgType, data: &[u8]) -> Result<()> {
		let session = self.session(target)?;
		if data.len() > self.config().max_message_data {
			return Err(Error::TooLarge);
		}
		let payload = EventPayload::User(data.to_vec());
		match msgtype {
			MsgType::Sync => {
				let token = self.next_token();
				let (tx, rx) = oneshot::channel();
				session.queue.push(EventKind::User, Some(token), payload, Some(tx))?;
				match rx.await {
					Ok(Verdict::Continue) => Ok(()),
					Ok(Verdict::Abort(errno)) => Err(Error::Aborted(errno)),
					Err(_) => Err(Error::InvalidSession),
				}
			}
			MsgType::Async => session.queue.push(EventKind::User, None, payload, None).map(drop),
		}
	}

	pub fn find_eventmsg(&self, sid: SessionId, token: Token) -> Result<EventMessage> {
		let session = self.session(sid)?;
		if !token.is_issued() {
			return Err(Error::InvalidToken);
		}
		session.queue.find(token)
	}

	pub fn getall_tokens(&self, sid: SessionId, nelem: usize) -> Result<Vec<Token>> {
		let tokens = self.session(sid)?.queue.tokens();
		if nelem < tokens.len() {
			return Err(Error::BufferTooSmall { required: tokens.len() });
		}
		Ok(tokens)
	}

	/// Moves an outstanding token, blocked caller included, to `target`.
	pub fn move_event(&self, src: SessionId, token: Token, target: SessionId) -> Result<Token> {
		let source = self.session(src)?;
		let destination = self.session(target)?;
		if !token.is_issued() {
			return Err(Error::InvalidToken);
		}
		if !source.queue.is_outstanding(token) {
			let elsewhere = self.sessions_snapshot().iter().any(|session| session.queue.is_outstanding(token));
			return Err(if elsewhere { Error::TokenNotInSession } else { Error::InvalidToken });
		}
		if Arc::ptr_eq(&source, &destination) {
			return Ok(token);
		}
		let entry = source.queue.detach(token)?;
		destination.queue.attach(token, entry)?;
		debug!(src = src.0, target = target.0, token = token.0, "xdsm.event.move");
		Ok(token)
	}

	/// Notes that the application is still working on `token`.
	pub fn pending(&self, sid: SessionId, token: Token, delay: Duration) -> Result<()> {
		let session = self.session(sid)?;
		if !token.is_issued() {
			return Err(Error::InvalidToken);
		}
		session.queue.mark_pending(token)?;
		debug!(sid = sid.0, token = token.0, ?delay, "xdsm.event.pending");
		Ok(())
	}

	/// Whether `token` was marked with [`Provider::pending`].
	pub fn is_pending(&self, sid: SessionId, token: Token) -> Result<bool> {
		Ok(self.session(sid)?.queue.is_pending(token))
	}

	/// Queues an asynchronous event on every interested session.
	pub(crate) fn notify(&self, kind: EventKind, ancestry: &[Handle], payload: EventPayload) {
		debug_assert!(!kind.is_synchronous(), "{} must be delivered synchronously", kind.as_str());
		for session in self.interested(kind, ancestry) {
			self.raise_async(&session, kind, payload.clone());
		}
	}
}
