//! Per-session event queue and outstanding-token table.
//!
//! Messages and the tokens they carry share one lock so a message is never
//! observable as delivered without its token being answerable. Retrieval
//! never holds the lock across an await: a dropped `take` future loses no
//! message.

use std::collections::VecDeque;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::{Notify, oneshot};
use xdsm_types::{Error, EventKind, EventMessage, EventPayload, Response, Result, Token};

/// Final answer to a synchronous event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
	Continue,
	/// Fail the triggering operation with this errno.
	Abort(i32),
}

impl Verdict {
	/// Validates a `respond_event` argument pair.
	pub fn from_response(response: Response, reterror: i32) -> Result<Self> {
		match response {
			Response::Continue if reterror == 0 => Ok(Self::Continue),
			Response::Continue => Err(Error::InvalidArgument("CONTINUE takes no error code")),
			Response::Abort if reterror != 0 => Ok(Self::Abort(reterror)),
			Response::Abort => Err(Error::InvalidArgument("ABORT needs an error code")),
			Response::Invalid | Response::DontCare => Err(Error::InvalidArgument("not a valid response")),
		}
	}

	pub const fn response(self) -> Response {
		match self {
			Self::Continue => Response::Continue,
			Self::Abort(_) => Response::Abort,
		}
	}

	pub const fn reterror(self) -> i32 {
		match self {
			Self::Continue => 0,
			Self::Abort(errno) => errno,
		}
	}
}

/// A token awaiting its response.
pub(crate) struct Outstanding {
	message: EventMessage,
	/// Blocked caller, absent for user-event tokens and async USER messages.
	reply: Option<oneshot::Sender<Verdict>>,
	delivered: bool,
	pending: bool,
}

/// The last `capacity` answered tokens, oldest first.
struct Retired {
	order: VecDeque<Token>,
	set: FxHashSet<Token>,
	capacity: usize,
}

impl Retired {
	fn new(capacity: usize) -> Self {
		Self { order: VecDeque::new(), set: FxHashSet::default(), capacity }
	}

	fn contains(&self, token: &Token) -> bool {
		self.set.contains(token)
	}

	fn insert(&mut self, token: Token) {
		if !self.set.insert(token) {
			return;
		}
		self.order.push_back(token);
		while self.order.len() > self.capacity {
			if let Some(evicted) = self.order.pop_front() {
				self.set.remove(&evicted);
			}
		}
	}
}

struct QueueState {
	messages: VecDeque<EventMessage>,
	outstanding: FxHashMap<Token, Outstanding>,
	retired: Retired,
	next_sequence: u64,
	/// Bumped each time the session is taken over under a new id.
	generation: u64,
	closed: bool,
}

pub(crate) struct EventQueue {
	state: Mutex<QueueState>,
	ready: Notify,
}

impl EventQueue {
	/// An empty queue remembering up to `retired_tokens` answered tokens.
	pub(crate) fn new(retired_tokens: usize) -> Self {
		Self {
			state: Mutex::new(QueueState {
				messages: VecDeque::new(),
				outstanding: FxHashMap::default(),
				retired: Retired::new(retired_tokens),
				next_sequence: 1,
				generation: 0,
				closed: false,
			}),
			ready: Notify::new(),
		}
	}

	/// Appends a message. When `token` is set the message stays answerable
	/// until responded to, and `reply` receives the verdict.
	pub(crate) fn push(
		&self,
		kind: EventKind,
		token: Option<Token>,
		payload: EventPayload,
		reply: Option<oneshot::Sender<Verdict>>,
	) -> Result<u64> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(Error::InvalidSession);
		}
		let sequence = state.next_sequence;
		state.next_sequence += 1;
		let message = EventMessage { kind, token, sequence, payload };
		if let Some(token) = token {
			state
				.outstanding
				.insert(token, Outstanding { message: message.clone(), reply, delivered: false, pending: false });
		}
		state.messages.push_back(message);
		drop(state);
		self.ready.notify_one();
		Ok(sequence)
	}

	/// Registers a token that has no queued message (`dm_create_userevent`).
	pub(crate) fn register(&self, token: Token, payload: EventPayload) -> Result<()> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(Error::InvalidSession);
		}
		let message = EventMessage { kind: EventKind::User, token: Some(token), sequence: 0, payload };
		state.outstanding.insert(token, Outstanding { message, reply: None, delivered: true, pending: false });
		Ok(())
	}

	/// Removes up to `max` messages without waiting. With `generation` set,
	/// fails [`Error::InvalidSession`] once the queue was rebound past it.
	fn try_take(&self, generation: Option<u64>, max: usize) -> Result<Vec<EventMessage>> {
		if max == 0 {
			return Err(Error::BufferTooSmall { required: 1 });
		}
		let mut state = self.state.lock();
		if state.closed || generation.is_some_and(|generation| generation != state.generation) {
			return Err(Error::InvalidSession);
		}
		if state.messages.is_empty() {
			return Err(Error::WouldBlock);
		}
		let count = max.min(state.messages.len());
		let batch: Vec<_> = state.messages.drain(..count).collect();
		for message in &batch {
			if let Some(entry) = message.token.and_then(|token| state.outstanding.get_mut(&token)) {
				entry.delivered = true;
			}
		}
		Ok(batch)
	}

	/// Current takeover generation; pass it to [`EventQueue::take`].
	pub(crate) fn generation(&self) -> u64 {
		self.state.lock().generation
	}

	/// Removes up to `max` messages, waiting for the first one if `wait` is
	/// set. Fails [`Error::InvalidSession`] once the queue has been rebound
	/// past `generation`.
	pub(crate) async fn take(&self, generation: u64, max: usize, wait: bool) -> Result<Vec<EventMessage>> {
		loop {
			let notified = self.ready.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			match self.try_take(Some(generation), max) {
				Err(Error::WouldBlock) if wait => {}
				result => return result,
			}
			notified.await;
		}
	}

	/// Starts a new generation: retrievals begun under the previous one fail
	/// [`Error::InvalidSession`], waiting ones included.
	pub(crate) fn rebind(&self) {
		self.state.lock().generation += 1;
		self.ready.notify_waiters();
	}

	/// Completes `token` with `verdict`, waking its blocked caller.
	pub(crate) fn respond(&self, token: Token, verdict: Verdict) -> Result<()> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(Error::InvalidSession);
		}
		if state.retired.contains(&token) {
			return Err(Error::TokenRetired);
		}
		if !state.outstanding.get(&token).is_some_and(|entry| entry.delivered) {
			return Err(Error::InvalidToken);
		}
		let entry = state.outstanding.remove(&token);
		state.retired.insert(token);
		drop(state);
		if let Some(reply) = entry.and_then(|entry| entry.reply) {
			// The caller may have been cancelled; its verdict is moot then.
			let _ = reply.send(verdict);
		}
		Ok(())
	}

	/// Whether `token` is delivered and unanswered here.
	pub(crate) fn is_outstanding(&self, token: Token) -> bool {
		self.state.lock().outstanding.get(&token).is_some_and(|entry| entry.delivered)
	}

	pub(crate) fn find(&self, token: Token) -> Result<EventMessage> {
		let state = self.state.lock();
		match state.outstanding.get(&token) {
			Some(entry) if entry.delivered => Ok(entry.message.clone()),
			_ => Err(Error::InvalidToken),
		}
	}

	/// Delivered, unanswered tokens in ascending order.
	pub(crate) fn tokens(&self) -> Vec<Token> {
		let state = self.state.lock();
		let mut tokens: Vec<_> = state.outstanding.iter().filter(|(_, entry)| entry.delivered).map(|(token, _)| *token).collect();
		tokens.sort_unstable();
		tokens
	}

	pub(crate) fn mark_pending(&self, token: Token) -> Result<()> {
		let mut state = self.state.lock();
		match state.outstanding.get_mut(&token) {
			Some(entry) if entry.delivered => {
				entry.pending = true;
				Ok(())
			}
			_ => Err(Error::InvalidToken),
		}
	}

	pub(crate) fn is_pending(&self, token: Token) -> bool {
		self.state.lock().outstanding.get(&token).is_some_and(|entry| entry.pending)
	}

	/// Takes a delivered token out of this queue, blocked caller included.
	pub(crate) fn detach(&self, token: Token) -> Result<Outstanding> {
		let mut state = self.state.lock();
		if !state.outstanding.get(&token).is_some_and(|entry| entry.delivered) {
			return Err(Error::InvalidToken);
		}
		state.outstanding.remove(&token).ok_or(Error::InvalidToken)
	}

	/// Adopts a token detached from another session.
	pub(crate) fn attach(&self, token: Token, entry: Outstanding) -> Result<()> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(Error::InvalidSession);
		}
		state.outstanding.insert(token, entry);
		Ok(())
	}

	/// Closes the queue. Fails [`Error::SessionBusy`] while messages are
	/// undelivered. Callers blocked on outstanding tokens observe their reply
	/// channel closing; waiting consumers are woken.
	pub(crate) fn close(&self) -> Result<usize> {
		let mut state = self.state.lock();
		if !state.messages.is_empty() {
			return Err(Error::SessionBusy);
		}
		state.closed = true;
		let cancelled = state.outstanding.len();
		state.outstanding.clear();
		drop(state);
		self.ready.notify_waiters();
		Ok(cancelled)
	}
}
