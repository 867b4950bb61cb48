//! Per-session consumer task.
//!
//! Retrieves events in batches and answers every tokened message with the
//! verdict of an [`EventHandler`]. The task stops when cancelled or when its
//! session is destroyed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use xdsm_types::{Error, EventMessage, SessionId};

use crate::provider::Provider;
use crate::queue::Verdict;

/// Application logic behind a consumer task.
#[async_trait]
pub trait EventHandler: Send + 'static {
	/// Handles one message. The verdict is sent back only for messages
	/// carrying a token; it is ignored otherwise.
	async fn handle(&mut self, provider: &Provider, sid: SessionId, message: &EventMessage) -> Verdict;
}

/// Why a consumer task stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerExit {
	Cancelled,
	/// The session was destroyed or taken over.
	SessionClosed,
	Failed(Error),
}

/// Handle to a running consumer task.
pub struct ConsumerHandle {
	cancel: CancellationToken,
	task: JoinHandle<ConsumerExit>,
}

impl ConsumerHandle {
	/// Requests the task to stop after the message it is handling, if any.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	pub async fn join(self) -> Result<ConsumerExit, JoinError> {
		self.task.await
	}
}

/// Spawns a consumer for `sid` on the current tokio runtime.
pub fn spawn_consumer<H: EventHandler>(provider: Arc<Provider>, sid: SessionId, handler: H) -> ConsumerHandle {
	let cancel = CancellationToken::new();
	trace!(sid = sid.0, "xdsm.consumer.spawn");
	let task = tokio::spawn(run(provider, sid, handler, cancel.clone()));
	ConsumerHandle { cancel, task }
}

async fn run<H: EventHandler>(provider: Arc<Provider>, sid: SessionId, mut handler: H, cancel: CancellationToken) -> ConsumerExit {
	let batch_size = provider.config().get_events_batch;
	let exit = 'consume: loop {
		let batch = tokio::select! {
			biased;
			_ = cancel.cancelled() => break ConsumerExit::Cancelled,
			batch = provider.get_events(sid, batch_size, true) => batch,
		};
		let messages = match batch {
			Ok(messages) => messages,
			Err(Error::InvalidSession) => break ConsumerExit::SessionClosed,
			Err(err) => break ConsumerExit::Failed(err),
		};
		for message in messages {
			let verdict = handler.handle(&provider, sid, &message).await;
			let Some(token) = message.token else { continue };
			match provider.respond_event(sid, token, verdict.response(), verdict.reterror()) {
				Ok(()) => {}
				Err(Error::InvalidSession) => break 'consume ConsumerExit::SessionClosed,
				// The handler may have answered or moved the token itself.
				Err(err) => warn!(sid = sid.0, token = token.0, %err, "xdsm.consumer.respond_failed"),
			}
		}
	};
	debug!(sid = sid.0, ?exit, "xdsm.consumer.exit");
	exit
}
