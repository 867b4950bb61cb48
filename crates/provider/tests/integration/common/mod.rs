#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use xdsm_provider::Provider;
use xdsm_types::{Error, EventMessage, FsId, Handle, HandleKind, Response, Result, SessionId};

pub const FS: FsId = FsId(0x5eed);

/// A provider with one session and one mounted filesystem nobody watches.
pub struct Fixture {
	pub provider: Arc<Provider>,
	pub sid: SessionId,
	pub fs: Handle,
	pub root: Handle,
}

impl Fixture {
	pub async fn new() -> Self {
		let _ = tracing_subscriber::fmt::try_init();
		let provider = Arc::new(Provider::default());
		let sid = provider.create_session(SessionId::NONE, "test-dma").unwrap();
		let (fs, root) = provider.mount(FS, None, "/mnt/dmapi", "/dev/vdb", 0).await.unwrap();
		Self { provider, sid, fs, root }
	}

	/// Creates a regular file in the root directory.
	pub async fn file(&self, name: &str) -> Handle {
		self.provider.create(&self.root, name, HandleKind::File, 0o644).await.unwrap()
	}

	/// Runs a provider call on its own task so the test can act as the application.
	pub fn spawn<F, Fut, T>(&self, f: F) -> tokio::task::JoinHandle<T>
	where
		F: FnOnce(Arc<Provider>) -> Fut,
		Fut: Future<Output = T> + Send + 'static,
		T: Send + 'static,
	{
		tokio::spawn(f(Arc::clone(&self.provider)))
	}

	/// Waits for exactly one message on `sid`.
	pub async fn next(&self, sid: SessionId) -> EventMessage {
		let mut batch = tokio::time::timeout(Duration::from_secs(5), self.provider.get_events(sid, 1, true))
			.await
			.expect("no event within 5s")
			.unwrap();
		assert_eq!(batch.len(), 1);
		batch.remove(0)
	}

	pub fn answer(&self, sid: SessionId, message: &EventMessage, response: Response, reterror: i32) -> Result<()> {
		self.provider.respond_event(sid, message.token.expect("message carries no token"), response, reterror)
	}

	pub async fn assert_idle(&self, sid: SessionId) {
		assert_eq!(self.provider.get_events(sid, 1, false).await, Err(Error::WouldBlock));
	}
}
