//! XDSM provider: DMAPI sessions, event delivery, rights, holds and regions.
//!
//! # Architecture
//!
//! * [`Provider`]: owns the handle registry and all sessions
//! * Sessions: event queue with outstanding tokens, masks, and per-object
//!   rights, regions and holds (each object locked independently)
//! * Hooks: `mount`, `create`, `read`, ... raise events and block on the
//!   synchronous ones until every interested session answered
//! * [`spawn_consumer`]: a task per session answering events through an
//!   [`EventHandler`]
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> xdsm_types::Result<()> {
//! use std::sync::Arc;
//!
//! use xdsm_provider::Provider;
//! use xdsm_types::{EVENT_MAX, EventSet, FsId, Handle, SessionId};
//!
//! let provider = Arc::new(Provider::default());
//! let sid = provider.create_session(SessionId::NONE, "hsm")?;
//! provider.set_disposition(sid, &Handle::Global, EventSet::MOUNT, EVENT_MAX)?;
//! let mount = tokio::spawn({
//! 	let provider = Arc::clone(&provider);
//! 	async move { provider.mount(FsId(1), None, "/mnt", "/dev/vdb", 0).await }
//! });
//! let events = provider.get_events(sid, 1, true).await?;
//! # let _ = (events, mount);
//! # Ok(())
//! # }
//! ```

mod config;
mod consumer;
mod dispatch;
mod holds;
mod hooks;
mod keyed;
mod masks;
mod provider;
mod queue;
mod regions;
mod registry;
mod rights;
mod session;

pub use config::{ConfigError, ConfigKey, ProviderConfig};
pub use consumer::{ConsumerExit, ConsumerHandle, EventHandler, spawn_consumer};
pub use provider::Provider;
pub use queue::Verdict;
pub use registry::{HandleRegistry, MountState};
