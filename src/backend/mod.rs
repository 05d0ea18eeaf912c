//! Backend Module
//!
//! Storage targets behind one capability interface.
//!
//! ## Responsibilities
//! - Open a short-lived handle per operation
//! - Existence, size, ranged reads, writes, deletes on backend keys
//! - Atomic visibility: a writer's bytes appear only after `commit`
//!
//! ## Handle Lifecycle
//! ```text
//!   Backend::open ──► BackendHandle ──► exists / stat_size / new_reader
//!                          │                     new_writer ──► commit | abort
//!                          ▼
//!                   close (or drop)
//! ```
//!
//! Handles are never cached; every store operation opens its own and releases
//! it on every exit path. Readers returned from a handle own their resources
//! and stay valid after the handle is closed.

mod local;
mod memory;
mod remote;

use std::io::{Read, Write};
use std::sync::Arc;

use crate::config::{Config, StorageTarget};
use crate::error::Result;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use remote::RemoteBackend;

/// Owned byte stream returned by reads
pub type ObjectReader = Box<dyn Read + Send>;

/// A storage target
pub trait Backend: Send + Sync {
    /// Acquire a scoped handle
    ///
    /// Fails with `BackendUnavailable` if the target cannot be reached or
    /// created.
    fn open(&self) -> Result<Box<dyn BackendHandle>>;

    /// Human-readable target, for logs
    fn describe(&self) -> String;
}

/// A scoped session against a backend
pub trait BackendHandle: Send {
    /// `Ok(false)` for absent keys; errors only on transport/permission failures
    fn exists(&self, key: &str) -> Result<bool>;

    /// Stored byte length; `ObjectNotFound` if absent
    fn stat_size(&self, key: &str) -> Result<u64>;

    /// Stream from `offset` to the end of the object
    ///
    /// `ObjectNotFound` if absent, `RangeError` if `offset` is past the end.
    fn new_reader(&self, key: &str, offset: u64) -> Result<ObjectReader>;

    /// Sink whose bytes become visible only on `commit`
    fn new_writer(&self, key: &str) -> Result<Box<dyn ObjectWriter>>;

    /// Idempotent delete
    fn delete(&self, key: &str) -> Result<()>;

    /// Release the handle. Dropping it has the same effect.
    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Pending object write
///
/// Dropping a writer without calling `commit` discards it.
pub trait ObjectWriter: Write + Send {
    /// Finalize and publish the object under its key
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard everything written so far
    fn abort(self: Box<Self>);
}

/// Build the backend for a configured target
pub fn open_backend(config: &Config) -> Result<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match &config.target {
        StorageTarget::Local { root } => Arc::new(LocalBackend::new(root, config.dir_mode)),
        StorageTarget::Remote { bucket_url, prefix } => Arc::new(RemoteBackend::new(
            bucket_url.clone(),
            prefix,
            config.remote,
        )?),
    };
    tracing::debug!("Opened backend {}", backend.describe());
    Ok(backend)
}
