//! Content Store
//!
//! Get/Put/Exists/Verify/Delete over a backend, keyed by sharded content hash.
//!
//! ## Put Pipeline
//! ```text
//!   input ──► HashingWriter ──► ObjectWriter (staged, invisible)
//!                  │
//!                  ▼
//!          size == declared? ── no ──► abort, SizeMismatch
//!          hash == oid?      ── no ──► abort, HashMismatch
//!          key already held? ── diff size ──► abort, KeyCollisionSuspected
//!                  │           same size ──► abort, Ok (identical bytes)
//!                  ▼
//!               commit
//! ```
//!
//! An object is either absent or complete and verified; a failed Put never
//! leaves anything under its key.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::backend::{open_backend, Backend, BackendHandle, ObjectReader};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::object::ObjectDescriptor;
use crate::verifier::{HashingWriter, IntegrityVerifier};

/// Content-addressed store over a single backend
///
/// ## Concurrency
/// - No shared mutable state; all methods take `&self`
/// - Every call opens its own backend handle and closes it before returning
/// - Same-key races are settled by the backend's atomic commit
#[derive(Clone)]
pub struct ContentStore {
    backend: Arc<dyn Backend>,
}

impl ContentStore {
    /// Build a store for the configured target
    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self::with_backend(open_backend(config)?))
    }

    /// Build a store over an existing backend
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Stream `input` into the store, committing only if it matches `descriptor`
    pub fn put(&self, descriptor: &ObjectDescriptor, mut input: impl Read) -> Result<()> {
        let key = descriptor.storage_key();
        let handle = self.backend.open()?;
        let result = Self::put_with(handle.as_ref(), &key, descriptor, &mut input);
        release(handle, result)
    }

    /// Stream from `from_byte` to the end of the object
    ///
    /// `from_byte == size` yields an empty stream. Content is not re-hashed.
    pub fn get(&self, descriptor: &ObjectDescriptor, from_byte: u64) -> Result<ObjectReader> {
        let key = descriptor.storage_key();
        let handle = self.backend.open()?;
        let result = Self::get_with(handle.as_ref(), &key, from_byte);
        release(handle, result)
    }

    /// Existence check, fail-open: backend errors read as `false`
    ///
    /// Use `try_exists` to tell "absent" from "could not ask".
    pub fn exists(&self, descriptor: &ObjectDescriptor) -> bool {
        match self.try_exists(descriptor) {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!("Exists check for {} failed, reporting absent: {}", descriptor.oid, e);
                false
            }
        }
    }

    /// Existence check that surfaces backend errors
    pub fn try_exists(&self, descriptor: &ObjectDescriptor) -> Result<bool> {
        let key = descriptor.storage_key();
        let handle = self.backend.open()?;
        let result = handle.exists(&key);
        release(handle, result)
    }

    /// Cheap check: stored size equals the declared size
    ///
    /// Does not re-hash; see `verify_content`. Missing objects and backend
    /// failures are errors, a size mismatch is `Ok(false)`.
    pub fn verify(&self, descriptor: &ObjectDescriptor) -> Result<bool> {
        let key = descriptor.storage_key();
        let handle = self.backend.open()?;
        let result = handle.stat_size(&key).map(|size| {
            if size != descriptor.size {
                tracing::debug!(
                    "Size check failed for {}: declared {}, stored {}",
                    descriptor.oid,
                    descriptor.size,
                    size
                );
            }
            size == descriptor.size
        });
        release(handle, result)
    }

    /// Full check: re-read the object once and compare size and hash
    pub fn verify_content(&self, descriptor: &ObjectDescriptor) -> Result<bool> {
        let key = descriptor.storage_key();
        let handle = self.backend.open()?;
        let result = Self::verify_content_with(handle.as_ref(), &key, descriptor);
        release(handle, result)
    }

    /// Remove the object; absent objects are not an error
    pub fn delete(&self, descriptor: &ObjectDescriptor) -> Result<()> {
        let key = descriptor.storage_key();
        let handle = self.backend.open()?;
        let result = handle.delete(&key);
        if result.is_ok() {
            tracing::debug!("Deleted {}", key);
        }
        release(handle, result)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn put_with(
        handle: &dyn BackendHandle,
        key: &str,
        descriptor: &ObjectDescriptor,
        input: &mut dyn Read,
    ) -> Result<()> {
        let mut sink = HashingWriter::new(handle.new_writer(key)?);

        if let Err(e) = io::copy(input, &mut sink).and_then(|_| sink.flush()) {
            sink.finish().0.abort();
            return Err(e.into());
        }

        let (writer, digest) = sink.finish();
        if let Err(e) = digest.check(descriptor) {
            tracing::debug!("Rejected upload for {}: {}", descriptor.oid, e);
            writer.abort();
            return Err(e);
        }

        match handle.stat_size(key) {
            Ok(stored) if stored == descriptor.size => {
                tracing::debug!("{} already present, discarding duplicate upload", key);
                writer.abort();
                return Ok(());
            }
            Ok(stored) => {
                tracing::error!(
                    "Key collision suspected at {}: declared {} bytes, stored {} bytes",
                    key,
                    descriptor.size,
                    stored
                );
                writer.abort();
                return Err(StoreError::KeyCollisionSuspected {
                    key: key.to_string(),
                    expected_size: descriptor.size,
                    stored_size: stored,
                });
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                writer.abort();
                return Err(e);
            }
        }

        writer.commit()?;
        tracing::debug!("Stored {} ({} bytes)", key, digest.len);
        Ok(())
    }

    fn get_with(handle: &dyn BackendHandle, key: &str, from_byte: u64) -> Result<ObjectReader> {
        let size = handle.stat_size(key)?;
        if from_byte > size {
            return Err(StoreError::RangeError {
                offset: from_byte,
                size,
            });
        }
        if from_byte == size {
            return Ok(Box::new(io::empty()));
        }
        handle.new_reader(key, from_byte)
    }

    fn verify_content_with(
        handle: &dyn BackendHandle,
        key: &str,
        descriptor: &ObjectDescriptor,
    ) -> Result<bool> {
        if handle.stat_size(key)? != descriptor.size {
            return Ok(false);
        }

        let mut reader = handle.new_reader(key, 0)?;
        let digest = IntegrityVerifier::digest_reader(&mut reader)?;
        match digest.check(descriptor) {
            Ok(()) => Ok(true),
            Err(e) if e.is_integrity_failure() => {
                tracing::warn!("Content check failed for {}: {}", key, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("backend", &self.backend.describe())
            .finish()
    }
}

/// Close `handle`, preferring the operation's own error over a close error
pub(crate) fn release<T>(handle: Box<dyn BackendHandle>, result: Result<T>) -> Result<T> {
    let closed = handle.close();
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            tracing::warn!("Failed to close backend handle: {}", close_err);
            Err(e)
        }
    }
}
