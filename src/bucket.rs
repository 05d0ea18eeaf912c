//! Keyed blob access for avatars and attachments
//!
//! Same backends as the content store, without the integrity contract: keys
//! are used verbatim and the stored size is whatever the upload produced.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::backend::{open_backend, Backend, ObjectReader};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::key::attachment_key;
use crate::store::release;

#[derive(Clone)]
pub struct Bucket {
    backend: Arc<dyn Backend>,
}

impl Bucket {
    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self::with_backend(open_backend(config)?))
    }

    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Upload `reader` under `key`, returning the stored size
    pub fn upload(&self, key: &str, mut reader: impl Read) -> Result<u64> {
        let handle = self.backend.open()?;
        let result = (|| {
            let mut writer = handle.new_writer(key)?;
            if let Err(e) = io::copy(&mut reader, &mut writer).and_then(|_| writer.flush()) {
                writer.abort();
                return Err(StoreError::from(e));
            }
            writer.commit()?;
            handle.stat_size(key)
        })();
        if let Ok(size) = &result {
            tracing::debug!("Uploaded {} ({} bytes)", key, size);
        }
        release(handle, result)
    }

    pub fn open_object(&self, key: &str) -> Result<ObjectReader> {
        let handle = self.backend.open()?;
        let result = handle.new_reader(key, 0);
        release(handle, result)
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        let handle = self.backend.open()?;
        let result = handle.exists(key);
        release(handle, result)
    }

    /// Delete `key` if present; `Ok(true)` when something was removed
    pub fn remove(&self, key: &str) -> Result<bool> {
        let handle = self.backend.open()?;
        let result = match handle.exists(key) {
            Ok(true) => handle.delete(key).map(|_| true),
            other => other,
        };
        release(handle, result)
    }

    pub fn upload_attachment(&self, uuid: &str, reader: impl Read) -> Result<u64> {
        self.upload(&attachment_key(uuid), reader)
    }

    pub fn open_attachment(&self, uuid: &str) -> Result<ObjectReader> {
        self.open_object(&attachment_key(uuid))
    }

    pub fn remove_attachment(&self, uuid: &str) -> Result<bool> {
        self.remove(&attachment_key(uuid))
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("backend", &self.backend.describe())
            .finish()
    }
}
