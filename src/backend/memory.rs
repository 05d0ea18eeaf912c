//! In-Memory Backend
//!
//! Objects live in a shared map for the lifetime of the backend. Nothing is
//! persisted.

use std::collections::HashMap;
use std::io::{self, Cursor, Write};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{Result, StoreError};

use super::{Backend, BackendHandle, ObjectReader, ObjectWriter};

type Objects = Arc<RwLock<HashMap<String, Bytes>>>;

/// In-process backend keyed by storage key.
///
/// Intended for tests and embedding. Handles share the map; writers buffer
/// their bytes and insert them under the write lock on commit, so readers
/// never see a partial object.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    objects: Objects,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Sorted list of stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Overwrite a key directly, bypassing writers. Test hook for corruption.
    pub fn insert_raw(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().insert(key.into(), data.into());
    }
}

impl Backend for MemoryBackend {
    fn open(&self) -> Result<Box<dyn BackendHandle>> {
        Ok(Box::new(MemoryHandle {
            objects: Arc::clone(&self.objects),
        }))
    }

    fn describe(&self) -> String {
        "mem://".to_string()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("object_count", &self.len())
            .finish()
    }
}

struct MemoryHandle {
    objects: Objects,
}

impl BackendHandle for MemoryHandle {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    fn stat_size(&self, key: &str) -> Result<u64> {
        self.objects
            .read()
            .get(key)
            .map(|data| data.len() as u64)
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))
    }

    fn new_reader(&self, key: &str, offset: u64) -> Result<ObjectReader> {
        let data = self
            .objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))?;

        let size = data.len() as u64;
        if offset > size {
            return Err(StoreError::RangeError { offset, size });
        }

        Ok(Box::new(Cursor::new(data.slice(offset as usize..))))
    }

    fn new_writer(&self, key: &str) -> Result<Box<dyn ObjectWriter>> {
        Ok(Box::new(MemoryWriter {
            objects: Arc::clone(&self.objects),
            key: key.to_string(),
            buf: Vec::new(),
        }))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().remove(key);
        Ok(())
    }
}

struct MemoryWriter {
    objects: Objects,
    key: String,
    buf: Vec<u8>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectWriter for MemoryWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        let MemoryWriter { objects, key, buf } = *self;
        objects.write().insert(key, Bytes::from(buf));
        Ok(())
    }

    fn abort(self: Box<Self>) {}
}
