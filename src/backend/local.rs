//! Local Directory Backend
//!
//! Objects are plain files under a root directory, one path segment per key
//! segment. Writes go to a hidden temp file in the destination directory and
//! are renamed into place on commit, so a reader either sees the complete
//! object or nothing.

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Result, StoreError};
use crate::key::key_segments;

use super::{Backend, BackendHandle, ObjectReader, ObjectWriter};

/// Prefix for in-flight writes; never a valid hex key segment
const TEMP_PREFIX: &str = ".tmp-";

/// Backend rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    dir_mode: u32,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>, dir_mode: u32) -> Self {
        Self {
            root: root.into(),
            dir_mode,
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Backend for LocalBackend {
    fn open(&self) -> Result<Box<dyn BackendHandle>> {
        create_dirs(&self.root, self.dir_mode).map_err(|e| {
            StoreError::BackendUnavailable(format!(
                "failed to create '{}': {}",
                self.root.display(),
                e
            ))
        })?;

        Ok(Box::new(LocalHandle {
            root: self.root.clone(),
            dir_mode: self.dir_mode,
        }))
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

struct LocalHandle {
    root: PathBuf,
    dir_mode: u32,
}

impl LocalHandle {
    /// `root/seg/seg/...` for a validated key
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in key_segments(key)? {
            path.push(segment);
        }
        Ok(path)
    }

    /// Remove now-empty shard directories between `path` and the root
    fn prune_empty_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            if let Err(e) = fs::remove_dir(d) {
                // Non-empty or already gone: either way we're done.
                tracing::trace!("Stopped pruning at {}: {}", d.display(), e);
                break;
            }
            dir = d.parent();
        }
    }
}

impl BackendHandle for LocalHandle {
    fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    fn stat_size(&self, key: &str) -> Result<u64> {
        let path = self.object_path(key)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(StoreError::ObjectNotFound(key.to_string())),
            Err(e) => Err(map_io(key, &path, e)),
        }
    }

    fn new_reader(&self, key: &str, offset: u64) -> Result<ObjectReader> {
        let path = self.object_path(key)?;
        let mut file = File::open(&path).map_err(|e| map_io(key, &path, e))?;

        let size = file.metadata()?.len();
        if offset > size {
            return Err(StoreError::RangeError { offset, size });
        }
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }

        Ok(Box::new(file))
    }

    fn new_writer(&self, key: &str) -> Result<Box<dyn ObjectWriter>> {
        let dest = self.object_path(key)?;
        let parent = dest
            .parent()
            .ok_or_else(|| StoreError::InvalidIdentifier(key.to_string()))?
            .to_path_buf();

        create_dirs(&parent, self.dir_mode).map_err(|e| unavailable(&parent, e))?;

        let temp = match new_temp_in(&parent) {
            Ok(temp) => temp,
            // Shard directory pruned by a concurrent delete.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                create_dirs(&parent, self.dir_mode).map_err(|e| unavailable(&parent, e))?;
                new_temp_in(&parent).map_err(|e| unavailable(&parent, e))?
            }
            Err(e) => return Err(unavailable(&parent, e)),
        };

        tracing::trace!("Staging {} at {}", key, temp.path().display());

        Ok(Box::new(LocalWriter {
            writer: BufWriter::new(temp),
            dest,
        }))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_empty_parents(&path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(&path, e)),
        }
    }
}

/// Temp file staged next to its final destination
struct LocalWriter {
    writer: BufWriter<NamedTempFile>,
    dest: PathBuf,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl ObjectWriter for LocalWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        let LocalWriter { writer, dest } = *self;

        let temp = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        temp.as_file().sync_all()?;

        // Same directory, so the rename is atomic.
        temp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn abort(self: Box<Self>) {
        // NamedTempFile removes itself on drop.
        drop(self);
    }
}

fn new_temp_in(dir: &Path) -> io::Result<NamedTempFile> {
    tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)
}

fn create_dirs(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path)
}

fn map_io(key: &str, path: &Path, e: io::Error) -> StoreError {
    match e.kind() {
        io::ErrorKind::NotFound => StoreError::ObjectNotFound(key.to_string()),
        _ => unavailable(path, e),
    }
}

/// Any filesystem failure other than not-found
fn unavailable(path: &Path, e: io::Error) -> StoreError {
    StoreError::BackendUnavailable(format!("{}: {}", path.display(), e))
}
