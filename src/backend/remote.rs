//! Remote Object-Storage Backend
//!
//! Talks plain HTTP to an S3-style bucket with path addressing:
//!
//! ```text
//! HEAD   <bucket>/<prefix>/<key>             exists / stat
//! GET    <bucket>/<prefix>/<key>  [Range]    read
//! PUT    <bucket>/<prefix>/<key>             commit
//! DELETE <bucket>/<prefix>/<key>             delete (404 is fine)
//! ```
//!
//! Writers spool to an anonymous temp file and upload in a single PUT on
//! commit, so nothing is visible remotely until the whole object is there and
//! memory use stays flat regardless of object size.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Body, Client, Response};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::StatusCode;
use url::Url;

use crate::config::RemoteOptions;
use crate::error::{Result, StoreError};
use crate::key::key_segments;

use super::{Backend, BackendHandle, ObjectReader, ObjectWriter};

/// Backend for an HTTP(S) bucket under a key prefix
#[derive(Clone)]
pub struct RemoteBackend {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    bucket_url: Url,
    prefix: Vec<String>,
}

impl RemoteBackend {
    pub fn new(bucket_url: Url, prefix: &str, options: RemoteOptions) -> Result<Self> {
        if bucket_url.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "bucket url cannot hold object paths: {bucket_url}"
            )));
        }

        let timeout = (options.timeout_ms > 0).then(|| Duration::from_millis(options.timeout_ms));
        let mut builder = Client::builder().timeout(timeout);
        if options.connect_timeout_ms > 0 {
            builder = builder.connect_timeout(Duration::from_millis(options.connect_timeout_ms));
        }
        if !options.use_env_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| StoreError::BackendUnavailable(format!("http client: {e}")))?;

        let prefix = prefix
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                bucket_url,
                prefix,
            }),
        })
    }

    /// Full URL for a key
    pub fn object_url(&self, key: &str) -> Result<Url> {
        self.inner.object_url(key)
    }
}

impl std::fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("bucket_url", &self.inner.bucket_url.as_str())
            .field("prefix", &self.inner.prefix.join("/"))
            .finish()
    }
}

impl Inner {
    fn object_url(&self, key: &str) -> Result<Url> {
        let segments = key_segments(key)?;
        let mut url = self.bucket_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                StoreError::Config(format!("bucket url cannot hold object paths: {}", self.bucket_url))
            })?;
            path.pop_if_empty();
            path.extend(self.prefix.iter().map(String::as_str));
            path.extend(segments);
        }
        Ok(url)
    }

    fn head(&self, url: &Url) -> Result<Response> {
        self.client
            .head(url.clone())
            .send()
            .map_err(|e| transport("HEAD", url, e))
    }
}

impl Backend for RemoteBackend {
    fn open(&self) -> Result<Box<dyn BackendHandle>> {
        Ok(Box::new(RemoteHandle {
            inner: Arc::clone(&self.inner),
        }))
    }

    fn describe(&self) -> String {
        let prefix = self.inner.prefix.join("/");
        format!("{} (prefix {:?})", self.inner.bucket_url, prefix)
    }
}

struct RemoteHandle {
    inner: Arc<Inner>,
}

impl BackendHandle for RemoteHandle {
    fn exists(&self, key: &str) -> Result<bool> {
        let url = self.inner.object_url(key)?;
        let resp = self.inner.head(&url)?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(bad_status("HEAD", &url, s)),
        }
    }

    fn stat_size(&self, key: &str) -> Result<u64> {
        let url = self.inner.object_url(key)?;
        let resp = self.inner.head(&url)?;
        match resp.status() {
            s if s.is_success() => header_length(&resp).ok_or_else(|| {
                StoreError::BackendUnavailable(format!("HEAD {url}: missing content-length"))
            }),
            StatusCode::NOT_FOUND => Err(StoreError::ObjectNotFound(key.to_string())),
            s => Err(bad_status("HEAD", &url, s)),
        }
    }

    fn new_reader(&self, key: &str, offset: u64) -> Result<ObjectReader> {
        let url = self.inner.object_url(key)?;
        let mut req = self.inner.client.get(url.clone());
        if offset > 0 {
            req = req.header(RANGE, format!("bytes={offset}-"));
        }
        let mut resp = req.send().map_err(|e| transport("GET", &url, e))?;

        match resp.status() {
            StatusCode::PARTIAL_CONTENT => Ok(Box::new(resp)),
            StatusCode::OK => {
                // Server ignored the Range header; skip ahead ourselves.
                if offset > 0 {
                    let skipped = io::copy(&mut (&mut resp).take(offset), &mut io::sink())?;
                    if skipped < offset {
                        return Err(StoreError::RangeError {
                            offset,
                            size: skipped,
                        });
                    }
                }
                Ok(Box::new(resp))
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                let size = self.stat_size(key)?;
                if offset == size {
                    Ok(Box::new(io::empty()))
                } else {
                    Err(StoreError::RangeError { offset, size })
                }
            }
            StatusCode::NOT_FOUND => Err(StoreError::ObjectNotFound(key.to_string())),
            s => Err(bad_status("GET", &url, s)),
        }
    }

    fn new_writer(&self, key: &str) -> Result<Box<dyn ObjectWriter>> {
        let url = self.inner.object_url(key)?;
        let spool = tempfile::tempfile()?;
        Ok(Box::new(RemoteWriter {
            inner: Arc::clone(&self.inner),
            url,
            spool: BufWriter::new(spool),
        }))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let url = self.inner.object_url(key)?;
        let resp = self
            .inner
            .client
            .delete(url.clone())
            .send()
            .map_err(|e| transport("DELETE", &url, e))?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            s => Err(bad_status("DELETE", &url, s)),
        }
    }
}

struct RemoteWriter {
    inner: Arc<Inner>,
    url: Url,
    spool: BufWriter<File>,
}

impl Write for RemoteWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.spool.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.spool.flush()
    }
}

impl ObjectWriter for RemoteWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        let RemoteWriter { inner, url, spool } = *self;

        let mut file = spool
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        let resp = inner
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::sized(file, len))
            .send()
            .map_err(|e| transport("PUT", &url, e))?;

        if !resp.status().is_success() {
            return Err(bad_status("PUT", &url, resp.status()));
        }
        tracing::trace!("Uploaded {} bytes to {}", len, url);
        Ok(())
    }

    fn abort(self: Box<Self>) {
        // Spool file is anonymous; dropping it frees the space.
        drop(self);
    }
}

fn header_length(resp: &Response) -> Option<u64> {
    resp.headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn transport(method: &str, url: &Url, e: reqwest::Error) -> StoreError {
    StoreError::BackendUnavailable(format!("{method} {url}: {e}"))
}

fn bad_status(method: &str, url: &Url, status: StatusCode) -> StoreError {
    StoreError::BackendUnavailable(format!("{method} {url}: unexpected status {status}"))
}
