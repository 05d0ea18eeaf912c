//! Integrity Verifier
//!
//! Single-pass SHA-256 + byte counter. Bytes are observed as they flow from
//! source to sink; nothing is buffered beyond the copy buffer, so objects of
//! any size can be checked.

use std::io::{self, Read, Write};

use sha2::{Digest as _, Sha256};

use crate::object::ObjectDescriptor;
use crate::error::{Result, StoreError};

/// Running digest and byte count
#[derive(Clone, Default)]
pub struct IntegrityVerifier {
    hasher: Sha256,
    bytes: u64,
}

/// Final `(hex digest, byte count)` of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub hex: String,
    pub len: u64,
}

impl IntegrityVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Bytes seen so far
    pub fn bytes_seen(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> Digest {
        Digest {
            hex: hex::encode(self.hasher.finalize()),
            len: self.bytes,
        }
    }

    /// Drain `reader` through a fresh verifier
    pub fn digest_reader<R: Read>(reader: &mut R) -> io::Result<Digest> {
        let mut sink = HashingWriter::new(io::sink());
        io::copy(reader, &mut sink)?;
        Ok(sink.finish().1)
    }
}

impl Digest {
    /// Check against a descriptor: size first, then hash
    pub fn check(&self, expected: &ObjectDescriptor) -> Result<()> {
        if self.len != expected.size {
            return Err(StoreError::SizeMismatch {
                expected: expected.size,
                actual: self.len,
            });
        }
        // Exact match: an oid in any other case names a different key.
        if self.hex != expected.oid.as_str() {
            return Err(StoreError::HashMismatch {
                expected: expected.oid.to_string(),
                actual: self.hex.clone(),
            });
        }
        Ok(())
    }
}

/// Writer adapter that hashes and counts everything passed through it
pub struct HashingWriter<W> {
    inner: W,
    verifier: IntegrityVerifier,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            verifier: IntegrityVerifier::new(),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.verifier.bytes_seen()
    }

    /// Split back into the sink and the final digest
    pub fn finish(self) -> (W, Digest) {
        (self.inner, self.verifier.finish())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        // Only what the sink accepted counts.
        self.verifier.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
