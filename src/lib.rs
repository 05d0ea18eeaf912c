//! # lfs-store
//!
//! Content-addressable object store for large binary payloads (LFS objects,
//! avatars, attachments) with:
//! - One backend abstraction over a local directory or a remote bucket
//! - Streaming SHA-256 + size verification before anything becomes visible
//! - Deterministic two-level key sharding (`ab/cd/ef01...`)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Metadata layer (caller)                       │
//! │           ObjectDescriptor { oid, size } + bytes             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    ContentStore                              │
//! │        Get / Put / Exists / Verify / Delete                  │
//! └──────┬──────────────────────┬───────────────────────────────┘
//!        │                      │
//!        ▼                      ▼
//!  ┌─────────────┐      ┌──────────────────┐
//!  │ transform   │      │ IntegrityVerifier│
//!  │   _key      │      │ (sha256 + count) │
//!  └─────────────┘      └──────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Backend (per operation handle)               │
//! │           Local dir   │   Remote bucket   │   Memory         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod object;
pub mod key;
pub mod verifier;
pub mod backend;
pub mod store;
pub mod bucket;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StoreError, Result};
pub use config::{Config, StorageTarget};
pub use object::{ObjectDescriptor, ObjectId};
pub use key::{attachment_key, transform_key};
pub use store::ContentStore;
pub use bucket::Bucket;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of lfs-store
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
