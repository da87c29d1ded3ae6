//! # chatloom-core
//!
//! Core library for chatloom - a persistence layer for chat backends.
//!
//! This library provides:
//! - Domain types for threads, thread items, and attachments
//! - SQLite metadata store with keyset pagination
//! - Filesystem blob store for attachment payloads
//! - Session registry, configuration management, and logging infrastructure
//!
//! ## Architecture
//!
//! Storage is split across two stores with one optional link between them:
//! - **Metadata store:** threads, items, and attachment records as JSON
//!   documents in SQLite, with indexed columns for ordering and pagination
//! - **Blob store:** attachment bytes on the filesystem, one directory per
//!   attachment with a `metadata.json` side-file
//! - When the blob store carries a mirror handle, attachment records are
//!   best-effort replicated into the metadata store on create and delete
//!
//! ## Example
//!
//! ```rust,no_run
//! use chatloom_core::{Config, MetadataStore};
//!
//! # async fn example() -> chatloom_core::Result<()> {
//! let config = Config::load()?;
//! let store = MetadataStore::open(&config.storage.database_path()).await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use blob::{BlobMetadata, BlobStore};
pub use config::Config;
pub use error::{Error, Result};
pub use session::SessionRegistry;
pub use store::MetadataStore;
pub use types::*;

// Public modules
pub mod blob;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod store;
pub mod types;
