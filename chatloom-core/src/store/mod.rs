//! Metadata storage layer for chatloom
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Thread / thread-item / attachment-record persistence
//! - Keyset pagination for listings

pub mod schema;
pub mod sqlite;

pub use sqlite::MetadataStore;
