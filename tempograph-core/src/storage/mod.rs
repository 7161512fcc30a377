//! Storage layer for tempograph
//!
//! The engine persists through a narrow key-value contract: [`KvStore`]
//! offers `get`/`set`/`remove` over arbitrary nested JSON values. Two
//! backends implement it:
//!
//! - [`SqliteStore`] holds the durable aggregate
//! - [`MemoryStore`] holds ephemeral session snapshots; contents do not
//!   survive a restart
//!
//! Read and write failures map to [`crate::Error::StorageRead`] /
//! [`crate::Error::StorageWrite`] so callers can apply the
//! recover-and-continue policy uniformly.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SCHEMA_VERSION};

use crate::error::Result;
use serde_json::Value;
use std::rc::Rc;

/// Shared handle to a store implementation
pub type SharedStore = Rc<dyn KvStore>;

/// Narrow key-value contract the analytics engine persists through
pub trait KvStore {
    /// Fetch the value stored under `key`, or `None` if absent
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any existing value
    fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Delete the value under `key`; deleting an absent key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}
