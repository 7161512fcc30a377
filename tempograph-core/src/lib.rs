//! # tempograph-core
//!
//! Core library for tempograph - a local, privacy-preserving usage-analytics
//! engine for playback-speed tooling.
//!
//! This library provides:
//! - Session tracking with visibility-gated active time
//! - A durable, retention-bounded aggregate store
//! - Pure insight derivation (speed, keyboard, site, trend views)
//! - A synchronous event bus the engine attaches to
//!
//! ## Architecture
//!
//! Data flows one way: bus events mutate the in-memory [`Session`] (with
//! ephemeral snapshots along the way), a finished session is merged exactly
//! once into the durable [`Aggregate`], and insights are derived read-only
//! from the aggregate. Everything stays on the local machine.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use tempograph_core::{AnalyticsEngine, Config, EventBus, SystemClock};
//! use tempograph_core::storage::{MemoryStore, SqliteStore};
//!
//! let config = Config::load().expect("failed to load config");
//! let durable = Rc::new(SqliteStore::open(&config.database_path()).expect("open store"));
//! let engine = Rc::new(RefCell::new(AnalyticsEngine::new(
//!     durable,
//!     Rc::new(MemoryStore::new()),
//!     Rc::new(EventBus::new()),
//!     Rc::new(SystemClock),
//!     &config.tracking,
//! )));
//! AnalyticsEngine::attach(&engine);
//! ```

// Re-export commonly used items at the crate root
pub use bus::{AnalyticsEvent, AnalyticsEventKind, EventBus, SharedBus};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use engine::AnalyticsEngine;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod aggregate;
pub mod bus;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod insights;
pub mod logging;
pub mod storage;
pub mod tracker;
pub mod types;
