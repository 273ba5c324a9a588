//! `wordstore` - reactive single-table local store
//!
//! A durable `word_table` whose contents are observed as a live, sorted
//! snapshot. Writes are queued and applied off the caller's thread; every
//! applied write re-evaluates the live query and pushes the new result to
//! subscribers on the delivery context each one chose.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`model`] - The persisted entity ([`Word`])
//! - [`storage`] - `SQLite` table store
//! - [`queue`] - Single-writer queue for mutations
//! - [`observable`] - Live query and subscriptions
//! - [`delivery`] - Delivery contexts for subscriber callbacks
//! - [`repository`] - The consumer-facing façade
//! - [`database`] - Explicit database handle and bootstrap seeding
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling
//! - [`logging`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use wordstore::{Word, WordDatabase};
//!
//! # fn main() -> wordstore::Result<()> {
//! let db = WordDatabase::open_in_memory()?;
//! let repo = db.repository();
//! let _sub = repo.get_all().subscribe(|words| println!("{} words", words.len()))?;
//! repo.insert(Word::new("alpha")?)?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod database;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod model;
pub mod observable;
pub mod queue;
pub mod repository;
pub mod storage;

pub use config::{SeedPolicy, StoreConfig};
pub use database::{DatabaseBuilder, WordDatabase};
pub use delivery::{DedicatedThread, Dispatcher, Inline, MainLoop, MainLoopDriver, main_loop};
pub use error::{ErrorCode, Result, StoreError};
pub use model::Word;
pub use observable::{LiveQuery, Subscription, SubscriptionId};
pub use queue::{ErrorSink, WriteHandle};
pub use repository::WordRepository;
pub use storage::{OpenKind, SqliteStorage, TableStore};
