//! Storage backends for the snip URL shortener.
//!
//! Three interchangeable implementations of [`Repository`]:
//!
//! - [`InMemoryRepository`]: a lock-guarded map, lost on exit.
//! - [`FileRepository`]: the in-memory map plus an append-only JSON lines log
//!   replayed on startup.
//! - [`SqliteRepository`]: a SQL table with transactional batch inserts.
//!
//! [`open`] builds the one selected by a [`StorageBackend`].

pub mod backend;
mod error;
pub mod file;
pub mod memory;
pub mod ownership;
pub mod sqlite;

pub use backend::{open, StorageBackend};
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use ownership::OwnerIndex;
pub use sqlite::{SqliteRepository, SqliteSettings};
pub use snip_core::{ReadRepository, Repository, StatRecord, StorageError, UrlRecord};
