//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the types shared by the storage backends and the
//! shortener service: the short code, the stored record and the repository
//! contract every backend implements.

pub mod error;
pub mod repository;
pub mod shortcode;

pub use error::{CoreError, StorageError};
pub use repository::{ReadRepository, Repository, StatRecord, UrlRecord};
pub use shortcode::ShortCode;
