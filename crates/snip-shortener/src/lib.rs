//! URL shortener service implementation.
//!
//! This crate ties a [`Generator`](snip_generator::Generator) and a
//! [`Repository`](snip_core::Repository) together behind the [`Shortener`]
//! trait consumed by transports. Deletes are applied in the background by
//! the [`AsyncDeleter`]. Core types are re-exported from `snip_core`.

pub mod deleter;
pub mod error;
pub mod service;
pub mod shortener;

pub use deleter::AsyncDeleter;
pub use error::ShortenerError;
pub use service::ShortenerService;
pub use shortener::{Shortened, Shortener};
pub use snip_core::{ShortCode, StatRecord, UrlRecord};
