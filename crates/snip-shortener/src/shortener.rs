use crate::error::Result;
use async_trait::async_trait;
use snip_core::{ShortCode, StatRecord, UrlRecord};

/// Outcome of shortening a single URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortened {
    /// A new record was stored under the code.
    Created(ShortCode),
    /// The same URL was already stored by the same owner under the code.
    Existing(ShortCode),
}

impl Shortened {
    pub fn code(&self) -> &ShortCode {
        match self {
            Shortened::Created(code) | Shortened::Existing(code) => code,
        }
    }

    pub fn into_code(self) -> ShortCode {
        match self {
            Shortened::Created(code) | Shortened::Existing(code) => code,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Shortened::Created(_))
    }
}

/// The operations a transport (HTTP, gRPC, CLI) needs from the shortener.
#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Shortens a URL given as raw request bytes on behalf of `owner_id`.
    async fn create_url(&self, url: &[u8], owner_id: &str) -> Result<Shortened>;

    /// Shortens every URL or none. `output[i]` is the code of `urls[i]`.
    ///
    /// URLs the owner already shortened are not stored again, matching
    /// [`Shortened::Existing`] on the single-URL path. A code held by another
    /// owner or another URL fails the whole batch with `Conflict`.
    async fn create_url_batch(&self, urls: &[String], owner_id: &str) -> Result<Vec<ShortCode>>;

    /// Resolves a short code to its original URL.
    async fn get_url(&self, code: &ShortCode) -> Result<String>;

    /// Lists the live URLs created by `owner_id`.
    async fn urls_by_owner(&self, owner_id: &str) -> Result<Vec<UrlRecord>>;

    /// Schedules a soft delete and returns before it is applied.
    async fn delete_urls(&self, codes: Vec<ShortCode>, owner_id: &str) -> Result<()>;

    /// Counts live URLs and their owners.
    async fn stats(&self) -> Result<StatRecord>;

    /// Checks that the storage backend is reachable.
    async fn ping_storage(&self) -> Result<()>;

    /// Waits for scheduled deletes, then closes storage.
    async fn close(&self) -> Result<()>;
}
