use crate::error::Result;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored URL record in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// The short code, unique within a store.
    pub code: ShortCode,
    /// The original URL that was shortened.
    pub original_url: String,
    /// The principal that created the record. Never reassigned.
    pub owner_id: String,
    /// Soft-delete flag. Only ever flips from `false` to `true`.
    pub deleted: bool,
}

impl UrlRecord {
    /// Creates a live (not deleted) record.
    pub fn new(
        code: ShortCode,
        original_url: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            code,
            original_url: original_url.into(),
            owner_id: owner_id.into(),
            deleted: false,
        }
    }

    /// Returns `true` when `other` would store the same content under the same owner.
    pub fn same_content(&self, other: &UrlRecord) -> bool {
        self.code == other.code
            && self.original_url == other.original_url
            && self.owner_id == other.owner_id
    }
}

/// Aggregate counts over all live records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    /// Number of distinct live short codes.
    pub urls: u64,
    /// Number of distinct owners holding at least one live code.
    pub users: u64,
}

/// A read-only view of a repository.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Returns the original URL for `code`.
    ///
    /// Fails with `NotFound` if the code was never stored and with `Gone`
    /// if it was soft-deleted.
    async fn get(&self, code: &ShortCode) -> Result<String>;

    /// Returns the raw record for `code`, soft-deleted or not.
    ///
    /// This is an existence check for conflict resolution; content of a
    /// deleted record must not be handed to readers.
    async fn lookup(&self, code: &ShortCode) -> Result<Option<UrlRecord>>;

    /// Lists the live records created by `owner_id`. An empty list is not an error.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<UrlRecord>>;

    /// Counts live codes and the distinct owners holding them.
    async fn stats(&self) -> Result<StatRecord>;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a new record. Returns `Err(Conflict)` if the code already exists,
    /// whether or not the content matches.
    async fn create(&self, record: UrlRecord) -> Result<()>;

    /// Inserts all records or none of them.
    ///
    /// A conflict with a stored code, or two records sharing a code inside
    /// the batch, aborts the whole batch.
    async fn create_batch(&self, records: Vec<UrlRecord>) -> Result<()>;

    /// Soft-deletes the codes in `codes` that belong to `owner_id`.
    ///
    /// Codes owned by someone else, or unknown codes, are skipped without error.
    async fn delete_urls(&self, codes: &[ShortCode], owner_id: &str) -> Result<()>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Releases backend resources. Call once, after in-flight work has finished.
    async fn close(&self) -> Result<()>;
}
