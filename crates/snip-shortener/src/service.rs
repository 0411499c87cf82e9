use crate::deleter::AsyncDeleter;
use crate::error::{Result, ShortenerError};
use crate::shortener::{Shortened, Shortener};
use async_trait::async_trait;
use snip_core::{Repository, ShortCode, StatRecord, StorageError, UrlRecord};
use snip_generator::Generator;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};
use url::Url;

/// A concrete implementation of the `Shortener` trait.
///
/// This service wraps a `Repository` and a `Generator` to handle:
/// - URL validation
/// - Content-derived short codes, with conflict resolution on repeat requests
/// - Background soft deletes through an [`AsyncDeleter`]
///
/// The generator is not required to be collision free. Two different URLs
/// landing on the same code surface as [`ShortenerError::Conflict`]; no
/// retry with another code is attempted.
#[derive(Debug)]
pub struct ShortenerService<R: ?Sized, G> {
    repository: Arc<R>,
    generator: G,
    deleter: AsyncDeleter<R>,
}

impl<R: Repository + ?Sized, G: Generator> ShortenerService<R, G> {
    pub fn new(repository: Arc<R>, generator: G) -> Self {
        Self {
            deleter: AsyncDeleter::new(Arc::clone(&repository)),
            repository,
            generator,
        }
    }

    /// Number of scheduled deletes that have not been applied yet.
    pub fn pending_deletes(&self) -> usize {
        self.deleter.pending()
    }

    /// Checks that `url` is UTF-8 and parses as an absolute URL.
    fn validate_url(url: &[u8]) -> Result<&str> {
        let url = std::str::from_utf8(url)
            .map_err(|e| ShortenerError::InvalidUrl(format!("url is not valid UTF-8: {e}")))?;

        Url::parse(url).map_err(|e| ShortenerError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(url)
    }

    /// Decides what a conflict on `record.code` means for the caller.
    async fn resolve_conflict(&self, record: UrlRecord) -> Result<Shortened> {
        match self.repository.lookup(&record.code).await? {
            Some(existing) if existing.same_content(&record) => {
                debug!(code = %record.code, owner = %record.owner_id, "url already shortened");
                Ok(Shortened::Existing(record.code))
            }
            _ => {
                warn!(code = %record.code, url = %record.original_url, "short code collision");
                Err(ShortenerError::Conflict(record.code.into_string()))
            }
        }
    }
}

#[async_trait]
impl<R: Repository + ?Sized, G: Generator> Shortener for ShortenerService<R, G> {
    async fn create_url(&self, url: &[u8], owner_id: &str) -> Result<Shortened> {
        let url = Self::validate_url(url)?;
        let code = self.generator.generate(url.as_bytes());
        let record = UrlRecord::new(code.clone(), url, owner_id);

        match self.repository.create(record.clone()).await {
            Ok(()) => {
                debug!(code = %code, owner = owner_id, "created short url");
                Ok(Shortened::Created(code))
            }
            Err(StorageError::Conflict(_)) => self.resolve_conflict(record).await,
            Err(err) => {
                error!(code = %code, error = %err, "failed to store short url");
                Err(err.into())
            }
        }
    }

    async fn create_url_batch(&self, urls: &[String], owner_id: &str) -> Result<Vec<ShortCode>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        for url in urls {
            Self::validate_url(url.as_bytes())?;
        }

        let codes: Vec<ShortCode> = urls
            .iter()
            .map(|url| self.generator.generate(url.as_bytes()))
            .collect();

        // Repeated URLs are stored once. Distinct URLs sharing a code are
        // all passed on so the repository rejects the batch.
        let mut seen = HashSet::with_capacity(urls.len());
        let records: Vec<UrlRecord> = urls
            .iter()
            .zip(&codes)
            .filter(|&(url, _)| seen.insert(url.as_str()))
            .map(|(url, code)| UrlRecord::new(code.clone(), url.as_str(), owner_id))
            .collect();

        // Codes the owner already holds for the same URL count as stored.
        let mut missing = Vec::with_capacity(records.len());
        for record in records {
            match self.repository.lookup(&record.code).await? {
                Some(existing) if existing.same_content(&record) => {
                    trace!(code = %record.code, "url already shortened");
                }
                Some(_) => {
                    warn!(code = %record.code, url = %record.original_url, "short code collision");
                    return Err(ShortenerError::Conflict(record.code.into_string()));
                }
                None => missing.push(record),
            }
        }

        let stored = missing.len();
        if !missing.is_empty() {
            self.repository.create_batch(missing).await.map_err(|err| {
                warn!(owner = owner_id, error = %err, "url batch rejected");
                ShortenerError::from(err)
            })?;
        }

        debug!(owner = owner_id, requested = urls.len(), stored, "created short url batch");
        Ok(codes)
    }

    async fn get_url(&self, code: &ShortCode) -> Result<String> {
        trace!(code = %code, "resolving short url");
        Ok(self.repository.get(code).await?)
    }

    async fn urls_by_owner(&self, owner_id: &str) -> Result<Vec<UrlRecord>> {
        Ok(self.repository.list_by_owner(owner_id).await?)
    }

    async fn delete_urls(&self, codes: Vec<ShortCode>, owner_id: &str) -> Result<()> {
        let requested = codes.len();
        self.deleter.schedule(codes, owner_id.to_string())?;
        debug!(owner = owner_id, requested, "scheduled delete");
        Ok(())
    }

    async fn stats(&self) -> Result<StatRecord> {
        Ok(self.repository.stats().await?)
    }

    async fn ping_storage(&self) -> Result<()> {
        Ok(self.repository.ping().await?)
    }

    async fn close(&self) -> Result<()> {
        self.deleter.drain().await?;
        self.repository.close().await?;
        debug!("shortener closed");
        Ok(())
    }
}
