use crate::ownership::OwnerIndex;
use async_trait::async_trait;
use parking_lot::RwLock;
use snip_core::error::{Result, StorageError};
use snip_core::repository::{ReadRepository, Repository, StatRecord, UrlRecord};
use snip_core::shortcode::ShortCode;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<ShortCode, UrlRecord>,
    owners: OwnerIndex,
}

impl Inner {
    fn insert(&mut self, record: UrlRecord) {
        self.owners.insert(&record.owner_id, record.code.clone());
        self.records.insert(record.code.clone(), record);
    }
}

/// In-memory implementation of the Repository trait.
///
/// Records and the owner index sit behind a single reader/writer lock:
/// readers run concurrently, a writer excludes everyone. One lock is what
/// makes `create_batch` all-or-nothing. Nothing is persisted.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    inner: RwLock<Inner>,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `record` as-is, replacing whatever was stored under its code.
    ///
    /// Used to rebuild state from a durable log, where the latest entry wins.
    pub(crate) fn restore(&self, record: UrlRecord) {
        let mut inner = self.inner.write();
        if let Some(previous) = inner.records.remove(&record.code) {
            inner.owners.remove(&previous.owner_id, &previous.code);
        }
        inner.insert(record);
    }

    /// Removes `codes` outright, owner index included.
    ///
    /// Takes back records whose durable write failed. Unknown codes are ignored.
    pub(crate) fn discard(&self, codes: &[ShortCode]) {
        let mut inner = self.inner.write();
        for code in codes {
            if let Some(record) = inner.records.remove(code) {
                inner.owners.remove(&record.owner_id, code);
            }
        }
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        let inner = self.inner.read();

        match inner.records.get(code) {
            None => Err(StorageError::NotFound(code.to_string())),
            Some(record) if record.deleted => Err(StorageError::Gone(code.to_string())),
            Some(record) => Ok(record.original_url.clone()),
        }
    }

    async fn lookup(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        Ok(self.inner.read().records.get(code).cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<UrlRecord>> {
        let inner = self.inner.read();

        Ok(inner
            .owners
            .codes(owner_id)
            .iter()
            .filter_map(|code| inner.records.get(code))
            .filter(|record| !record.deleted)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<StatRecord> {
        let inner = self.inner.read();
        let mut owners = HashSet::new();
        let mut urls = 0;

        for record in inner.records.values().filter(|record| !record.deleted) {
            urls += 1;
            owners.insert(record.owner_id.as_str());
        }

        Ok(StatRecord {
            urls,
            users: owners.len() as u64,
        })
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create(&self, record: UrlRecord) -> Result<()> {
        let mut inner = self.inner.write();

        if inner.records.contains_key(&record.code) {
            return Err(StorageError::Conflict(record.code.to_string()));
        }

        inner.insert(record);
        Ok(())
    }

    async fn create_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        let mut inner = self.inner.write();

        // Check everything before touching the map so a failed batch leaves no trace.
        let mut batch_codes = HashSet::with_capacity(records.len());
        for record in &records {
            if inner.records.contains_key(&record.code) || !batch_codes.insert(&record.code) {
                return Err(StorageError::Conflict(record.code.to_string()));
            }
        }

        for record in records {
            inner.insert(record);
        }
        Ok(())
    }

    async fn delete_urls(&self, codes: &[ShortCode], owner_id: &str) -> Result<()> {
        let mut inner = self.inner.write();

        let targets = inner.owners.owned(owner_id, codes);
        for code in targets {
            if let Some(record) = inner.records.get_mut(&code) {
                record.deleted = true;
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn record(c: &str, url: &str, owner: &str) -> UrlRecord {
        UrlRecord::new(code(c), url, owner)
    }

    #[tokio::test]
    async fn create_and_get() {
        let repo = InMemoryRepository::new();

        repo.create(record("A1", "https://example.com", "alice"))
            .await
            .unwrap();

        let url = repo.get(&code("A1")).await.unwrap();
        assert_eq!(url, "https://example.com");
    }

    #[tokio::test]
    async fn get_nonexistent() {
        let repo = InMemoryRepository::new();

        let err = repo.get(&code("nope")).await.unwrap_err();
        assert_eq!(err, StorageError::NotFound("nope".into()));
    }

    #[tokio::test]
    async fn create_conflict_regardless_of_content() {
        let repo = InMemoryRepository::new();

        repo.create(record("A1", "https://example.com", "alice"))
            .await
            .unwrap();

        let same = repo
            .create(record("A1", "https://example.com", "alice"))
            .await
            .unwrap_err();
        let other = repo
            .create(record("A1", "https://other.com", "bob"))
            .await
            .unwrap_err();

        assert!(matches!(same, StorageError::Conflict(_)));
        assert!(matches!(other, StorageError::Conflict(_)));
        assert_eq!(repo.get(&code("A1")).await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let repo = InMemoryRepository::new();
        repo.create(record("B2", "https://taken.com", "alice"))
            .await
            .unwrap();

        let err = repo
            .create_batch(vec![
                record("A1", "https://one.com", "alice"),
                record("B2", "https://two.com", "alice"),
                record("C3", "https://three.com", "alice"),
            ])
            .await
            .unwrap_err();

        assert_eq!(err, StorageError::Conflict("B2".into()));
        assert!(matches!(
            repo.get(&code("A1")).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            repo.get(&code("C3")).await,
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn batch_rejects_duplicate_codes_within_itself() {
        let repo = InMemoryRepository::new();

        let err = repo
            .create_batch(vec![
                record("A1", "https://one.com", "alice"),
                record("A1", "https://one.com", "alice"),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Conflict(_)));
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn delete_marks_gone_not_missing() {
        let repo = InMemoryRepository::new();
        repo.create(record("A1", "https://example.com", "alice"))
            .await
            .unwrap();

        repo.delete_urls(&[code("A1")], "alice").await.unwrap();

        let err = repo.get(&code("A1")).await.unwrap_err();
        assert_eq!(err, StorageError::Gone("A1".into()));

        let raw = repo.lookup(&code("A1")).await.unwrap().unwrap();
        assert!(raw.deleted);
        assert_eq!(raw.owner_id, "alice");
    }

    #[tokio::test]
    async fn delete_by_other_owner_is_a_silent_no_op() {
        let repo = InMemoryRepository::new();
        repo.create(record("A1", "https://example.com", "alice"))
            .await
            .unwrap();

        repo.delete_urls(&[code("A1"), code("unknown")], "mallory")
            .await
            .unwrap();

        assert_eq!(repo.get(&code("A1")).await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn list_by_owner_skips_deleted_and_foreign() {
        let repo = InMemoryRepository::new();
        repo.create_batch(vec![
            record("A1", "https://one.com", "alice"),
            record("A2", "https://two.com", "alice"),
            record("B1", "https://three.com", "bob"),
        ])
        .await
        .unwrap();
        repo.delete_urls(&[code("A1")], "alice").await.unwrap();

        let listed = repo.list_by_owner("alice").await.unwrap();
        assert_eq!(listed, vec![record("A2", "https://two.com", "alice")]);
        assert!(repo.list_by_owner("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_count_live_urls_and_owners() {
        let repo = InMemoryRepository::new();
        repo.create(record("A1", "https://one.com", "alice"))
            .await
            .unwrap();
        repo.create(record("A2", "https://two.com", "alice"))
            .await
            .unwrap();
        repo.create(record("B1", "https://three.com", "bob"))
            .await
            .unwrap();

        assert_eq!(repo.stats().await.unwrap(), StatRecord { urls: 3, users: 2 });

        repo.delete_urls(&[code("B1")], "bob").await.unwrap();
        assert_eq!(repo.stats().await.unwrap(), StatRecord { urls: 2, users: 1 });
    }

    #[tokio::test]
    async fn restore_replaces_previous_owner() {
        let repo = InMemoryRepository::new();
        repo.restore(record("A1", "https://old.com", "alice"));
        repo.restore(record("A1", "https://new.com", "bob"));

        assert_eq!(repo.get(&code("A1")).await.unwrap(), "https://new.com");
        assert!(repo.list_by_owner("alice").await.unwrap().is_empty());
        assert_eq!(repo.list_by_owner("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn discard_forgets_record_and_owner() {
        let repo = InMemoryRepository::new();
        repo.create_batch(vec![
            record("A1", "https://one.com", "alice"),
            record("A2", "https://two.com", "alice"),
        ])
        .await
        .unwrap();

        repo.discard(&[code("A1"), code("ZZ")]);

        assert!(matches!(
            repo.get(&code("A1")).await,
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(
            repo.list_by_owner("alice").await.unwrap(),
            vec![record("A2", "https://two.com", "alice")]
        );
        repo.create(record("A1", "https://one.com", "alice"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_access() {
        use std::sync::Arc;

        let repo = Arc::new(InMemoryRepository::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            let handle = tokio::spawn(async move {
                let r = UrlRecord::new(
                    ShortCode::new_unchecked(format!("code-{:03}", i)),
                    format!("https://example{}.com", i),
                    format!("owner-{}", i % 2),
                );
                repo.create(r).await.unwrap();
            });
            handles.push(handle);
        }

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            let handle = tokio::spawn(async move {
                let c = ShortCode::new_unchecked(format!("code-{:03}", i));
                let _ = repo.get(&c).await;
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..10u64 {
            let c = ShortCode::new_unchecked(format!("code-{:03}", i));
            let url = repo.get(&c).await.unwrap();
            assert_eq!(url, format!("https://example{}.com", i));
        }
        assert_eq!(repo.stats().await.unwrap(), StatRecord { urls: 10, users: 2 });
    }
}
