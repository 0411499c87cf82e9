use crate::error::{Result, ShortenerError};
use snip_core::{Repository, ShortCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Applies soft deletes in the background.
///
/// [`schedule`](AsyncDeleter::schedule) hands the delete to a spawned task
/// and returns at once, so a caller may still read a code it just deleted.
/// [`drain`](AsyncDeleter::drain) stops intake and waits until every
/// accepted delete has been applied or has failed.
#[derive(Debug)]
pub struct AsyncDeleter<R: ?Sized> {
    repository: Arc<R>,
    tracker: TaskTracker,
    closed: AtomicBool,
}

impl<R: Repository + ?Sized> AsyncDeleter<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            tracker: TaskTracker::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Accepts a delete request for background processing.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`ShortenerError::Closed`] once draining has started.
    pub fn schedule(&self, codes: Vec<ShortCode>, owner_id: String) -> Result<()> {
        // Register with the tracker before checking the flag so draining
        // cannot miss a request that got past the check.
        let token = self.tracker.token();
        if self.closed.load(Ordering::SeqCst) {
            return Err(ShortenerError::Closed);
        }

        let repository = Arc::clone(&self.repository);
        tokio::spawn(async move {
            let _token = token;
            match repository.delete_urls(&codes, &owner_id).await {
                Ok(()) => debug!(owner = %owner_id, requested = codes.len(), "applied delete"),
                Err(err) => warn!(
                    owner = %owner_id,
                    requested = codes.len(),
                    error = %err,
                    "background delete failed"
                ),
            }
        });

        Ok(())
    }

    /// Number of accepted deletes that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops accepting deletes and waits for the accepted ones.
    ///
    /// Only the first call waits; later calls fail with
    /// [`ShortenerError::Closed`].
    pub async fn drain(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ShortenerError::Closed);
        }

        self.tracker.close();
        debug!(pending = self.tracker.len(), "draining background deletes");
        self.tracker.wait().await;
        Ok(())
    }
}
