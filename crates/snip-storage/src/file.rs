use crate::error::map_io_error;
use crate::memory::InMemoryRepository;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snip_core::error::{Result, StorageError};
use snip_core::repository::{ReadRepository, Repository, StatRecord, UrlRecord};
use snip_core::shortcode::ShortCode;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// One line of the URL log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LogEntry {
    #[serde(rename = "shortURL")]
    short_url: String,
    #[serde(rename = "longURL")]
    long_url: String,
    // Entries written before ownership existed carry no owner.
    #[serde(rename = "userID", default)]
    user_id: String,
}

/// Older releases appended a whole batch as a single JSON array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LogLine {
    Single(LogEntry),
    Batch(Vec<LogEntry>),
}

impl From<&UrlRecord> for LogEntry {
    fn from(record: &UrlRecord) -> Self {
        Self {
            short_url: record.code.to_string(),
            long_url: record.original_url.clone(),
            user_id: record.owner_id.clone(),
        }
    }
}

impl From<LogEntry> for UrlRecord {
    fn from(entry: LogEntry) -> Self {
        UrlRecord::new(
            ShortCode::new_unchecked(entry.short_url),
            entry.long_url,
            entry.user_id,
        )
    }
}

/// Summary of a log replay.
#[derive(Debug, Default)]
struct Replay {
    restored: usize,
    skipped: usize,
    /// The file ends in a partial line that the next append must not extend.
    unterminated: bool,
}

/// Write side of the log.
#[derive(Debug)]
enum LogState {
    Open(BufWriter<File>),
    /// An append failed. Whatever is still buffered must never reach the file.
    Failed(String),
    Closed,
}

impl LogState {
    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        match self {
            LogState::Open(writer) => Ok(writer),
            LogState::Failed(reason) => Err(StorageError::Unavailable(reason.clone())),
            LogState::Closed => Err(StorageError::Closed),
        }
    }
}

/// A repository backed by an append-only JSON lines log.
///
/// All reads are served by an [`InMemoryRepository`] rebuilt from the log
/// on [`FileRepository::open`]. A create holds the log lock while it goes
/// to memory and is appended, one line per record, and flushed. If the
/// append fails the records are taken back out of memory and the log
/// refuses every later write with `Unavailable`.
///
/// Soft deletes only touch memory. A restart brings deleted codes back.
#[derive(Debug)]
pub struct FileRepository {
    index: InMemoryRepository,
    path: PathBuf,
    log: Mutex<LogState>,
}

impl FileRepository {
    /// Opens the log at `path`, creating it if missing, and replays it.
    ///
    /// Malformed lines are logged and skipped; they never fail the open.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| map_io_error(&path, e))?;

        let index = InMemoryRepository::new();
        let replay = replay(&path, &index).await?;
        info!(
            path = %path.display(),
            restored = replay.restored,
            skipped = replay.skipped,
            "replayed url log"
        );

        let mut writer = BufWriter::new(file);
        if replay.unterminated {
            writer
                .write_all(b"\n")
                .await
                .map_err(|e| map_io_error(&path, e))?;
            writer.flush().await.map_err(|e| map_io_error(&path, e))?;
        }

        Ok(Self {
            index,
            path,
            log: Mutex::new(LogState::Open(writer)),
        })
    }

    /// Stores `records` in memory and appends them to the log as one unit.
    async fn create_logged(&self, records: Vec<UrlRecord>) -> Result<()> {
        let mut buf = Vec::new();
        for record in &records {
            serde_json::to_writer(&mut buf, &LogEntry::from(record))
                .map_err(|e| StorageError::InvalidData(e.to_string()))?;
            buf.push(b'\n');
        }
        let codes: Vec<ShortCode> = records.iter().map(|record| record.code.clone()).collect();

        let mut log = self.log.lock().await;
        let writer = log.writer()?;
        self.index.create_batch(records).await?;

        if let Err(err) = append(writer, &buf).await {
            let err = map_io_error(&self.path, err);
            self.index.discard(&codes);
            error!(path = %self.path.display(), error = %err, "url log append failed");
            *log = LogState::Failed(format!("url log disabled after failed append: {err}"));
            return Err(err);
        }

        debug!(path = %self.path.display(), entries = codes.len(), "appended to url log");
        Ok(())
    }
}

async fn append(writer: &mut BufWriter<File>, buf: &[u8]) -> std::io::Result<()> {
    writer.write_all(buf).await?;
    writer.flush().await
}

async fn replay(path: &Path, index: &InMemoryRepository) -> Result<Replay> {
    let file = File::open(path).await.map_err(|e| map_io_error(path, e))?;
    let mut reader = BufReader::new(file);
    let mut summary = Replay::default();
    let mut line = Vec::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| map_io_error(path, e))?;
        if read == 0 {
            break;
        }
        line_no += 1;
        summary.unterminated = line.last() != Some(&b'\n');

        let entry = line.trim_ascii();
        if entry.is_empty() {
            continue;
        }

        match serde_json::from_slice::<LogLine>(entry) {
            Ok(LogLine::Single(entry)) => {
                index.restore(entry.into());
                summary.restored += 1;
            }
            Ok(LogLine::Batch(entries)) => {
                for entry in entries {
                    index.restore(entry.into());
                    summary.restored += 1;
                }
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    line = line_no,
                    error = %err,
                    "skipping malformed url log entry"
                );
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

#[async_trait]
impl ReadRepository for FileRepository {
    async fn get(&self, code: &ShortCode) -> Result<String> {
        self.index.get(code).await
    }

    async fn lookup(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        self.index.lookup(code).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<UrlRecord>> {
        self.index.list_by_owner(owner_id).await
    }

    async fn stats(&self) -> Result<StatRecord> {
        self.index.stats().await
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn create(&self, record: UrlRecord) -> Result<()> {
        self.create_logged(vec![record]).await
    }

    async fn create_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        self.create_logged(records).await
    }

    async fn delete_urls(&self, codes: &[ShortCode], owner_id: &str) -> Result<()> {
        // TODO: append tombstones so deletes survive a restart.
        self.index.delete_urls(codes, owner_id).await
    }

    async fn ping(&self) -> Result<()> {
        self.log.lock().await.writer().map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        let mut log = self.log.lock().await;

        match std::mem::replace(&mut *log, LogState::Closed) {
            LogState::Open(mut writer) => {
                writer
                    .flush()
                    .await
                    .map_err(|e| map_io_error(&self.path, e))?;
                writer
                    .into_inner()
                    .sync_all()
                    .await
                    .map_err(|e| map_io_error(&self.path, e))?;
                info!(path = %self.path.display(), "closed url log");
                Ok(())
            }
            // Buffered lines of the failed append are dropped unwritten.
            LogState::Failed(reason) => {
                warn!(path = %self.path.display(), reason = %reason, "closed failed url log");
                Ok(())
            }
            LogState::Closed => Err(StorageError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_uses_log_field_names() {
        let record = UrlRecord::new(
            ShortCode::new_unchecked("9718264F"),
            "https://testurl.com/blablabla",
            "alice",
        );

        let json = serde_json::to_string(&LogEntry::from(&record)).unwrap();
        assert_eq!(
            json,
            r#"{"shortURL":"9718264F","longURL":"https://testurl.com/blablabla","userID":"alice"}"#
        );
    }

    #[test]
    fn entry_without_owner_defaults_to_empty() {
        let line: LogLine =
            serde_json::from_str(r#"{"shortURL":"D292748E","longURL":"https://go.dev"}"#).unwrap();

        let LogLine::Single(entry) = line else {
            panic!("expected a single entry");
        };
        assert_eq!(entry.user_id, "");
    }

    #[test]
    fn array_line_is_a_batch() {
        let line: LogLine = serde_json::from_str(
            r#"[{"shortURL":"A","longURL":"https://a.com","userID":"u"},{"shortURL":"B","longURL":"https://b.com","userID":"u"}]"#,
        )
        .unwrap();

        assert!(matches!(line, LogLine::Batch(entries) if entries.len() == 2));
    }

    /// A repository whose log handle rejects every write.
    async fn read_only_log(dir: &tempfile::TempDir) -> FileRepository {
        let path = dir.path().join("urls.json");
        std::fs::write(&path, "").unwrap();
        let file = File::open(&path).await.unwrap();

        FileRepository {
            index: InMemoryRepository::new(),
            path,
            log: Mutex::new(LogState::Open(BufWriter::new(file))),
        }
    }

    #[tokio::test]
    async fn failed_append_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let repo = read_only_log(&dir).await;
        let record = UrlRecord::new(ShortCode::new_unchecked("A1"), "https://one.com", "alice");

        let err = repo.create(record.clone()).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)), "{err:?}");

        assert!(matches!(
            repo.get(&record.code).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(repo.list_by_owner("alice").await.unwrap().is_empty());
        assert_eq!(repo.stats().await.unwrap(), StatRecord::default());

        // The log is unusable from now on; a retry must not look like a conflict.
        assert!(matches!(
            repo.create(record).await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(matches!(repo.ping().await, Err(StorageError::Unavailable(_))));
        repo.close().await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("urls.json")).unwrap(), "");
    }

    #[tokio::test]
    async fn failed_batch_append_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let repo = read_only_log(&dir).await;

        let err = repo
            .create_batch(vec![
                UrlRecord::new(ShortCode::new_unchecked("A1"), "https://one.com", "alice"),
                UrlRecord::new(ShortCode::new_unchecked("A2"), "https://two.com", "alice"),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Io(_)), "{err:?}");
        assert!(repo.lookup(&ShortCode::new_unchecked("A1")).await.unwrap().is_none());
        assert!(repo.lookup(&ShortCode::new_unchecked("A2")).await.unwrap().is_none());
    }
}
