use crate::file::FileRepository;
use crate::memory::InMemoryRepository;
use crate::sqlite::{SqliteRepository, SqliteSettings};
use snip_core::error::Result;
use snip_core::repository::Repository;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Which storage backend to run on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local map. State is lost on exit.
    #[default]
    InMemory,
    /// Process-local map replayed from and appended to a JSON lines log.
    File { path: PathBuf },
    /// A SQLite database.
    Sqlite(SqliteSettings),
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::InMemory => write!(f, "in-memory"),
            StorageBackend::File { path } => write!(f, "file ({})", path.display()),
            StorageBackend::Sqlite(_) => write!(f, "sqlite"),
        }
    }
}

/// Opens the repository selected by `backend`.
///
/// The returned repository owns its file handle or connection pool
/// exclusively; open one repository per backend instance.
pub async fn open(backend: &StorageBackend) -> Result<Arc<dyn Repository>> {
    let repository: Arc<dyn Repository> = match backend {
        StorageBackend::InMemory => Arc::new(InMemoryRepository::new()),
        StorageBackend::File { path } => Arc::new(FileRepository::open(path).await?),
        StorageBackend::Sqlite(settings) => Arc::new(SqliteRepository::connect(settings).await?),
    };

    info!(backend = %backend, "storage backend ready");
    Ok(repository)
}
