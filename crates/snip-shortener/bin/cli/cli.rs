use clap::{Parser, Subcommand, ValueEnum};
use snip_storage::{SqliteSettings, StorageBackend};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const STORAGE_BACKEND_ENV: &str = "SNIP_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "SNIP_FILE_STORAGE_PATH";
pub const DATABASE_URL_ENV: &str = "SNIP_DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS_ENV: &str = "SNIP_DATABASE_MAX_CONNECTIONS";
pub const BASE_URL_ENV: &str = "SNIP_BASE_URL";
pub const OWNER_ENV: &str = "SNIP_OWNER";
pub const LOG_LEVEL_ENV: &str = "SNIP_LOG_LEVEL";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "file")]
    File,
    #[value(name = "sqlite")]
    Sqlite,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Shorten, resolve and manage URLs")]
pub struct CLI {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = FILE_STORAGE_PATH_ENV, required_if_eq("storage", "file"))]
    pub file_storage_path: Option<PathBuf>,

    #[arg(long, env = DATABASE_URL_ENV, required_if_eq("storage", "sqlite"))]
    pub database_url: Option<String>,

    #[arg(
        long,
        env = DATABASE_MAX_CONNECTIONS_ENV,
        default_value_t = DEFAULT_DATABASE_MAX_CONNECTIONS
    )]
    pub database_max_connections: u32,

    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, env = LOG_LEVEL_ENV, default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten a single URL.
    Shorten {
        url: String,
        #[arg(long, env = OWNER_ENV, default_value = "")]
        owner: String,
    },
    /// Shorten several URLs; either all are stored or none.
    Batch {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long, env = OWNER_ENV, default_value = "")]
        owner: String,
    },
    /// Print the original URL behind a short code.
    Resolve { code: String },
    /// List the live URLs created by an owner.
    List {
        #[arg(long, env = OWNER_ENV)]
        owner: String,
    },
    /// Soft-delete short codes created by an owner.
    Delete {
        #[arg(required = true)]
        codes: Vec<String>,
        #[arg(long, env = OWNER_ENV)]
        owner: String,
    },
    /// Print the number of live URLs and owners.
    Stats,
    /// Check that the storage backend is reachable.
    Ping,
}

impl CLI {
    /// Builds the storage selection from the parsed flags.
    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        let backend = match self.storage {
            StorageBackendArg::InMemory => StorageBackend::InMemory,
            StorageBackendArg::File => {
                let path = self.file_storage_path.clone().ok_or_else(|| {
                    anyhow::anyhow!("file storage path is required when storage backend is file")
                })?;
                StorageBackend::File { path }
            }
            StorageBackendArg::Sqlite => {
                let database_url = self.database_url.clone().ok_or_else(|| {
                    anyhow::anyhow!("database url is required when storage backend is sqlite")
                })?;
                StorageBackend::Sqlite(
                    SqliteSettings::builder()
                        .database_url(database_url)
                        .max_connections(self.database_max_connections)
                        .build(),
                )
            }
        };
        Ok(backend)
    }
}
