use clap::Parser;
use snip_storage::StoreConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const SERVER_ADDRESS_ENV: &str = "SERVER_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const OPERATION_TIMEOUT_ENV: &str = "OPERATION_TIMEOUT_MS";
pub const NO_FSYNC_ENV: &str = "NO_FSYNC";
pub const SECRET_KEY_ENV: &str = "SECRET_KEY";

pub const DEFAULT_RUN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Parser)]
#[command(name = "snip", about = "URL shortener")]
pub struct CLI {
    /// Address the HTTP server listens on.
    #[arg(short = 'a', long, env = SERVER_ADDRESS_ENV, default_value = DEFAULT_RUN_ADDR)]
    pub run_addr: String,

    /// Prefix of every issued short URL.
    #[arg(short = 'b', long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(short = 'l', long, env = LOG_LEVEL_ENV, default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// PostgreSQL connection string. Selects the database backend.
    #[arg(short = 'd', long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// Journal file for the in-memory backend.
    #[arg(short = 'f', long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// Deadline for each storage operation, in milliseconds.
    #[arg(long, env = OPERATION_TIMEOUT_ENV)]
    pub operation_timeout_ms: Option<u64>,

    /// Skip syncing the journal to disk after each write.
    #[arg(long, env = NO_FSYNC_ENV)]
    pub no_fsync: bool,

    /// 32-byte key, hex or base64, sealing the identity cookie.
    #[arg(long, env = SECRET_KEY_ENV, hide_env_values = true)]
    pub secret_key: Option<String>,
}

impl CLI {
    /// Short URLs are `{base_url}/{code}`, so a trailing slash is dropped.
    pub fn public_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            database_dsn: self.database_dsn.clone().filter(|dsn| !dsn.is_empty()),
            file_storage_path: self
                .file_storage_path
                .clone()
                .filter(|path| !path.as_os_str().is_empty()),
            operation_timeout: self
                .operation_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            fsync: !self.no_fsync,
        }
    }
}
