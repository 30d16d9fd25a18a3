// Library exports for the CLI and integration tests
pub mod auth;
pub mod config;
pub mod driver;
pub mod session;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::DriverConfig;
pub use driver::S3Driver;
pub use session::{DEFAULT_SAVE_TIMEOUT, OsSession, S3Session};
pub use storage::{InMemoryStorage, ObjectBackend, PageInfo, S3Backend};
pub use types::{FileInfo, FileInfoReader, ObjectBody, S3OsInfo, StorageError};
