pub mod error;
pub mod models;

pub use error::{BoxError, StorageError};
pub use models::{Credentials, FileInfo, FileInfoReader, ObjectBody, S3OsInfo};
