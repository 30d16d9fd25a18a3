mod backend;
mod in_memory;
mod page;
mod s3;
mod sniff;
mod uploader;

pub use backend::{
    CompletedPart, GetObjectOutput, ListObjectsOutput, ListQuery, ObjectBackend, PutOptions,
};
pub use in_memory::InMemoryStorage;
pub use page::PageInfo;
pub use s3::S3Backend;
pub use sniff::{Peeked, SNIFF_LEN, detect_content_type, peek_content_type, type_by_extension};
pub use uploader::{UPLOADER_CONCURRENCY, UPLOADER_PART_SIZE, Uploader};
