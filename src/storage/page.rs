use super::backend::{ListQuery, ObjectBackend};
use crate::types::{FileInfo, error::StorageError};
use std::sync::Arc;

/// One page of a bucket listing.
///
/// A page is immutable once fetched. [`PageInfo::next_page`] issues a new
/// ListObjects call seeded with this page's query and continuation marker
/// and returns a brand new page.
pub struct PageInfo {
    files: Vec<FileInfo>,
    directories: Vec<String>,
    next_marker: String,
    query: ListQuery,
    backend: Arc<dyn ObjectBackend>,
}

impl std::fmt::Debug for PageInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageInfo")
            .field("files", &self.files)
            .field("directories", &self.directories)
            .field("next_marker", &self.next_marker)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

impl PageInfo {
    /// Fetch the page described by `query`
    pub async fn fetch(
        backend: Arc<dyn ObjectBackend>,
        query: ListQuery,
    ) -> Result<Self, StorageError> {
        let output = backend.list_objects(&query).await?;

        // Explicit marker first; truncated listings without one continue
        // from the last returned key
        let next_marker = match output.next_marker {
            Some(marker) if !marker.is_empty() => marker,
            _ if output.is_truncated => output
                .objects
                .last()
                .map(|obj| obj.name.clone())
                .unwrap_or_default(),
            _ => String::new(),
        };

        tracing::debug!(
            "Listed {} files and {} directories (next marker: {:?})",
            output.objects.len(),
            output.common_prefixes.len(),
            next_marker
        );

        Ok(Self {
            files: output.objects,
            directories: output.common_prefixes,
            next_marker,
            query,
            backend,
        })
    }

    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    /// Virtual directories (common prefixes) on this page
    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    /// Continuation marker, empty on the last page
    pub fn next_marker(&self) -> &str {
        &self.next_marker
    }

    pub fn has_next_page(&self) -> bool {
        !self.next_marker.is_empty()
    }

    /// Fetch the following page, or fail with [`StorageError::NoNextPage`]
    /// without touching the backend when this is the last one.
    pub async fn next_page(&self) -> Result<PageInfo, StorageError> {
        if !self.has_next_page() {
            return Err(StorageError::NoNextPage);
        }

        let query = ListQuery {
            marker: Some(self.next_marker.clone()),
            ..self.query.clone()
        };
        PageInfo::fetch(Arc::clone(&self.backend), query).await
    }

    /// Consume the page, keeping only its entries
    pub fn into_parts(self) -> (Vec<FileInfo>, Vec<String>) {
        (self.files, self.directories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::{ListObjectsOutput, PutOptions};
    use crate::storage::in_memory::InMemoryStorage;
    use bytes::Bytes;

    /// Backend replaying canned listings
    struct Scripted(ListObjectsOutput);

    #[async_trait::async_trait]
    impl ObjectBackend for Scripted {
        async fn list_objects(&self, _: &ListQuery) -> Result<ListObjectsOutput, StorageError> {
            Ok(self.0.clone())
        }
        async fn get_object(
            &self,
            _: &str,
        ) -> Result<crate::storage::backend::GetObjectOutput, StorageError> {
            Err(StorageError::NotImplemented)
        }
        async fn put_object(&self, _: &str, _: Bytes, _: &PutOptions) -> Result<(), StorageError> {
            Err(StorageError::NotImplemented)
        }
        async fn create_multipart_upload(
            &self,
            _: &str,
            _: &PutOptions,
        ) -> Result<String, StorageError> {
            Err(StorageError::NotImplemented)
        }
        async fn upload_part(
            &self,
            _: &str,
            _: &str,
            _: i32,
            _: Bytes,
        ) -> Result<String, StorageError> {
            Err(StorageError::NotImplemented)
        }
        async fn complete_multipart_upload(
            &self,
            _: &str,
            _: &str,
            _: Vec<crate::storage::backend::CompletedPart>,
        ) -> Result<(), StorageError> {
            Err(StorageError::NotImplemented)
        }
        async fn abort_multipart_upload(&self, _: &str, _: &str) -> Result<(), StorageError> {
            Err(StorageError::NotImplemented)
        }
    }

    fn file(name: &str) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            etag: "\"etag\"".to_string(),
            last_modified: chrono::Utc::now(),
            size: 1,
        }
    }

    async fn filled(n: usize) -> Arc<InMemoryStorage> {
        let storage = Arc::new(InMemoryStorage::new());
        for i in 0..n {
            storage
                .put_object(
                    &format!("obj-{:03}", i),
                    Bytes::from("x"),
                    &PutOptions::default(),
                )
                .await
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_explicit_marker_preferred() {
        let backend = Arc::new(Scripted(ListObjectsOutput {
            objects: vec![file("a"), file("b")],
            common_prefixes: vec![],
            is_truncated: true,
            next_marker: Some("explicit".to_string()),
        }));
        let page = PageInfo::fetch(backend, ListQuery::default()).await.unwrap();
        assert_eq!(page.next_marker(), "explicit");
    }

    #[tokio::test]
    async fn test_last_key_fallback_when_truncated() {
        let backend = Arc::new(Scripted(ListObjectsOutput {
            objects: vec![file("a"), file("b")],
            common_prefixes: vec![],
            is_truncated: true,
            next_marker: None,
        }));
        let page = PageInfo::fetch(backend, ListQuery::default()).await.unwrap();
        assert_eq!(page.next_marker(), "b");
        assert!(page.has_next_page());
    }

    #[tokio::test]
    async fn test_truncated_without_objects_is_exhausted() {
        let backend = Arc::new(Scripted(ListObjectsOutput {
            objects: vec![],
            common_prefixes: vec!["dir/".to_string()],
            is_truncated: true,
            next_marker: None,
        }));
        let page = PageInfo::fetch(backend, ListQuery::default()).await.unwrap();
        assert!(!page.has_next_page());
        assert_eq!(page.directories(), ["dir/".to_string()]);
    }

    #[tokio::test]
    async fn test_pages_cover_listing() {
        for (n, p) in [(10, 3), (9, 3), (1, 5), (0, 4)] {
            let storage = filled(n).await;
            let query = ListQuery {
                max_keys: Some(p),
                ..Default::default()
            };

            let mut page = PageInfo::fetch(storage.clone(), query).await.unwrap();
            let mut pages = 1;
            let mut names: Vec<String> = page.files().iter().map(|f| f.name.clone()).collect();
            while page.has_next_page() {
                page = page.next_page().await.unwrap();
                pages += 1;
                names.extend(page.files().iter().map(|f| f.name.clone()));
            }

            let expected_pages = n.div_ceil(p as usize).max(1);
            assert_eq!(pages, expected_pages, "n={} p={}", n, p);
            assert_eq!(names.len(), n);
            assert!(names.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[tokio::test]
    async fn test_next_page_after_exhaustion() {
        let storage = filled(2).await;
        let page = PageInfo::fetch(storage.clone(), ListQuery::default())
            .await
            .unwrap();
        assert!(!page.has_next_page());
        assert_eq!(storage.list_calls(), 1);

        assert!(matches!(
            page.next_page().await,
            Err(StorageError::NoNextPage)
        ));
        assert_eq!(storage.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_pages_do_not_alias() {
        let storage = filled(4).await;
        let query = ListQuery {
            max_keys: Some(2),
            ..Default::default()
        };
        let first = PageInfo::fetch(storage.clone(), query).await.unwrap();
        let second = first.next_page().await.unwrap();

        assert_eq!(first.files()[0].name, "obj-000");
        assert_eq!(second.files()[0].name, "obj-002");
        assert_eq!(first.files().len(), 2);
        assert_eq!(second.files().len(), 2);
        // Re-fetching from the first page yields the same second page
        let again = first.next_page().await.unwrap();
        assert_eq!(again.files(), second.files());
    }
}
