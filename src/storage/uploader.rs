use super::backend::{CompletedPart, ObjectBackend, PutOptions};
use crate::types::error::StorageError;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Number of parts uploaded in parallel. Only matters for payloads larger
/// than one part.
pub const UPLOADER_CONCURRENCY: usize = 8;

/// Size of each uploaded part. Stays under 64MB so every part fits in one
/// backend segment.
pub const UPLOADER_PART_SIZE: usize = 63 * 1024 * 1024;

/// Upper bound on cleaning up a multipart upload that failed or ran out of time
const ABORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Managed upload: a single PUT for payloads smaller than one part, a
/// parallel multipart upload otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Uploader {
    concurrency: usize,
    part_size: usize,
    deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    /// Reported back in [`StorageError::Timeout`]
    timeout: Duration,
}

impl Default for Uploader {
    fn default() -> Self {
        Self::new(UPLOADER_CONCURRENCY, UPLOADER_PART_SIZE)
    }
}

impl Uploader {
    pub fn new(concurrency: usize, part_size: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            part_size: part_size.max(1),
            deadline: None,
        }
    }

    /// Fail with [`StorageError::Timeout`] once `at` passes. A multipart
    /// upload cut short this way is still aborted on the backend.
    pub fn with_deadline(mut self, at: Instant, timeout: Duration) -> Self {
        self.deadline = Some(Deadline { at, timeout });
        self
    }

    pub async fn upload<R>(
        &self,
        backend: &Arc<dyn ObjectBackend>,
        key: &str,
        mut data: R,
        options: &PutOptions,
    ) -> Result<(), StorageError>
    where
        R: AsyncRead + Unpin,
    {
        let first = self.within(self.read_part(&mut data)).await?;
        if first.len() < self.part_size {
            return self.within(backend.put_object(key, first, options)).await;
        }

        let upload_id = self
            .within(backend.create_multipart_upload(key, options))
            .await?;

        // Dropping the part uploads on expiry aborts their tasks; the
        // multipart upload itself still has to be aborted below
        let result = self
            .within(async {
                let parts = self
                    .upload_parts(backend, key, &upload_id, first, &mut data)
                    .await?;
                tracing::debug!("Uploaded {} parts for {}", parts.len(), key);
                backend
                    .complete_multipart_upload(key, &upload_id, parts)
                    .await
            })
            .await;

        if result.is_err() {
            abort(backend, key, &upload_id).await;
        }
        result
    }

    async fn within<T>(
        &self,
        operation: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.at, operation)
                .await
                .map_err(|_| StorageError::Timeout(deadline.timeout))?,
            None => operation.await,
        }
    }

    /// Read up to one part; shorter only at end of stream
    async fn read_part<R>(&self, data: &mut R) -> Result<Bytes, StorageError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::new();
        data.take(self.part_size as u64).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn upload_parts<R>(
        &self,
        backend: &Arc<dyn ObjectBackend>,
        key: &str,
        upload_id: &str,
        first: Bytes,
        data: &mut R,
    ) -> Result<Vec<CompletedPart>, StorageError>
    where
        R: AsyncRead + Unpin,
    {
        let mut tasks = JoinSet::new();
        let mut completed = Vec::new();
        let mut next = Some(first);
        let mut part_number = 0;

        loop {
            while tasks.len() < self.concurrency {
                let Some(chunk) = next.take() else {
                    break;
                };
                part_number += 1;

                let backend = Arc::clone(backend);
                let key = key.to_string();
                let upload_id = upload_id.to_string();
                tasks.spawn(async move {
                    let etag = backend
                        .upload_part(&key, &upload_id, part_number, chunk)
                        .await?;
                    Ok::<_, StorageError>(CompletedPart { part_number, etag })
                });

                let chunk = self.read_part(data).await?;
                if !chunk.is_empty() {
                    next = Some(chunk);
                }
            }

            // Dropping `tasks` on an early return aborts the remaining parts
            match tasks.join_next().await {
                Some(joined) => {
                    let part = joined.map_err(|e| {
                        StorageError::backend(format!("part upload task failed: {}", e))
                    })??;
                    completed.push(part);
                }
                None => break,
            }
        }

        completed.sort_by_key(|part| part.part_number);
        Ok(completed)
    }
}

async fn abort(backend: &Arc<dyn ObjectBackend>, key: &str, upload_id: &str) {
    match tokio::time::timeout(ABORT_TIMEOUT, backend.abort_multipart_upload(key, upload_id)).await {
        Ok(Ok(())) => tracing::debug!("Aborted multipart upload {} for {}", upload_id, key),
        Ok(Err(err)) => tracing::warn!(
            "Failed to abort multipart upload {} for {}: {}",
            upload_id,
            key,
            err
        ),
        Err(_) => tracing::warn!(
            "Timed out aborting multipart upload {} for {}",
            upload_id,
            key
        ),
    }
}
