//! Object storage collaborator: `get(key) -> bytes` and `put(key, bytes, content_type)`,
//! plus `delete` for uploads that turn out to duplicate a stored document.
//!
//! `S3ObjectStore` talks to MinIO locally and AWS in production. `MemoryObjectStore`
//! backs tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("S3 error: {0}")]
    S3(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError>;
    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Key under which an uploaded resume is stored.
pub fn resume_key(session_id: Uuid, document_id: Uuid, filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("resumes/{session_id}/{document_id}/{safe}")
}

/// Hex SHA-256 of an upload. Two uploads with the same hash are the same file.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Stand-in resume body used when a stored object cannot be read. It keeps the
/// candidate in the run (scored on low-information text) instead of aborting it.
pub fn synthetic_resume_text(filename: &str) -> String {
    format!(
        "Resume file: {filename}\n\
         The original document could not be retrieved from storage.\n\
         No skills, experience or projects are available for this candidate.\n\
         Scores for this candidate reflect missing content, not the candidate's profile."
    )
}

// ────────────────────────────────────────────────────────────────────────────
// S3
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::S3(format!("get {key} failed: {service_error}"))
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(format!("reading {key} failed: {e}")))?;
        Ok(body.into_bytes())
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError> {
        let len = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("S3 upload failed: {e}")))?;

        info!("Uploaded {} bytes to s3://{}/{}", len, self.bucket, key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("S3 delete of {key} failed: {e}")))?;

        info!("Deleted s3://{}/{}", self.bucket, key);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, (Bytes, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn object_count(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip_and_missing_key() {
        let store = MemoryObjectStore::new();
        store
            .put("a/b.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();
        assert_eq!(store.get("a/b.txt").await.unwrap(), Bytes::from_static(b"hello"));
        assert!(matches!(
            store.get("missing").await,
            Err(StorageError::NotFound(_))
        ));

        store.delete("a/b.txt").await.unwrap();
        store.delete("a/b.txt").await.unwrap();
        assert_eq!(store.object_count(), 0);
    }

    #[test]
    fn test_resume_key_sanitises_filename() {
        let session = Uuid::nil();
        let key = resume_key(session, session, "Jane Doe (final).pdf");
        assert!(key.ends_with("/Jane_Doe__final_.pdf"));
        assert!(key.starts_with("resumes/"));
    }

    #[test]
    fn test_content_hash_identifies_identical_uploads() {
        let a = content_hash(b"%PDF-1.4 resume");
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash(b"%PDF-1.4 resume"));
        assert_ne!(a, content_hash(b"%PDF-1.4 resume v2"));
    }

    #[test]
    fn test_synthetic_text_names_the_file() {
        let text = synthetic_resume_text("cv.pdf");
        assert!(text.contains("cv.pdf"));
        assert!(!text.trim().is_empty());
    }
}
