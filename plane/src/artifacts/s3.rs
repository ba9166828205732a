//! S3 artifact repository

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use tracing::{debug, warn};

use crate::errors::PlatformError;

use super::ArtifactRepository;

/// DeleteObjects accepts at most this many keys per call
const DELETE_BATCH: usize = 1000;

#[derive(Clone)]
pub struct S3Artifacts {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl std::fmt::Debug for S3Artifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Artifacts")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl S3Artifacts {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

fn s3_error(op: &str, err: impl std::error::Error) -> PlatformError {
    PlatformError::Unavailable(format!("s3 {} failed: {}", op, DisplayErrorContext(err)))
}

#[async_trait]
impl ArtifactRepository for S3Artifacts {
    async fn exists(&self, key: &str) -> Result<bool, PlatformError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(s3_error("head_object", e))
                }
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PlatformError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let out = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| s3_error("list_objects_v2", e))?;

            keys.extend(
                out.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );

            match out.next_continuation_token() {
                Some(token) if out.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(prefix, count = keys.len(), "Listed artifacts");
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), PlatformError> {
        for chunk in keys.chunks(DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|k| ObjectIdentifier::builder().key(k).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PlatformError::Internal(e.to_string()))?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| PlatformError::Internal(e.to_string()))?;

            let out = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| s3_error("delete_objects", e))?;

            let errors = out.errors();
            if !errors.is_empty() {
                for err in errors {
                    warn!(key = ?err.key(), code = ?err.code(), "Failed to delete artifact");
                }
                return Err(PlatformError::Unavailable(format!(
                    "{} artifacts could not be deleted",
                    errors.len()
                )));
            }
        }

        Ok(())
    }
}
