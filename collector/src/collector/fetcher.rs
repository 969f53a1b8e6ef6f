use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::enumerator::CandidateKey;
use super::outcome::{FailureKind, FetchOutcome, RecordFailure};
use super::params::CollectionParams;
use super::record::{FieldValue, MetadataRecord};
use crate::storage::ObjectStorage;
use crate::utils::retry::{RetryPolicy, retry_with_backoff};

#[derive(Debug)]
struct FetchError {
    kind: FailureKind,
    detail: String,
}

/// Downloads and parses one metadata file per call. Never fails: every
/// problem is turned into a [`FetchOutcome::Failure`].
pub struct RecordFetcher {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    metadata_suffix: String,
    max_object_bytes: u64,
    fetch_timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl RecordFetcher {
    pub fn new(storage: Arc<dyn ObjectStorage>, params: &CollectionParams) -> Self {
        Self {
            storage,
            bucket: params.bucket.clone(),
            metadata_suffix: params.metadata_suffix.clone(),
            max_object_bytes: params.max_object_bytes,
            fetch_timeout: params.fetch_timeout,
            retry: params.retry.clone(),
        }
    }

    pub async fn fetch(&self, candidate: CandidateKey) -> FetchOutcome {
        if candidate.size > self.max_object_bytes {
            return FetchOutcome::Failure(RecordFailure::new(
                candidate.key,
                FailureKind::Oversized,
                format!(
                    "listed size {} exceeds limit of {} bytes",
                    candidate.size, self.max_object_bytes
                ),
            ));
        }

        let retried = retry_with_backoff(
            &self.retry,
            |e: &FetchError| e.kind.is_retryable(),
            || self.download(&candidate.key),
        )
        .await;

        let body = match retried.result {
            Ok(body) => body,
            Err(e) => {
                return FetchOutcome::Failure(
                    RecordFailure::new(candidate.key, e.kind, e.detail)
                        .with_attempts(retried.attempts),
                );
            }
        };

        self.parse(candidate, body, retried.attempts)
    }

    async fn download(&self, key: &str) -> Result<Bytes, FetchError> {
        let request = self.storage.get_object(&self.bucket, key);

        let response = match self.fetch_timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(response) => response,
                Err(_) => {
                    return Err(FetchError {
                        kind: FailureKind::Timeout,
                        detail: format!("no response within {:?}", limit),
                    });
                }
            },
            None => request.await,
        };

        response.map_err(|e| FetchError {
            kind: FailureKind::from_error(&e),
            detail: e.to_string(),
        })
    }

    fn parse(&self, candidate: CandidateKey, body: Bytes, attempts: u32) -> FetchOutcome {
        let bytes_read = body.len() as u64;
        let fail = |kind: FailureKind, detail: String| {
            FetchOutcome::Failure(
                RecordFailure::new(candidate.key.clone(), kind, detail)
                    .with_attempts(attempts)
                    .with_bytes_read(bytes_read),
            )
        };

        if bytes_read > self.max_object_bytes {
            return fail(
                FailureKind::Oversized,
                format!(
                    "downloaded {} bytes, limit is {}",
                    bytes_read, self.max_object_bytes
                ),
            );
        }

        let fields = match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .map(|(name, value)| (name, FieldValue::from(value)))
                .collect(),
            Ok(other) => {
                let found = FieldValue::from(other).value_type();
                return fail(
                    FailureKind::NotAnObject,
                    format!("expected a JSON object, found {}", found),
                );
            }
            Err(e) => return fail(FailureKind::MalformedJson, e.to_string()),
        };

        debug!(key = %candidate.key, bytes = bytes_read, attempts, "Parsed metadata file");

        FetchOutcome::Success(MetadataRecord::new(
            &candidate.key,
            &self.metadata_suffix,
            candidate.last_modified,
            bytes_read,
            fields,
        ))
    }
}
