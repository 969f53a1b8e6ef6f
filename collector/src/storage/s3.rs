use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::{Error, Result};
use std::sync::Arc;
use tracing::debug;

use super::{ListPage, ObjectStorage, ObjectSummary};

pub struct S3Storage {
    client: Arc<S3Client>,
}

impl S3Storage {
    pub fn new(client: Arc<S3Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let mut request = self.client.list_objects_v2().bucket(bucket);

        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }

        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request.send().await?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                let Some(last_modified) = object.last_modified().and_then(|ts| {
                    DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos())
                }) else {
                    debug!(key, "Skipping object without a usable last-modified time");
                    return None;
                };

                Some(ObjectSummary {
                    key: key.to_string(),
                    last_modified,
                    size: object.size().unwrap_or_default().max(0) as u64,
                })
            })
            .collect();

        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get_error(bucket, key, e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Storage(format!("s3://{}/{}: {}", bucket, key, e)))?
            .into_bytes();

        Ok(data)
    }
}

fn classify_get_error(bucket: &str, key: &str, err: SdkError<GetObjectError>) -> Error {
    let location = format!("s3://{}/{}", bucket, key);

    match &err {
        SdkError::TimeoutError(_) => Error::Timeout(location),
        SdkError::ServiceError(service) if service.err().is_no_such_key() => {
            Error::NotFound(location)
        }
        SdkError::ServiceError(service)
            if service.raw().status().as_u16() == 403
                || service.err().code() == Some("AccessDenied") =>
        {
            Error::AccessDenied(location)
        }
        SdkError::ServiceError(service) if service.raw().status().as_u16() == 404 => {
            Error::NotFound(location)
        }
        _ => Error::Storage(format!("{}: {}", location, DisplayErrorContext(&err))),
    }
}
