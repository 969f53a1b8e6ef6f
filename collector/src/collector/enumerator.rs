use chrono::{DateTime, Utc};
use common::{Error, Result};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

use super::params::CollectionParams;
use crate::storage::{ObjectStorage, ObjectSummary};

/// A metadata file selected for fetching.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateKey {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    /// Size reported by the listing.
    pub size: u64,
}

enum PageCursor {
    Start,
    Next(String),
    Done,
}

/// Lists the metadata files of one bucket/prefix/date window.
pub struct KeyEnumerator {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    prefix: String,
    suffix: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl KeyEnumerator {
    pub fn new(storage: Arc<dyn ObjectStorage>, params: &CollectionParams) -> Self {
        Self {
            storage,
            bucket: params.bucket.clone(),
            prefix: params.prefix.clone(),
            suffix: params.metadata_suffix.clone(),
            start: params.start,
            end: params.end,
        }
    }

    /// Whether a listed object is a metadata file inside the date window.
    pub fn accepts(&self, object: &ObjectSummary) -> bool {
        !object.key.ends_with('/')
            && object.key.starts_with(&self.prefix)
            && object.key.ends_with(&self.suffix)
            && object.last_modified >= self.start
            && object.last_modified <= self.end
    }

    /// Streams candidates page by page. The next page is requested only once
    /// the consumer has drained the current one. Each call starts a fresh
    /// listing. A failed page request ends the stream with
    /// [`Error::Listing`].
    pub fn candidates(&self) -> BoxStream<'_, Result<CandidateKey>> {
        let pages = stream::try_unfold(PageCursor::Start, move |cursor| async move {
            let token = match cursor {
                PageCursor::Done => return Ok::<_, Error>(None),
                PageCursor::Start => None,
                PageCursor::Next(token) => Some(token),
            };

            let page = self
                .storage
                .list_page(&self.bucket, &self.prefix, token)
                .await
                .map_err(|e| Error::Listing {
                    bucket: self.bucket.clone(),
                    prefix: self.prefix.clone(),
                    message: e.to_string(),
                })?;

            debug!(
                bucket = %self.bucket,
                prefix = %self.prefix,
                objects = page.objects.len(),
                more = page.next_token.is_some(),
                "Listed page"
            );

            let next = match page.next_token {
                Some(token) => PageCursor::Next(token),
                None => PageCursor::Done,
            };
            Ok(Some((page.objects, next)))
        });

        pages
            .map_ok(|objects| stream::iter(objects.into_iter().map(Ok::<_, Error>)))
            .try_flatten()
            .try_filter_map(move |object| {
                let candidate = self.accepts(&object).then(|| CandidateKey {
                    key: object.key,
                    last_modified: object.last_modified,
                    size: object.size,
                });
                future::ready(Ok::<_, Error>(candidate))
            })
            .boxed()
    }
}
