use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::config::Settings;
use common::{Error, Result};
use std::time::Duration;

use crate::analysis::MetadataFilter;
use crate::utils::retry::RetryPolicy;

pub const DEFAULT_CONCURRENCY: usize = 20;
pub const DEFAULT_METADATA_SUFFIX: &str = ".metadata.json";
pub const DEFAULT_MAX_OBJECT_BYTES: u64 = 1024 * 1024;

/// Describes one collection run.
#[derive(Debug, Clone)]
pub struct CollectionParams {
    pub bucket: String,
    /// Inclusive lower bound on last-modified.
    pub start: DateTime<Utc>,
    /// Inclusive upper bound on last-modified.
    pub end: DateTime<Utc>,
    pub prefix: String,
    pub filter: Option<MetadataFilter>,
    pub concurrency: usize,
    /// Stop enumerating after this many candidate keys.
    pub max_results: Option<usize>,
    /// Overall budget measured from the start of `collect`.
    pub deadline: Option<Duration>,
    pub metadata_suffix: String,
    pub max_object_bytes: u64,
    /// Per-attempt GET timeout.
    pub fetch_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl CollectionParams {
    pub fn new(bucket: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            bucket: bucket.into(),
            start,
            end,
            prefix: String::new(),
            filter: None,
            concurrency: DEFAULT_CONCURRENCY,
            max_results: None,
            deadline: None,
            metadata_suffix: DEFAULT_METADATA_SUFFIX.to_string(),
            max_object_bytes: DEFAULT_MAX_OBJECT_BYTES,
            fetch_timeout: None,
            retry: RetryPolicy::none(),
        }
    }

    /// The `hours` leading up to `now`.
    pub fn trailing_window(bucket: impl Into<String>, now: DateTime<Utc>, hours: i64) -> Self {
        Self::new(bucket, now - ChronoDuration::hours(hours), now)
    }

    pub fn from_settings(settings: &Settings, now: DateTime<Utc>) -> Self {
        let collection = &settings.collection;
        let filter = MetadataFilter::from(&collection.filters);

        let mut params = Self::trailing_window(&settings.storage.bucket, now, collection.lookback_hours)
            .with_prefix(&collection.prefix)
            .with_concurrency(collection.concurrency)
            .with_metadata_suffix(&collection.metadata_suffix)
            .with_max_object_bytes(collection.max_object_bytes)
            .with_retry(
                RetryPolicy::new(collection.max_retries, collection.retry_base_delay_ms)
                    .with_max_delay_ms(collection.retry_max_delay_ms),
            );

        if !filter.is_empty() {
            params = params.with_filter(filter);
        }
        params.max_results = collection.max_results;
        params.fetch_timeout = collection.fetch_timeout_secs.map(Duration::from_secs);
        params.deadline = collection.deadline_secs.map(Duration::from_secs);
        params
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_metadata_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.metadata_suffix = suffix.into();
        self
    }

    pub fn with_max_object_bytes(mut self, max_object_bytes: u64) -> Self {
        self.max_object_bytes = max_object_bytes;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(Error::InvalidParams("bucket must not be empty".into()));
        }
        if self.start > self.end {
            return Err(Error::InvalidParams(format!(
                "start {} is after end {}",
                self.start.to_rfc3339(),
                self.end.to_rfc3339()
            )));
        }
        if self.concurrency == 0 {
            return Err(Error::InvalidParams(
                "concurrency limit must be at least 1".into(),
            ));
        }
        if self.metadata_suffix.is_empty() {
            return Err(Error::InvalidParams("metadata suffix must not be empty".into()));
        }
        Ok(())
    }
}
