use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use super::outcome::{FailureKind, FetchOutcome, RecordFailure};
use super::params::CollectionParams;
use super::record::MetadataRecord;
use crate::analysis::{AggregationConfig, AggregationResult, Aggregator, MetadataFilter, SchemaProfile};

/// Everything one run produced. Built once by the collector, read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct CollectionResult {
    run_id: Uuid,
    bucket: String,
    prefix: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    filter: Option<MetadataFilter>,
    total_scanned: usize,
    records: Vec<MetadataRecord>,
    failures: Vec<RecordFailure>,
    elapsed: Duration,
    bytes_transferred: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub run_id: Uuid,
    pub bucket: String,
    pub prefix: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_scanned: usize,
    pub total_collected: usize,
    pub total_failed: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
    pub execution_time_seconds: f64,
    pub data_transfer_bytes: u64,
    pub data_transfer_mb: f64,
}

impl CollectionResult {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start, self.end)
    }

    /// Filter requested with the run, applied by [`CollectionResult::aggregate`].
    pub fn filter(&self) -> Option<&MetadataFilter> {
        self.filter.as_ref()
    }

    /// Candidate keys that produced an outcome, successful or not. Keys cut
    /// off by `max_results`, or not yet started when the deadline hit, are
    /// not counted.
    pub fn total_scanned(&self) -> usize {
        self.total_scanned
    }

    pub fn total_collected(&self) -> usize {
        self.records.len()
    }

    /// Sorted by metadata key.
    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    /// Sorted by key.
    pub fn failures(&self) -> &[RecordFailure] {
        &self.failures
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn discover_schema(&self, sample_size: usize) -> SchemaProfile {
        SchemaProfile::from_records(&self.records, sample_size)
    }

    /// Aggregates using the filter the run was requested with.
    pub fn aggregate(&self, config: &AggregationConfig) -> AggregationResult {
        Aggregator::new(config.clone()).aggregate(self, self.filter())
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            run_id: self.run_id,
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            start: self.start,
            end: self.end,
            total_scanned: self.total_scanned,
            total_collected: self.total_collected(),
            total_failed: self.failures.len(),
            failures_by_kind: self.failures_by_kind(),
            execution_time_seconds: self.elapsed.as_secs_f64(),
            data_transfer_bytes: self.bytes_transferred,
            data_transfer_mb: (self.bytes_transferred as f64 / 1024.0 / 1024.0 * 100.0).round()
                / 100.0,
        }
    }
}

/// Fan-in reducer. The only place outcomes are counted.
pub(crate) struct CollectionBuilder {
    result: CollectionResult,
}

impl CollectionBuilder {
    pub(crate) fn new(params: &CollectionParams) -> Self {
        Self {
            result: CollectionResult {
                run_id: Uuid::new_v4(),
                bucket: params.bucket.clone(),
                prefix: params.prefix.clone(),
                start: params.start,
                end: params.end,
                filter: params.filter.clone(),
                total_scanned: 0,
                records: Vec::new(),
                failures: Vec::new(),
                elapsed: Duration::ZERO,
                bytes_transferred: 0,
            },
        }
    }

    pub(crate) fn run_id(&self) -> Uuid {
        self.result.run_id
    }

    pub(crate) fn record(&mut self, outcome: FetchOutcome) {
        self.result.total_scanned += 1;
        self.result.bytes_transferred += outcome.bytes();

        match outcome {
            FetchOutcome::Success(record) => self.result.records.push(record),
            FetchOutcome::Failure(failure) => {
                warn!(
                    key = %failure.key,
                    kind = %failure.kind,
                    attempts = failure.attempts,
                    detail = %failure.detail,
                    "Skipping metadata file"
                );
                self.result.failures.push(failure);
            }
        }
    }

    pub(crate) fn finish(mut self, elapsed: Duration) -> CollectionResult {
        self.result
            .records
            .sort_by(|a, b| a.metadata_key.cmp(&b.metadata_key));
        self.result.failures.sort_by(|a, b| a.key.cmp(&b.key));
        self.result.elapsed = elapsed;
        self.result
    }
}
