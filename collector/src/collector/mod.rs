mod enumerator;
mod fetcher;
mod outcome;
mod params;
mod record;
mod result;

pub use enumerator::{CandidateKey, KeyEnumerator};
pub use fetcher::RecordFetcher;
pub use outcome::{FailureKind, FetchOutcome, RecordFailure};
pub use params::{
    CollectionParams, DEFAULT_CONCURRENCY, DEFAULT_MAX_OBJECT_BYTES, DEFAULT_METADATA_SUFFIX,
};
pub use record::{FieldValue, MetadataRecord, ValueType, file_extension};
pub use result::{CollectionResult, CollectionSummary};

use common::{Error, Result};
use futures::future::{self, Either};
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

use crate::storage::ObjectStorage;
use result::CollectionBuilder;

/// Runs the list → fetch → reduce pipeline against one object store.
pub struct MetadataCollector {
    storage: Arc<dyn ObjectStorage>,
}

impl MetadataCollector {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Collects every metadata file selected by `params`.
    ///
    /// Fails only on invalid parameters or a listing error. Per-file
    /// problems end up in [`CollectionResult::failures`]. When the deadline
    /// is reached, enumeration stops and fetches still in flight are
    /// recorded as [`FailureKind::DeadlineExceeded`].
    pub async fn collect(&self, params: &CollectionParams) -> Result<CollectionResult> {
        params.validate()?;

        let started = Instant::now();
        let deadline = params.deadline.map(|budget| started + budget);
        let mut builder = CollectionBuilder::new(params);

        info!(
            run_id = %builder.run_id(),
            bucket = %params.bucket,
            prefix = %params.prefix,
            start = %params.start.to_rfc3339(),
            end = %params.end.to_rfc3339(),
            concurrency = params.concurrency,
            "Starting metadata collection"
        );

        let enumerator = KeyEnumerator::new(Arc::clone(&self.storage), params);
        let fetcher = RecordFetcher::new(Arc::clone(&self.storage), params);
        let fetcher = &fetcher;

        let stop = match deadline {
            Some(at) => Either::Left(tokio::time::sleep_until(at)),
            None => Either::Right(future::pending()),
        };

        let outcomes = enumerator
            .candidates()
            .take(params.max_results.unwrap_or(usize::MAX))
            .take_until(stop)
            .map(move |candidate| async move {
                let candidate = candidate?;
                Ok::<_, Error>(fetch_within(deadline, fetcher, candidate).await)
            })
            .buffer_unordered(params.concurrency);
        let mut outcomes = std::pin::pin!(outcomes);

        while let Some(outcome) = outcomes.next().await {
            builder.record(outcome?);
        }

        let result = builder.finish(started.elapsed());

        info!(
            run_id = %result.run_id(),
            scanned = result.total_scanned(),
            collected = result.total_collected(),
            failed = result.failures().len(),
            bytes = result.bytes_transferred(),
            elapsed_secs = result.elapsed().as_secs_f64(),
            "Finished metadata collection"
        );

        Ok(result)
    }
}

async fn fetch_within(
    deadline: Option<Instant>,
    fetcher: &RecordFetcher,
    candidate: CandidateKey,
) -> FetchOutcome {
    let Some(deadline) = deadline else {
        return fetcher.fetch(candidate).await;
    };

    let key = candidate.key.clone();
    match tokio::time::timeout_at(deadline, fetcher.fetch(candidate)).await {
        Ok(outcome) => outcome,
        Err(_) => FetchOutcome::Failure(RecordFailure::new(
            key,
            FailureKind::DeadlineExceeded,
            "run deadline reached before the fetch completed",
        )),
    }
}
