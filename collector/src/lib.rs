pub mod analysis;
pub mod collector;
pub mod report;
pub mod storage;
pub mod utils;

use chrono::{DateTime, Utc};
use common::Result;
use common::config::Settings;
use std::sync::Arc;
use tracing::info;

use analysis::{AggregationConfig, MetadataFilter};
use collector::{CollectionParams, MetadataCollector};
use report::Report;
use storage::{ObjectStorage, S3Config, S3Storage, create_s3_client};

/// Command-line overrides applied on top of the loaded settings.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub prefix: Option<String>,
    /// `(field, accepted values)` pairs, merged into the configured filter.
    pub filters: Vec<(String, Vec<String>)>,
    pub concurrency: Option<usize>,
    pub include_records: bool,
}

impl RunOptions {
    pub fn params(&self, settings: &Settings, now: DateTime<Utc>) -> CollectionParams {
        let mut params = CollectionParams::from_settings(settings, self.end.unwrap_or(now));

        if let Some(start) = self.start {
            params.start = start;
        }
        if let Some(prefix) = &self.prefix {
            params.prefix = prefix.clone();
        }
        if let Some(concurrency) = self.concurrency {
            params.concurrency = concurrency;
        }
        if !self.filters.is_empty() {
            let filter = self
                .filters
                .iter()
                .fold(params.filter.take().unwrap_or_default(), |filter, (field, values)| {
                    filter.with_field(field.clone(), values.iter().cloned())
                });
            params.filter = Some(filter);
        }
        params
    }
}

/// Runs one collection against the configured S3 bucket.
pub async fn run_collection(settings: &Settings, options: &RunOptions) -> Result<Report> {
    let client = create_s3_client(&S3Config::from(&settings.storage)).await;
    let storage: Arc<dyn ObjectStorage> = Arc::new(S3Storage::new(Arc::new(client)));
    run_collection_with(storage, settings, options).await
}

pub async fn run_collection_with(
    storage: Arc<dyn ObjectStorage>,
    settings: &Settings,
    options: &RunOptions,
) -> Result<Report> {
    let params = options.params(settings, Utc::now());
    let collector = MetadataCollector::new(storage);
    let result = collector.collect(&params).await?;

    let config = AggregationConfig::from(&settings.analysis);
    let report = Report::build(&result, &config, options.include_records);

    info!(
        run_id = %result.run_id(),
        fields = report.aggregation.schema.len(),
        categorical = report.aggregation.categorical.len(),
        matched = report.aggregation.matched_records,
        "Aggregation complete"
    );

    Ok(report)
}

/// Parses repeated `field=v1,v2` arguments.
pub fn parse_filters<'a>(
    clauses: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<(String, Vec<String>)>> {
    clauses.into_iter().map(MetadataFilter::parse_clause).collect()
}
