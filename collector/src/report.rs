use serde::Serialize;

use crate::analysis::{AggregationConfig, AggregationResult, MetadataFilter};
use crate::collector::{CollectionResult, CollectionSummary, MetadataRecord, RecordFailure};

/// What the CLI prints for one run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub summary: CollectionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetadataFilter>,
    pub aggregation: AggregationResult,
    pub failures: Vec<RecordFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<MetadataRecord>>,
}

impl Report {
    pub fn build(result: &CollectionResult, config: &AggregationConfig, include_records: bool) -> Self {
        Self {
            summary: result.summary(),
            filter: result.filter().cloned(),
            aggregation: result.aggregate(config),
            failures: result.failures().to_vec(),
            records: include_records.then(|| result.records().to_vec()),
        }
    }
}
