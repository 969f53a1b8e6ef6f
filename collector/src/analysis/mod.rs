//! Schema discovery and categorical aggregation over collected records.

mod aggregate;
mod filter;
mod schema;

pub use aggregate::{AggregationConfig, AggregationResult, Aggregator, FrequencyTable, ValueCount};
pub use filter::MetadataFilter;
pub use schema::{SchemaField, SchemaProfile};
