use common::config::AnalysisSettings;
use serde::Serialize;
use std::collections::HashMap;

use super::filter::MetadataFilter;
use super::schema::{SchemaField, SchemaProfile};
use crate::collector::{CollectionResult, FieldValue, MetadataRecord, ValueType};

pub const OTHERS_BUCKET: &str = "_others";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationConfig {
    /// Sample values kept per schema field.
    pub sample_size: usize,
    /// Fields with more distinct values than this are not tallied.
    pub categorical_threshold: usize,
    /// Fold everything past the top N values into [`OTHERS_BUCKET`].
    pub top_values: Option<usize>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            sample_size: 3,
            categorical_threshold: 50,
            top_values: Some(10),
        }
    }
}

impl From<&AnalysisSettings> for AggregationConfig {
    fn from(settings: &AnalysisSettings) -> Self {
        Self {
            sample_size: settings.sample_size,
            categorical_threshold: settings.categorical_threshold,
            top_values: settings.top_values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequencyTable {
    pub field: String,
    pub distinct_values: usize,
    /// Count descending, ties in first-seen order.
    pub values: Vec<ValueCount>,
}

impl FrequencyTable {
    pub fn count(&self, value: &str) -> Option<u64> {
        self.values
            .iter()
            .find(|entry| entry.value == value)
            .map(|entry| entry.count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    /// Records the schema was discovered from.
    pub total_records: u64,
    /// Records that passed the filter and were tallied.
    pub matched_records: u64,
    pub schema: SchemaProfile,
    /// In schema field order.
    pub categorical: Vec<FrequencyTable>,
    pub by_file_type: Vec<ValueCount>,
}

impl AggregationResult {
    pub fn categorical(&self, field: &str) -> Option<&FrequencyTable> {
        self.categorical.iter().find(|table| table.field == field)
    }

    pub fn file_type_count(&self, extension: &str) -> u64 {
        self.by_file_type
            .iter()
            .find(|entry| entry.value == extension)
            .map_or(0, |entry| entry.count)
    }
}

/// Value → count in first-seen order until sorted.
#[derive(Default)]
struct Tally {
    entries: Vec<ValueCount>,
    index: HashMap<String, usize>,
}

impl Tally {
    fn add(&mut self, value: &str) {
        match self.index.get(value) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(value.to_string(), self.entries.len());
                self.entries.push(ValueCount {
                    value: value.to_string(),
                    count: 1,
                });
            }
        }
    }

    fn distinct(&self) -> usize {
        self.entries.len()
    }

    fn into_sorted(mut self) -> Vec<ValueCount> {
        // stable: equal counts keep first-seen order
        self.entries.sort_by(|a, b| b.count.cmp(&a.count));
        self.entries
    }
}

pub struct Aggregator {
    config: AggregationConfig,
}

impl Aggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    pub fn aggregate(
        &self,
        result: &CollectionResult,
        filter: Option<&MetadataFilter>,
    ) -> AggregationResult {
        self.aggregate_records(result.records(), filter)
    }

    /// Schema and the categorical cutoff are computed over every record;
    /// tallies only cover records passing `filter`.
    pub fn aggregate_records(
        &self,
        records: &[MetadataRecord],
        filter: Option<&MetadataFilter>,
    ) -> AggregationResult {
        let schema = SchemaProfile::from_records(records, self.config.sample_size);

        let matched: Vec<&MetadataRecord> = records
            .iter()
            .filter(|record| filter.is_none_or(|f| f.matches(record)))
            .collect();

        let categorical = schema
            .fields()
            .iter()
            .filter(|field| is_categorical_type(field))
            .filter_map(|field| {
                let overall = self.tally_field(&field.name, records)?;
                let tally = match filter {
                    None => overall,
                    Some(_) => self.tally_field(&field.name, matched.iter().copied())?,
                };
                self.frequency_table(&field.name, tally)
            })
            .collect();

        let mut file_types = Tally::default();
        for record in &matched {
            file_types.add(&record.file_extension);
        }

        AggregationResult {
            total_records: schema.total_records(),
            matched_records: matched.len() as u64,
            schema,
            categorical,
            by_file_type: file_types.into_sorted(),
        }
    }

    /// Counts the string values of `field`, giving up once there are more
    /// distinct values than the categorical threshold.
    fn tally_field<'a>(
        &self,
        field: &str,
        records: impl IntoIterator<Item = &'a MetadataRecord>,
    ) -> Option<Tally> {
        let mut tally = Tally::default();

        for record in records {
            match record.get(field) {
                Some(FieldValue::String(value)) => tally.add(value),
                Some(FieldValue::Array(items)) => {
                    for item in items {
                        if let FieldValue::String(value) = item {
                            tally.add(value);
                        }
                    }
                }
                _ => {}
            }
            if tally.distinct() > self.config.categorical_threshold {
                return None;
            }
        }

        Some(tally)
    }

    fn frequency_table(&self, field: &str, tally: Tally) -> Option<FrequencyTable> {
        if tally.distinct() == 0 {
            return None;
        }

        let distinct_values = tally.distinct();
        let mut values = tally.into_sorted();
        if let Some(top) = self.config.top_values {
            if values.len() > top {
                let others: u64 = values.drain(top..).map(|entry| entry.count).sum();
                values.push(ValueCount {
                    value: OTHERS_BUCKET.to_string(),
                    count: others,
                });
            }
        }

        Some(FrequencyTable {
            field: field.to_string(),
            distinct_values,
            values,
        })
    }
}

/// Only plain strings or string arrays are tallied; a field mixing the two,
/// or carrying any other type, is left to the schema report.
fn is_categorical_type(field: &SchemaField) -> bool {
    let mut types = field.value_types();
    matches!(
        (types.next(), types.next()),
        (Some(ValueType::String), None) | (Some(ValueType::StringArray), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{Value, json};

    fn record(key: &str, body: Value) -> MetadataRecord {
        let Value::Object(map) = body else {
            panic!("test records must be objects");
        };
        let fields = map.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect();
        MetadataRecord::new(key, ".metadata.json", Utc::now(), 0, fields)
    }

    fn three_files() -> Vec<MetadataRecord> {
        vec![
            record("a.pdf.metadata.json", json!({"type": "report", "dept": "Sales"})),
            record("b.pdf.metadata.json", json!({"type": "report", "dept": "HR"})),
            record("c.docx.metadata.json", json!({"type": "proposal"})),
        ]
    }

    fn counts(table: &FrequencyTable) -> Vec<(&str, u64)> {
        table
            .values
            .iter()
            .map(|entry| (entry.value.as_str(), entry.count))
            .collect()
    }

    #[test]
    fn test_three_file_scenario() {
        let aggregation = Aggregator::new(AggregationConfig::default())
            .aggregate_records(&three_files(), None);

        assert_eq!(aggregation.total_records, 3);
        assert_eq!(aggregation.matched_records, 3);
        assert_eq!(aggregation.schema.field("dept").unwrap().occurrences, 2);
        assert_eq!(aggregation.schema.field("type").unwrap().occurrences, 3);

        let types = aggregation.categorical("type").unwrap();
        assert_eq!(counts(types), vec![("report", 2), ("proposal", 1)]);

        let depts = aggregation.categorical("dept").unwrap();
        assert_eq!(counts(depts), vec![("Sales", 1), ("HR", 1)]);

        assert_eq!(aggregation.file_type_count("pdf"), 2);
        assert_eq!(aggregation.file_type_count("docx"), 1);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let records = vec![
            record("1.metadata.json", json!({"color": "red"})),
            record("2.metadata.json", json!({"color": "blue"})),
            record("3.metadata.json", json!({"color": "green"})),
            record("4.metadata.json", json!({"color": "blue"})),
            record("5.metadata.json", json!({"color": "red"})),
        ];
        let aggregation =
            Aggregator::new(AggregationConfig::default()).aggregate_records(&records, None);

        assert_eq!(
            counts(aggregation.categorical("color").unwrap()),
            vec![("red", 2), ("blue", 2), ("green", 1)]
        );
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let aggregator = Aggregator::new(AggregationConfig::default());
        let filter = MetadataFilter::new().with_field("type", ["report", "proposal"]);
        let records = three_files();

        let first = aggregator.aggregate_records(&records, Some(&filter));
        let second = aggregator.aggregate_records(&records, Some(&filter));

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_filter_restricts_tallies_not_schema() {
        let filter = MetadataFilter::new().with_field("dept", ["Sales"]);
        let aggregation = Aggregator::new(AggregationConfig::default())
            .aggregate_records(&three_files(), Some(&filter));

        assert_eq!(aggregation.total_records, 3);
        assert_eq!(aggregation.matched_records, 1);
        assert_eq!(aggregation.schema.occurrence_rate("type"), Some(1.0));
        assert_eq!(counts(aggregation.categorical("type").unwrap()), vec![("report", 1)]);
        assert_eq!(aggregation.file_type_count("pdf"), 1);
        assert_eq!(aggregation.file_type_count("docx"), 0);
    }

    #[test]
    fn test_high_cardinality_fields_are_schema_only() {
        let records: Vec<MetadataRecord> = (0..6)
            .map(|i| {
                record(
                    &format!("{i}.metadata.json"),
                    json!({"title": format!("Document {i}"), "kind": "memo"}),
                )
            })
            .collect();
        let config = AggregationConfig {
            categorical_threshold: 5,
            ..Default::default()
        };
        let aggregation = Aggregator::new(config).aggregate_records(&records, None);

        assert!(aggregation.schema.field("title").is_some());
        assert!(aggregation.categorical("title").is_none());
        assert_eq!(counts(aggregation.categorical("kind").unwrap()), vec![("memo", 6)]);
    }

    #[test]
    fn test_narrowing_filter_does_not_make_free_text_categorical() {
        let records: Vec<MetadataRecord> = (0..100)
            .map(|i| {
                record(
                    &format!("{i}.metadata.json"),
                    json!({"id": i.to_string(), "title": format!("Document {i}"), "kind": "memo"}),
                )
            })
            .collect();
        let config = AggregationConfig {
            categorical_threshold: 5,
            ..Default::default()
        };
        let filter = MetadataFilter::new().with_field("id", ["1", "2", "3"]);
        let aggregation = Aggregator::new(config).aggregate_records(&records, Some(&filter));

        assert_eq!(aggregation.matched_records, 3);
        assert!(aggregation.categorical("title").is_none());
        assert!(aggregation.categorical("id").is_none());
        assert_eq!(counts(aggregation.categorical("kind").unwrap()), vec![("memo", 3)]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let with_distinct = |n: usize| -> Vec<MetadataRecord> {
            (0..n)
                .map(|i| record(&format!("{i}.metadata.json"), json!({"code": format!("c{i}")})))
                .collect()
        };
        let config = AggregationConfig {
            categorical_threshold: 4,
            top_values: None,
            ..Default::default()
        };
        let aggregator = Aggregator::new(config);

        let at_limit = aggregator.aggregate_records(&with_distinct(4), None);
        assert_eq!(at_limit.categorical("code").unwrap().distinct_values, 4);

        let over_limit = aggregator.aggregate_records(&with_distinct(5), None);
        assert!(over_limit.categorical("code").is_none());
        assert!(over_limit.schema.field("code").is_some());
    }

    #[test]
    fn test_default_folds_past_top_ten() {
        let records: Vec<MetadataRecord> = (0..12)
            .map(|i| record(&format!("{i}.metadata.json"), json!({"code": format!("c{i:02}")})))
            .collect();
        let aggregation =
            Aggregator::new(AggregationConfig::default()).aggregate_records(&records, None);
        let table = aggregation.categorical("code").unwrap();

        assert_eq!(table.distinct_values, 12);
        assert_eq!(table.values.len(), 11);
        assert_eq!(table.count("c00"), Some(1));
        assert_eq!(table.count(OTHERS_BUCKET), Some(2));
    }

    #[test]
    fn test_non_string_and_mixed_fields_are_not_tallied() {
        let records = vec![
            record("1.metadata.json", json!({"pages": 3, "mixed": "a", "flag": true})),
            record("2.metadata.json", json!({"pages": 4, "mixed": ["a"], "flag": false})),
        ];
        let aggregation =
            Aggregator::new(AggregationConfig::default()).aggregate_records(&records, None);

        assert!(aggregation.categorical.is_empty());
    }

    #[test]
    fn test_string_arrays_count_each_element() {
        let records = vec![
            record("1.metadata.json", json!({"tags": ["finance", "q1"], "note": null})),
            record("2.metadata.json", json!({"tags": ["finance"]})),
            record("3.metadata.json", json!({"tags": []})),
        ];
        let aggregation =
            Aggregator::new(AggregationConfig::default()).aggregate_records(&records, None);

        assert_eq!(
            counts(aggregation.categorical("tags").unwrap()),
            vec![("finance", 2), ("q1", 1)]
        );
        assert!(aggregation.categorical("note").is_none());
    }

    #[test]
    fn test_nulls_do_not_disqualify_a_string_field() {
        let records = vec![
            record("1.metadata.json", json!({"dept": "Sales"})),
            record("2.metadata.json", json!({"dept": null})),
        ];
        let aggregation =
            Aggregator::new(AggregationConfig::default()).aggregate_records(&records, None);

        assert_eq!(counts(aggregation.categorical("dept").unwrap()), vec![("Sales", 1)]);
    }

    #[test]
    fn test_top_values_fold_into_others() {
        let records: Vec<MetadataRecord> = ["a", "a", "a", "b", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, v)| record(&format!("{i}.metadata.json"), json!({"v": v})))
            .collect();
        let config = AggregationConfig {
            top_values: Some(2),
            ..Default::default()
        };
        let aggregation = Aggregator::new(config).aggregate_records(&records, None);
        let table = aggregation.categorical("v").unwrap();

        assert_eq!(table.distinct_values, 4);
        assert_eq!(counts(table), vec![("a", 3), ("b", 2), ("_others", 2)]);
    }

    #[test]
    fn test_empty_record_set() {
        let aggregation = Aggregator::new(AggregationConfig::default()).aggregate_records(&[], None);

        assert_eq!(aggregation.total_records, 0);
        assert!(aggregation.schema.is_empty());
        assert!(aggregation.categorical.is_empty());
        assert!(aggregation.by_file_type.is_empty());
    }
}
