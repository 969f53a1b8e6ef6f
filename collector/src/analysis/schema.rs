use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::collector::{FieldValue, MetadataRecord, ValueType};

/// Running profile of one field across all records seen so far.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    /// Records carrying a non-null value for this field.
    pub occurrences: u64,
    /// Records carrying an explicit `null`.
    pub null_count: u64,
    pub types: BTreeSet<ValueType>,
    /// Keyed by canonical JSON; only the smallest `sample_size` keys are kept
    /// so that the sample does not depend on record order.
    samples: BTreeMap<String, FieldValue>,
}

impl SchemaField {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            occurrences: 0,
            null_count: 0,
            types: BTreeSet::new(),
            samples: BTreeMap::new(),
        }
    }

    pub fn non_null_count(&self) -> u64 {
        self.occurrences
    }

    /// Occurrences divided by all records profiled, in `[0, 1]`.
    pub fn occurrence_rate(&self, total_records: u64) -> f64 {
        if total_records == 0 {
            0.0
        } else {
            self.occurrences as f64 / total_records as f64
        }
    }

    /// Observed types other than `null`.
    pub fn value_types(&self) -> impl Iterator<Item = ValueType> + '_ {
        self.types.iter().copied().filter(|t| *t != ValueType::Null)
    }

    pub fn samples(&self) -> impl Iterator<Item = &FieldValue> {
        self.samples.values()
    }

    fn observe(&mut self, value: &FieldValue, sample_size: usize) {
        if value.is_null() {
            self.null_count += 1;
            self.types.insert(ValueType::Null);
            return;
        }

        self.occurrences += 1;
        self.types.insert(value.value_type());

        if sample_size == 0 {
            return;
        }
        let canonical = value.canonical();
        if self.samples.len() >= sample_size {
            match self.samples.last_key_value() {
                Some((largest, _)) if canonical >= *largest => return,
                _ => {}
            }
        }
        self.samples.entry(canonical).or_insert_with(|| value.clone());
        self.trim_samples(sample_size);
    }

    fn merge(&mut self, other: SchemaField, sample_size: usize) {
        self.occurrences += other.occurrences;
        self.null_count += other.null_count;
        self.types.extend(other.types);
        for (canonical, value) in other.samples {
            self.samples.entry(canonical).or_insert(value);
        }
        self.trim_samples(sample_size);
    }

    fn trim_samples(&mut self, sample_size: usize) {
        while self.samples.len() > sample_size {
            self.samples.pop_last();
        }
    }
}

/// Schema inferred from a set of records.
///
/// Building a profile is a commutative, associative reduction: profiles of
/// disjoint batches can be merged in any order and compare equal to the
/// profile of the whole set. Only the order of [`SchemaProfile::fields`]
/// (first seen) depends on input order, and equality ignores it.
#[derive(Debug, Clone)]
pub struct SchemaProfile {
    sample_size: usize,
    total_records: u64,
    fields: Vec<SchemaField>,
    index: HashMap<String, usize>,
}

impl SchemaProfile {
    pub fn new(sample_size: usize) -> Self {
        Self {
            sample_size,
            total_records: 0,
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a MetadataRecord>,
        sample_size: usize,
    ) -> Self {
        let mut profile = Self::new(sample_size);
        for record in records {
            profile.observe(record);
        }
        profile
    }

    pub fn observe(&mut self, record: &MetadataRecord) {
        self.total_records += 1;
        let sample_size = self.sample_size;
        for (name, value) in &record.fields {
            self.field_mut(name).observe(value, sample_size);
        }
    }

    /// Folds `other` into this profile. Fields new to `self` are appended in
    /// `other`'s order. The smaller of the two sample sizes wins.
    pub fn merge(mut self, other: SchemaProfile) -> SchemaProfile {
        self.sample_size = self.sample_size.min(other.sample_size);
        self.total_records += other.total_records;
        let sample_size = self.sample_size;

        for field in other.fields {
            let name = field.name.clone();
            self.field_mut(&name).merge(field, sample_size);
        }
        for field in &mut self.fields {
            field.trim_samples(sample_size);
        }
        self
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Fields in first-seen order.
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn occurrence_rate(&self, name: &str) -> Option<f64> {
        self.field(name)
            .map(|field| field.occurrence_rate(self.total_records))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn field_mut(&mut self, name: &str) -> &mut SchemaField {
        let next = self.fields.len();
        let position = *self.index.entry(name.to_string()).or_insert(next);
        if position == next {
            self.fields.push(SchemaField::new(name));
        }
        &mut self.fields[position]
    }
}

impl PartialEq for SchemaProfile {
    fn eq(&self, other: &Self) -> bool {
        self.sample_size == other.sample_size
            && self.total_records == other.total_records
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|field| other.field(&field.name) == Some(field))
    }
}

#[derive(Serialize)]
struct FieldReport<'a> {
    occurrences: u64,
    total_records: u64,
    occurrence_rate: f64,
    occurrence_percent: f64,
    types: &'a BTreeSet<ValueType>,
    non_null_count: u64,
    null_count: u64,
    sample_values: Vec<&'a FieldValue>,
}

impl Serialize for SchemaProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            let rate = field.occurrence_rate(self.total_records);
            let report = FieldReport {
                occurrences: field.occurrences,
                total_records: self.total_records,
                occurrence_rate: rate,
                occurrence_percent: (rate * 1000.0).round() / 10.0,
                types: &field.types,
                non_null_count: field.non_null_count(),
                null_count: field.null_count,
                sample_values: field.samples().collect(),
            };
            map.serialize_entry(&field.name, &report)?;
        }
        map.end()
    }
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

    fn corpus() -> Vec<MetadataRecord> {
        vec![
            record("a.pdf.metadata.json", json!({"type": "report", "dept": "Sales", "pages": 10})),
            record("b.pdf.metadata.json", json!({"type": "report", "dept": "HR", "tags": ["q1"]})),
            record("c.md.metadata.json", json!({"type": "proposal", "pages": "twelve"})),
            record("d.md.metadata.json", json!({"type": "memo", "dept": null, "tags": []})),
            record("e.docx.metadata.json", json!({"type": "report", "dept": "Sales", "extra": {"a": 1}})),
            record("f.txt.metadata.json", json!({"owner": "Ana", "dept": "Legal"})),
        ]
    }

    #[test]
    fn test_occurrence_counts_against_all_records() {
        let records = vec![
            record("1.metadata.json", json!({"type": "report", "dept": "Sales"})),
            record("2.metadata.json", json!({"type": "report", "dept": "HR"})),
            record("3.metadata.json", json!({"type": "proposal"})),
        ];
        let profile = SchemaProfile::from_records(&records, 3);

        assert_eq!(profile.total_records(), 3);
        let dept = profile.field("dept").unwrap();
        assert_eq!(dept.occurrences, 2);
        assert!((profile.occurrence_rate("dept").unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(profile.occurrence_rate("type"), Some(1.0));
    }

    #[test]
    fn test_nulls_are_typed_but_not_counted() {
        let profile = SchemaProfile::from_records(&corpus(), 3);
        let dept = profile.field("dept").unwrap();

        assert_eq!(dept.occurrences, 4);
        assert_eq!(dept.null_count, 1);
        assert!(dept.types.contains(&ValueType::Null));
        assert_eq!(dept.value_types().collect::<Vec<_>>(), vec![ValueType::String]);
    }

    #[test]
    fn test_conflicting_types_grow_the_type_set() {
        let profile = SchemaProfile::from_records(&corpus(), 3);
        let pages = profile.field("pages").unwrap();

        assert_eq!(
            pages.types.iter().copied().collect::<Vec<_>>(),
            vec![ValueType::String, ValueType::Number]
        );
    }

    #[test]
    fn test_samples_are_bounded_distinct_and_observed() {
        let profile = SchemaProfile::from_records(&corpus(), 2);
        let kinds: Vec<&FieldValue> = profile.field("type").unwrap().samples().collect();

        assert_eq!(kinds.len(), 2);
        assert_eq!(kinds[0], &FieldValue::String("memo".into()));
        assert_eq!(kinds[1], &FieldValue::String("proposal".into()));
    }

    #[test]
    fn test_partition_merge_equals_whole() {
        let records = corpus();
        let whole = SchemaProfile::from_records(&records, 2);

        for split in 0..=records.len() {
            let (left, right) = records.split_at(split);
            let a = SchemaProfile::from_records(left, 2);
            let b = SchemaProfile::from_records(right, 2);

            assert_eq!(a.clone().merge(b.clone()), whole, "split at {split}");
            assert_eq!(b.merge(a), whole, "reversed split at {split}");
        }
    }

    #[test]
    fn test_merge_is_associative_and_order_independent() {
        let records = corpus();
        let whole = SchemaProfile::from_records(&records, 3);

        let parts: Vec<SchemaProfile> = records
            .chunks(2)
            .map(|chunk| SchemaProfile::from_records(chunk, 3))
            .collect();
        let left_fold = parts[0]
            .clone()
            .merge(parts[1].clone())
            .merge(parts[2].clone());
        let right_fold = parts[0]
            .clone()
            .merge(parts[1].clone().merge(parts[2].clone()));

        assert_eq!(left_fold, whole);
        assert_eq!(right_fold, whole);

        let reversed = SchemaProfile::from_records(records.iter().rev(), 3);
        assert_eq!(reversed, whole);
    }

    #[test]
    fn test_merge_keeps_smaller_sample_size() {
        let records = corpus();
        let wide = SchemaProfile::from_records(&records[..2], 5);
        let narrow = SchemaProfile::from_records(&records[2..], 1);

        let merged = wide.merge(narrow);

        assert_eq!(merged.sample_size(), 1);
        assert!(merged.fields().iter().all(|f| f.samples().count() <= 1));
        assert_eq!(merged, SchemaProfile::from_records(&records, 1));
    }

    #[test]
    fn test_fields_keep_first_seen_order() {
        let records = vec![
            record("1.metadata.json", json!({"zeta": 1})),
            record("2.metadata.json", json!({"alpha": 1, "zeta": 2})),
        ];
        let profile = SchemaProfile::from_records(&records, 3);
        let names: Vec<&str> = profile.fields().iter().map(|f| f.name.as_str()).collect();

        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_serialized_report() {
        let records = vec![
            record("1.metadata.json", json!({"type": "report", "dept": "Sales"})),
            record("2.metadata.json", json!({"type": "report", "dept": "HR"})),
            record("3.metadata.json", json!({"type": "proposal"})),
        ];
        let json = serde_json::to_value(SchemaProfile::from_records(&records, 3)).unwrap();

        assert_eq!(json["dept"]["occurrence_percent"], 66.7);
        assert_eq!(json["type"]["occurrence_percent"], 100.0);
        assert_eq!(json["dept"]["types"], json!(["string"]));
        assert_eq!(json["type"]["sample_values"], json!(["proposal", "report"]));
    }

    #[test]
    fn test_empty_profile() {
        let profile = SchemaProfile::from_records(&Vec::<MetadataRecord>::new(), 3);

        assert!(profile.is_empty());
        assert_eq!(profile.total_records(), 0);
        assert_eq!(profile.occurrence_rate("anything"), None);
    }
}
