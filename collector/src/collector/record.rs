use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A metadata field value. Mirrors the JSON data model so that any side-car
/// file can be represented without a declared schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

/// Type tag recorded by schema discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    /// An array whose elements are all strings. The empty array counts too.
    StringArray,
    Array,
    Object,
    Null,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::StringArray => "string-array",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Null => "null",
        };
        f.write_str(name)
    }
}

impl FieldValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            FieldValue::Null => ValueType::Null,
            FieldValue::Bool(_) => ValueType::Boolean,
            FieldValue::Number(_) => ValueType::Number,
            FieldValue::String(_) => ValueType::String,
            FieldValue::Array(items) if items.iter().all(|v| matches!(v, FieldValue::String(_))) => {
                ValueType::StringArray
            }
            FieldValue::Array(_) => ValueType::Array,
            FieldValue::Object(_) => ValueType::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// String form of a scalar, used for filter matching. Arrays, objects
    /// and null have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::String(s) => Some(s.clone()),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Compact JSON rendering with sorted object keys. Two values are the
    /// same sample exactly when their canonical forms are equal.
    pub fn canonical(&self) -> String {
        Value::from(self).to_string()
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => FieldValue::Number(n),
            Value::String(s) => FieldValue::String(s),
            Value::Array(items) => FieldValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                FieldValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&FieldValue> for Value {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Number(n) => Value::Number(n.clone()),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            FieldValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Parsed contents of one `*.metadata.json` side-car file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub metadata_key: String,
    /// Key of the document the side-car describes.
    pub original_key: String,
    pub file_extension: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
    /// Top-level fields in document order.
    #[serde(serialize_with = "serialize_fields")]
    pub fields: Vec<(String, FieldValue)>,
}

impl MetadataRecord {
    pub fn new(
        metadata_key: &str,
        metadata_suffix: &str,
        last_modified: DateTime<Utc>,
        size_bytes: u64,
        fields: Vec<(String, FieldValue)>,
    ) -> Self {
        let original_key = metadata_key
            .strip_suffix(metadata_suffix)
            .unwrap_or(metadata_key)
            .to_string();
        let file_extension = file_extension(&original_key);

        Self {
            metadata_key: metadata_key.to_string(),
            original_key,
            file_extension,
            last_modified,
            size_bytes,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }
}

fn serialize_fields<S: Serializer>(
    fields: &[(String, FieldValue)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(fields.iter().map(|(name, value)| (name, value)))
}

/// Lowercased extension of the last path segment, or an empty string.
pub fn file_extension(key: &str) -> String {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_types() {
        let cases = [
            (json!("x"), ValueType::String),
            (json!(1.5), ValueType::Number),
            (json!(true), ValueType::Boolean),
            (json!(["a", "b"]), ValueType::StringArray),
            (json!([]), ValueType::StringArray),
            (json!(["a", 1]), ValueType::Array),
            (json!({"k": 1}), ValueType::Object),
            (Value::Null, ValueType::Null),
        ];

        for (value, expected) in cases {
            assert_eq!(FieldValue::from(value).value_type(), expected);
        }
    }

    #[test]
    fn test_canonical_sorts_object_keys() {
        let a = FieldValue::from(json!({"b": 1, "a": [true, null]}));
        assert_eq!(a.canonical(), r#"{"a":[true,null],"b":1}"#);
        assert_eq!(FieldValue::from(json!("Sales")).canonical(), r#""Sales""#);
    }

    #[test]
    fn test_record_derives_original_key_and_extension() {
        let record = MetadataRecord::new(
            "reports/2024/Sales-Report.PDF.metadata.json",
            ".metadata.json",
            Utc::now(),
            42,
            Vec::new(),
        );

        assert_eq!(record.original_key, "reports/2024/Sales-Report.PDF");
        assert_eq!(record.file_extension, "pdf");
    }

    #[test]
    fn test_fields_keep_document_order() {
        let body = br#"{"zeta": 1, "alpha": "a", "mid": null}"#;
        let Value::Object(map) = serde_json::from_slice::<Value>(body).unwrap() else {
            panic!("expected an object");
        };
        let fields = map.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect();
        let record = MetadataRecord::new("a.metadata.json", ".metadata.json", Utc::now(), 0, fields);

        let names: Vec<&str> = record.fields.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(record.get("alpha"), Some(&FieldValue::String("a".to_string())));
        assert_eq!(record.get("missing"), None);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""fields":{"zeta":1,"alpha":"a","mid":null}"#));
    }

    #[test]
    fn test_extension_ignores_dots_in_directories() {
        assert_eq!(file_extension("v1.2/README"), "");
        assert_eq!(file_extension("notes.md"), "md");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
    }

    #[test]
    fn test_as_text() {
        assert_eq!(FieldValue::from(json!(3)).as_text().as_deref(), Some("3"));
        assert_eq!(FieldValue::from(json!(false)).as_text().as_deref(), Some("false"));
        assert_eq!(FieldValue::from(json!(["a"])).as_text(), None);
        assert_eq!(FieldValue::Null.as_text(), None);
    }
}
