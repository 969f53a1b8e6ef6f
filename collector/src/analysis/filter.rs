use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::collector::{FieldValue, MetadataRecord};

/// Field → accepted values. A record must satisfy every field; a field is
/// satisfied when its value is one of the accepted strings. Array values
/// match when any element does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter {
    criteria: BTreeMap<String, BTreeSet<String>>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.criteria
            .entry(field.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Parses a `field=value1,value2` clause.
    pub fn parse_clause(clause: &str) -> Result<(String, Vec<String>)> {
        let (field, values) = clause.split_once('=').ok_or_else(|| {
            Error::InvalidParams(format!("filter '{}' must look like field=value[,value]", clause))
        })?;

        let field = field.trim();
        if field.is_empty() {
            return Err(Error::InvalidParams(format!("filter '{}' has no field name", clause)));
        }

        let values: Vec<String> = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if values.is_empty() {
            return Err(Error::InvalidParams(format!("filter '{}' has no values", clause)));
        }

        Ok((field.to_string(), values))
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.criteria.keys().map(String::as_str)
    }

    pub fn matches(&self, record: &MetadataRecord) -> bool {
        self.criteria
            .iter()
            .all(|(field, accepted)| match record.get(field) {
                None | Some(FieldValue::Null) => false,
                Some(FieldValue::Array(items)) => items
                    .iter()
                    .filter_map(FieldValue::as_text)
                    .any(|text| accepted.contains(&text)),
                Some(value) => value
                    .as_text()
                    .is_some_and(|text| accepted.contains(&text)),
            })
    }
}

impl From<&HashMap<String, Vec<String>>> for MetadataFilter {
    fn from(map: &HashMap<String, Vec<String>>) -> Self {
        map.iter()
            .fold(Self::new(), |filter, (field, values)| {
                filter.with_field(field.clone(), values.iter().cloned())
            })
    }
}
