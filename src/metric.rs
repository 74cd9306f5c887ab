use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A single field value carried by a [`Metric`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Str(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

/// Normalized output unit handed to an [`Accumulator`](crate::accumulator::Accumulator).
///
/// Built once per successful collection pass or once per inbound webhook
/// event. The producer gives up ownership when it hands the metric over.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub tags: HashMap<String, String>,
    pub fields: HashMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        tags: HashMap<String, String>,
        fields: HashMap<String, FieldValue>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            tags,
            fields,
            timestamp,
        }
    }

    /// Integer field lookup, `None` when absent or not an integer.
    #[cfg(test)]
    pub fn int_field(&self, key: &str) -> Option<i64> {
        match self.fields.get(key) {
            Some(FieldValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}
