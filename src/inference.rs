//! # Inference Engine (Schema Sampler)
//!
//! Summarises the shape of a schemaless collection from a sample of its
//! documents. This is a one-pass frequency summary, not a schema engine:
//! nothing is cached and nothing is enforced.
//!
//! ## Per-field Summary
//!
//! | Field         | Meaning                                              |
//! |---------------|------------------------------------------------------|
//! | `type`        | BSON type of the first non-null value seen           |
//! | `examples`    | Up to 3 distinct values, in first-seen order         |
//! | `nullable`    | True if any sampled document holds `null` here       |
//! | `occurrences` | Number of sampled documents carrying the field       |

use crate::format::bson_to_json;
use mongodb::bson::{Bson, Document};
use serde::Serialize;
use serde_json::{Map, Value};

/// Documents sampled per collection
pub const SAMPLE_SIZE: i64 = 100;

/// Distinct examples kept per field
pub const MAX_EXAMPLES: usize = 3;

/// BSON type name used in schema summaries
pub fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "boolean",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal",
        Bson::Undefined => "undefined",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        _ => "dbPointer",
    }
}

/// Inferred descriptor for a single field
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldSummary {
    #[serde(rename = "type")]
    pub field_type: String,
    pub examples: Vec<Value>,
    pub nullable: bool,
    pub occurrences: u64,
}

impl FieldSummary {
    fn new() -> Self {
        Self {
            field_type: "null".to_string(),
            examples: Vec::new(),
            nullable: false,
            occurrences: 0,
        }
    }

    fn observe(&mut self, value: &Bson) {
        self.occurrences += 1;

        if matches!(value, Bson::Null) {
            self.nullable = true;
        } else if self.field_type == "null" {
            self.field_type = type_name(value).to_string();
        }

        if self.examples.len() < MAX_EXAMPLES {
            let example = bson_to_json(value);
            if !self.examples.contains(&example) {
                self.examples.push(example);
            }
        }
    }
}

/// Schema summary of a sample, fields in first-seen order
#[derive(Debug, Clone, Default)]
pub struct SchemaSummary {
    summaries: Vec<(String, FieldSummary)>,
}

impl SchemaSummary {
    /// Looks up one field's summary
    pub fn field(&self, name: &str) -> Option<&FieldSummary> {
        self.summaries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, summary)| summary)
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// JSON object keyed by field name
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .summaries
            .iter()
            .map(|(key, summary)| {
                (
                    key.clone(),
                    serde_json::to_value(summary).unwrap_or(Value::Null),
                )
            })
            .collect();
        Value::Object(map)
    }
}

/// Infers a schema summary from sampled documents
///
/// # Arguments
/// * `docs` - The sampled documents
///
/// # Returns
/// One summary per top-level field, in the order fields were first seen
pub fn infer_schema(docs: &[Document]) -> SchemaSummary {
    let mut summaries: Vec<(String, FieldSummary)> = Vec::new();

    for doc in docs {
        for (key, value) in doc {
            let idx = match summaries.iter().position(|(k, _)| k == key) {
                Some(idx) => idx,
                None => {
                    summaries.push((key.clone(), FieldSummary::new()));
                    summaries.len() - 1
                }
            };
            summaries[idx].1.observe(value);
        }
    }

    SchemaSummary { summaries }
}
