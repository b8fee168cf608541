//! # Wire Formatting
//!
//! BSON <-> JSON conversion and the pretty-printed response type used by
//! every collection endpoint.
//!
//! ## BSON to JSON
//!
//! | BSON           | JSON                          |
//! |----------------|-------------------------------|
//! | ObjectId       | 24-char hex string            |
//! | DateTime       | RFC 3339 string               |
//! | Int32 / Int64  | number                        |
//! | Double         | number (non-finite → string)  |
//! | Decimal128     | string                        |
//! | Binary         | base64 string                 |
//! | Regex          | `/pattern/options`            |
//! | Timestamp      | `{"t": .., "i": ..}`          |
//! | anything else  | relaxed extended JSON         |

use crate::error::{DeckError, DeckResult};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use mongodb::bson::{Bson, Document};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Content type of every JSON body this server writes
pub const JSON_UTF8: &str = "application/json; charset=utf-8";

/// JSON response pretty-printed with two-space indentation
pub struct PrettyJson<T>(pub T);

impl<T: Serialize> IntoResponse for PrettyJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_string_pretty(&self.0) {
            Ok(body) => (
                [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8))],
                body,
            )
                .into_response(),
            Err(e) => DeckError::Json(e).into_response(),
        }
    }
}

/// JSON array download served as an attachment
pub struct JsonAttachment {
    pub filename: String,
    pub body: Value,
}

impl IntoResponse for JsonAttachment {
    fn into_response(self) -> Response {
        let body = match serde_json::to_string_pretty(&self.body) {
            Ok(body) => body,
            Err(e) => return DeckError::Json(e).into_response(),
        };
        let disposition = format!("attachment; filename=\"{}\"", self.filename);

        let mut response = (StatusCode::OK, body).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8));
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        response
    }
}

/// Local wall-clock timestamp stamped on every envelope
pub fn timestamp() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

/// Converts a BSON value into the plain JSON shape the UI renders
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => json!(i),
        Bson::Int64(i) => json!(i),
        Bson::Double(f) => {
            if f.is_finite() {
                json!(f)
            } else {
                Value::String(f.to_string())
            }
        }
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::String(s.clone()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => json!(dt.timestamp_millis()),
        },
        Bson::Decimal128(d) => Value::String(d.to_string()),
        Bson::Binary(bin) => Value::String(STANDARD.encode(&bin.bytes)),
        Bson::RegularExpression(re) => Value::String(format!("/{}/{}", re.pattern, re.options)),
        Bson::Timestamp(ts) => json!({ "t": ts.time, "i": ts.increment }),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => document_to_json(doc),
        other => other.clone().into_relaxed_extjson(),
    }
}

/// Converts a document, keeping field order
pub fn document_to_json(doc: &Document) -> Value {
    let map: Map<String, Value> = doc
        .iter()
        .map(|(k, v)| (k.clone(), bson_to_json(v)))
        .collect();
    Value::Object(map)
}

pub fn documents_to_json(docs: &[Document]) -> Vec<Value> {
    docs.iter().map(document_to_json).collect()
}

/// Converts a JSON request body into a document.
///
/// Extended JSON wrappers such as `{"$oid": ..}` and `{"$date": ..}` are
/// honoured. Anything other than an object is rejected.
pub fn json_to_document(value: Value) -> DeckResult<Document> {
    match value {
        Value::Object(map) => Ok(Document::try_from(map)?),
        other => Err(DeckError::invalid_payload(format!(
            "Expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
