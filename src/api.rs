//! # Deck-API
//!
//! The HTTP layer powered by Axum. Collection names come straight from the
//! URL and are forwarded to the store after passing the name guard.
//!
//! ## Endpoints
//!
//! - `GET /api/collections` - List collections
//! - `GET /api/collections/:name/count` - Count documents
//! - `GET /api/collections/:name/data` - Paginated documents (`limit`, `skip`)
//! - `POST /api/collections/:name/data` - Insert a document
//! - `GET /api/collections/:name/data/:id` - Get one document
//! - `PUT /api/collections/:name/data/:id` - `$set` fields on one document
//! - `DELETE /api/collections/:name/data/:id` - Delete one document
//! - `GET /api/collections/:name/search` - Naive search (`q`, `limit`, `skip`)
//! - `GET /api/collections/:name/schema` - Schema sampled from 100 documents
//! - `PATCH /api/collections/:name/bulk-update` - `$set` on every match
//! - `GET /api/collections/:name/export` - Whole collection as a JSON download
//! - `GET /api/echo` - Echo
//! - `GET /api/python/test/:input` - Run `test.py <input>`
//! - `GET /api/python/run/:file` - Run `<file>.py <file>`
//! - `GET /health` - Health check

use crate::db::DeckStore;
use crate::error::{DeckError, ResultExt, RouteError};
use crate::explorer::with_frontend;
use crate::format::{
    bson_to_json, document_to_json, documents_to_json, json_to_document, timestamp,
    JsonAttachment, PrettyJson,
};
use crate::guard::validate_collection_name;
use crate::inference::{infer_schema, SAMPLE_SIZE};
use crate::query::{id_filter, search_filter};
use crate::scripts::{ScriptOutput, ScriptRunner};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Page size when `limit` is missing, unparseable or not positive
pub const DEFAULT_LIMIT: i64 = 10;

/// Largest page a single request may ask for
pub const MAX_LIMIT: i64 = 1000;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DeckStore>,
    pub scripts: Arc<ScriptRunner>,
    /// Built frontend served for non-API paths
    pub frontend_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(store: Arc<DeckStore>, scripts: ScriptRunner) -> Self {
        Self {
            store,
            scripts: Arc::new(scripts),
            frontend_dir: None,
        }
    }

    pub fn with_frontend(mut self, dir: impl Into<PathBuf>) -> Self {
        self.frontend_dir = Some(dir.into());
        self
    }
}

/// Pagination block returned with every page of documents
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub skip: u64,
    pub limit: i64,
    pub total: u64,
    pub returned: usize,
}

/// Raw `limit` / `skip` query parameters, parsed leniently
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub skip: Option<String>,
}

impl PageParams {
    pub fn limit(&self) -> i64 {
        match self.limit.as_deref().and_then(parse_leading_int) {
            Some(n) if n > 0 => n.min(MAX_LIMIT),
            _ => DEFAULT_LIMIT,
        }
    }

    pub fn skip(&self) -> u64 {
        match self.skip.as_deref().and_then(parse_leading_int) {
            Some(n) if n > 0 => n as u64,
            _ => 0,
        }
    }
}

/// Search query parameters
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub skip: Option<String>,
}

impl SearchParams {
    fn page(&self) -> PageParams {
        PageParams {
            limit: self.limit.clone(),
            skip: self.skip.clone(),
        }
    }
}

/// Body of a bulk update
#[derive(Debug, Deserialize)]
pub struct BulkUpdateRequest {
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub update: Option<Value>,
}

/// Parses the leading integer of a string: `"12abc"` → 12, `"abc"` → none
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    // Saturate rather than fail on absurdly long inputs
    let value = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(sign * value)
}

fn checked_collection(name: &str, message: &str) -> Result<(), RouteError> {
    validate_collection_name(name).during(message)
}

fn json_body(body: Result<Json<Value>, JsonRejection>, message: &str) -> Result<Value, RouteError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(DeckError::invalid_payload(rejection.body_text()).during(message)),
    }
}

/// Creates the Axum router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/collections", get(list_collections_handler))
        .route("/collections/:name/count", get(count_handler))
        .route(
            "/collections/:name/data",
            get(data_handler).post(insert_handler),
        )
        .route(
            "/collections/:name/data/:id",
            get(get_document_handler)
                .put(update_handler)
                .delete(delete_handler),
        )
        .route("/collections/:name/search", get(search_handler))
        .route("/collections/:name/schema", get(schema_handler))
        .route("/collections/:name/bulk-update", patch(bulk_update_handler))
        .route("/collections/:name/export", get(export_handler))
        .route("/echo", get(echo_handler))
        .route("/python/test/:input", get(python_test_handler))
        .route("/python/run/:file", get(python_run_handler))
        .fallback(api_not_found);

    let router = Router::new()
        .nest("/api", api)
        .route("/health", get(health_handler));

    with_frontend(router, state.frontend_dir.as_deref())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unknown `/api/*` routes never fall through to the SPA
async fn api_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "API route not found" })),
    )
}

/// Health check endpoint
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(_) => Json(json!({
            "status": "healthy",
            "database": "connected"
        })),
        Err(e) => Json(json!({
            "status": "unhealthy",
            "database": "disconnected",
            "error": e.to_string()
        })),
    }
}

/// GET /api/echo
async fn echo_handler() -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "message": "Echo API is working",
        "timestamp": timestamp(),
        "server": "MongoDeck"
    }))
}

/// GET /api/collections - List all collections
async fn list_collections_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to list collections";

    let collections = state.store.list_collections().await.during(MSG)?;
    let count = collections.len();

    Ok(PrettyJson(json!({
        "success": true,
        "database": state.store.database_name(),
        "collections": collections,
        "count": count,
        "timestamp": timestamp()
    })))
}

/// GET /api/collections/:name/count
async fn count_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to count documents";
    checked_collection(&name, MSG)?;

    let count = state.store.count(&name, Document::new()).await.during(MSG)?;

    Ok(PrettyJson(json!({
        "success": true,
        "collection": name,
        "count": count,
        "timestamp": timestamp()
    })))
}

/// GET /api/collections/:name/data - One page of documents
async fn data_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to fetch documents";
    checked_collection(&name, MSG)?;

    let (skip, limit) = (params.skip(), params.limit());
    debug!("🔍 Reading {} (skip={}, limit={})", name, skip, limit);

    let docs = state
        .store
        .find(&name, Document::new(), skip, Some(limit))
        .await
        .during(MSG)?;
    let total = state.store.count(&name, Document::new()).await.during(MSG)?;

    let pagination = Pagination {
        skip,
        limit,
        total,
        returned: docs.len(),
    };

    Ok(PrettyJson(json!({
        "success": true,
        "collection": name,
        "data": documents_to_json(&docs),
        "pagination": pagination,
        "timestamp": timestamp()
    })))
}

/// GET /api/collections/:name/data/:id
async fn get_document_handler(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to fetch document";
    checked_collection(&name, MSG)?;

    let doc = state
        .store
        .find_one(&name, id_filter(&id))
        .await
        .during(MSG)?
        .ok_or_else(|| DeckError::not_found(format!("Document {} not found in {}", id, name)))
        .during(MSG)?;

    Ok(PrettyJson(json!({
        "success": true,
        "collection": name,
        "data": document_to_json(&doc)
    })))
}

/// POST /api/collections/:name/data - Insert a document
async fn insert_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to insert document";
    checked_collection(&name, MSG)?;

    let doc = json_to_document(json_body(body, MSG)?).during(MSG)?;
    info!("📥 Inserting into {}", name);

    let inserted_id = state.store.insert_one(&name, doc).await.during(MSG)?;

    Ok((
        StatusCode::CREATED,
        PrettyJson(json!({
            "success": true,
            "message": "Document inserted successfully",
            "insertedId": bson_to_json(&inserted_id),
            "timestamp": timestamp()
        })),
    ))
}

/// PUT /api/collections/:name/data/:id - Update one document
async fn update_handler(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to update document";
    checked_collection(&name, MSG)?;

    let mut set = json_to_document(json_body(body, MSG)?).during(MSG)?;
    // _id is immutable
    set.remove("_id");
    if set.is_empty() {
        return Err(DeckError::invalid_payload("No fields to update").during(MSG));
    }

    info!("📝 Updating {} in {}", id, name);

    let outcome = state
        .store
        .update_one(&name, id_filter(&id), set)
        .await
        .during(MSG)?;

    if outcome.matched == 0 {
        return Err(DeckError::not_found(format!("Document {} not found in {}", id, name)).during(MSG));
    }

    Ok(PrettyJson(json!({
        "success": true,
        "message": "Document updated successfully",
        "modifiedCount": outcome.modified,
        "timestamp": timestamp()
    })))
}

/// DELETE /api/collections/:name/data/:id - Delete one document
async fn delete_handler(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to delete document";
    checked_collection(&name, MSG)?;

    info!("🗑️ Deleting {} from {}", id, name);

    let deleted = state
        .store
        .delete_one(&name, id_filter(&id))
        .await
        .during(MSG)?;

    if deleted == 0 {
        return Err(DeckError::not_found(format!("Document {} not found in {}", id, name)).during(MSG));
    }

    Ok(PrettyJson(json!({
        "success": true,
        "message": "Document deleted successfully",
        "deletedCount": deleted,
        "timestamp": timestamp()
    })))
}

/// GET /api/collections/:name/search
///
/// Uses `$text` alone when the collection has a text index; otherwise
/// matches the term against every top-level field of one sample document.
async fn search_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to search documents";
    checked_collection(&name, MSG)?;

    let term = params.q.clone().unwrap_or_default();
    let page = params.page();
    let (skip, limit) = (page.skip(), page.limit());

    let filter = if term.is_empty() {
        Document::new()
    } else {
        let fields: Vec<String> = state
            .store
            .find_one(&name, Document::new())
            .await
            .during(MSG)?
            .map(|sample| sample.keys().cloned().collect())
            .unwrap_or_default();
        let has_text_index = state.store.has_text_index(&name).await.during(MSG)?;
        search_filter(&term, &fields, has_text_index)
    };

    debug!("🔍 Searching {} for {:?}", name, term);

    let docs = state
        .store
        .find(&name, filter.clone(), skip, Some(limit))
        .await
        .during(MSG)?;
    let total = state.store.count(&name, filter).await.during(MSG)?;

    let pagination = Pagination {
        skip,
        limit,
        total,
        returned: docs.len(),
    };

    Ok(PrettyJson(json!({
        "success": true,
        "collection": name,
        "searchQuery": term,
        "data": documents_to_json(&docs),
        "pagination": pagination,
        "timestamp": timestamp()
    })))
}

/// GET /api/collections/:name/schema
async fn schema_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to infer schema";
    checked_collection(&name, MSG)?;

    let sample = state
        .store
        .find(&name, Document::new(), 0, Some(SAMPLE_SIZE))
        .await
        .during(MSG)?;
    let schema = infer_schema(&sample);

    Ok(PrettyJson(json!({
        "success": true,
        "collection": name,
        "schema": schema.to_json(),
        "sampleCount": sample.len(),
        "timestamp": timestamp()
    })))
}

/// PATCH /api/collections/:name/bulk-update
async fn bulk_update_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to run bulk update";
    checked_collection(&name, MSG)?;

    let request: BulkUpdateRequest = serde_json::from_value(json_body(body, MSG)?)
        .map_err(DeckError::from)
        .during(MSG)?;

    let filter = request
        .filter
        .ok_or_else(|| DeckError::invalid_payload("Missing 'filter'"))
        .and_then(json_to_document)
        .during(MSG)?;
    let set = request
        .update
        .ok_or_else(|| DeckError::invalid_payload("Missing 'update'"))
        .and_then(json_to_document)
        .during(MSG)?;
    if set.is_empty() {
        return Err(DeckError::invalid_payload("'update' has no fields").during(MSG));
    }

    info!("📝 Bulk updating {} with filter {}", name, filter);

    let outcome = state
        .store
        .update_many(&name, filter, set)
        .await
        .during(MSG)?;

    Ok(PrettyJson(json!({
        "success": true,
        "message": "Bulk update completed",
        "matchedCount": outcome.matched,
        "modifiedCount": outcome.modified,
        "timestamp": timestamp()
    })))
}

/// GET /api/collections/:name/export - Download the whole collection
async fn export_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to export collection";
    checked_collection(&name, MSG)?;

    let docs = state
        .store
        .find(&name, Document::new(), 0, None)
        .await
        .during(MSG)?;
    info!("📤 Exporting {} documents from {}", docs.len(), name);

    Ok(JsonAttachment {
        filename: format!("{}.json", name),
        body: Value::Array(documents_to_json(&docs)),
    })
}

/// GET /api/python/test/:input
async fn python_test_handler(
    State(state): State<AppState>,
    Path(input): Path<String>,
) -> Result<impl IntoResponse, RouteError> {
    run_script(&state, "test", input).await
}

/// GET /api/python/run/:file
async fn python_run_handler(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, RouteError> {
    let name = file.clone();
    run_script(&state, &name, file).await
}

async fn run_script(
    state: &AppState,
    name: &str,
    input: String,
) -> Result<impl IntoResponse, RouteError> {
    const MSG: &str = "Failed to run script";

    let output = match state.scripts.run(name, &input).await {
        Ok(output) => output,
        // Timeouts and spawn failures report like a failed run
        Err(DeckError::Script(reason)) => ScriptOutput {
            success: false,
            stdout: String::new(),
            stderr: reason,
        },
        Err(e) => return Err(e.during(MSG)),
    };

    if output.success {
        Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Script executed successfully",
                "input": input,
                "output": output.stdout
            })),
        ))
    } else {
        Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "message": "Script exited with an error",
                "input": input,
                "error": output.stderr
            })),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::time::Duration;
    use tower::util::ServiceExt;

    async fn create_test_app() -> Router {
        let store = Arc::new(DeckStore::in_memory("expressapp").await.unwrap());
        let scripts = ScriptRunner::new("scripts", "python", Duration::from_secs(5));
        create_router(AppState::new(store, scripts))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn seed_users(app: &Router, n: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for i in 0..n {
            let (status, body) = send(
                app,
                "POST",
                "/api/collections/users/data",
                Some(json!({ "name": format!("user{}", i), "age": 20 + i })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            ids.push(body["insertedId"].as_str().unwrap().to_string());
        }
        ids
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("25"), Some(25));
        assert_eq!(parse_leading_int("12abc"), Some(12));
        assert_eq!(parse_leading_int("-5"), Some(-5));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int(""), None);
    }

    #[test]
    fn test_page_params_defaults_and_clamping() {
        let page = |limit: &str, skip: &str| PageParams {
            limit: Some(limit.to_string()),
            skip: Some(skip.to_string()),
        };

        assert_eq!(PageParams::default().limit(), DEFAULT_LIMIT);
        assert_eq!(PageParams::default().skip(), 0);
        assert_eq!(page("abc", "x").limit(), DEFAULT_LIMIT);
        assert_eq!(page("0", "0").limit(), DEFAULT_LIMIT);
        assert_eq!(page("-5", "-3").limit(), DEFAULT_LIMIT);
        assert_eq!(page("-5", "-3").skip(), 0);
        assert_eq!(page("5000", "7").limit(), MAX_LIMIT);
        assert_eq!(page("25", "7").skip(), 7);
    }

    #[tokio::test]
    async fn test_health_and_echo() {
        let app = create_test_app().await;

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, "GET", "/api/echo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
    }

    #[tokio::test]
    async fn test_list_collections() {
        let app = create_test_app().await;

        let (_, body) = send(&app, "GET", "/api/collections", None).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["database"], "expressapp");
        assert_eq!(body["count"], 0);

        seed_users(&app, 1).await;
        let (_, body) = send(&app, "GET", "/api/collections", None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["collections"][0], json!({ "name": "users", "type": "collection" }));
    }

    #[tokio::test]
    async fn test_pretty_printed_utf8_json() {
        let app = create_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/collections")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("{\n  \"success\": true"));
    }

    #[tokio::test]
    async fn test_paginated_data_and_count() {
        let app = create_test_app().await;
        seed_users(&app, 15).await;

        let (_, body) = send(&app, "GET", "/api/collections/users/count", None).await;
        assert_eq!(body["count"], 15);

        let (_, body) = send(&app, "GET", "/api/collections/users/data", None).await;
        assert_eq!(
            body["pagination"],
            json!({ "skip": 0, "limit": 10, "total": 15, "returned": 10 })
        );

        let (_, body) = send(
            &app,
            "GET",
            "/api/collections/users/data?limit=10&skip=10",
            None,
        )
        .await;
        assert_eq!(body["pagination"]["returned"], 5);
        assert_eq!(body["data"][0]["name"], "user10");
    }

    #[tokio::test]
    async fn test_get_update_delete_document() {
        let app = create_test_app().await;
        let ids = seed_users(&app, 2).await;
        let uri = format!("/api/collections/users/data/{}", ids[0]);

        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["_id"], ids[0].as_str());

        // _id in the body is ignored
        let (status, body) = send(
            &app,
            "PUT",
            &uri,
            Some(json!({ "_id": "something-else", "name": "renamed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["modifiedCount"], 1);

        let (_, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(body["data"]["name"], "renamed");
        assert_eq!(body["data"]["_id"], ids[0].as_str());

        let (status, body) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deletedCount"], 1);

        let (status, body) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Failed to delete document");
    }

    #[tokio::test]
    async fn test_update_missing_document_is_404() {
        let app = create_test_app().await;
        seed_users(&app, 1).await;

        let (status, body) = send(
            &app,
            "PUT",
            "/api/collections/users/data/65a1b2c3d4e5f60718293a4b",
            Some(json!({ "name": "ghost" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_string_ids_are_addressable() {
        let app = create_test_app().await;
        send(
            &app,
            "POST",
            "/api/collections/tags/data",
            Some(json!({ "_id": "rust", "count": 1 })),
        )
        .await;

        let (status, body) = send(&app, "GET", "/api/collections/tags/data/rust", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["count"], 1);
    }

    #[tokio::test]
    async fn test_search() {
        let app = create_test_app().await;
        seed_users(&app, 12).await;

        let (_, body) = send(&app, "GET", "/api/collections/users/search?q=USER1", None).await;
        // user1, user10, user11
        assert_eq!(body["pagination"]["total"], 3);
        assert_eq!(body["searchQuery"], "USER1");

        let (_, body) = send(&app, "GET", "/api/collections/users/search?q=.*", None).await;
        assert_eq!(body["pagination"]["total"], 0);

        let (_, body) = send(&app, "GET", "/api/collections/users/search", None).await;
        assert_eq!(body["pagination"]["total"], 12);
        assert_eq!(body["pagination"]["returned"], 10);
    }

    #[tokio::test]
    async fn test_search_with_text_index_uses_text_only() {
        let mem = MemoryBackend::new();
        mem.create_text_index("posts", &["title"]);
        let store = Arc::new(DeckStore::from_memory(mem, "expressapp"));
        let scripts = ScriptRunner::new("scripts", "python", Duration::from_secs(5));
        let app = create_router(AppState::new(store, scripts));

        for (title, body) in [("Learning Rust", "ownership"), ("Go tips", "rust-free")] {
            send(
                &app,
                "POST",
                "/api/collections/posts/data",
                Some(json!({ "title": title, "body": body })),
            )
            .await;
        }

        // Whole words in the indexed field only: the unindexed body is not scanned
        let (status, body) = send(&app, "GET", "/api/collections/posts/search?q=rust", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["data"][0]["title"], "Learning Rust");

        // No substring regex fallback mixed in
        let (status, body) = send(&app, "GET", "/api/collections/posts/search?q=Rus", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn test_get_missing_document_is_404() {
        let app = create_test_app().await;
        seed_users(&app, 1).await;

        let (status, body) = send(&app, "GET", "/api/collections/users/data/abc", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Failed to fetch document");
    }

    #[tokio::test]
    async fn test_duplicate_id_insert_is_500() {
        let app = create_test_app().await;
        let doc = json!({ "_id": "dup", "n": 1 });

        let (status, _) = send(&app, "POST", "/api/collections/tags/data", Some(doc.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, "POST", "/api/collections/tags/data", Some(doc)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Failed to insert document");
        assert!(body["error"].as_str().unwrap().contains("E11000"));
    }

    #[tokio::test]
    async fn test_schema() {
        let app = create_test_app().await;
        seed_users(&app, 3).await;

        let (status, body) = send(&app, "GET", "/api/collections/users/schema", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sampleCount"], 3);
        assert_eq!(body["schema"]["_id"]["type"], "objectId");
        assert_eq!(body["schema"]["name"]["type"], "string");
        assert_eq!(body["schema"]["name"]["examples"].as_array().unwrap().len(), 3);
        assert_eq!(body["schema"]["age"]["nullable"], false);
    }

    #[tokio::test]
    async fn test_bulk_update() {
        let app = create_test_app().await;
        seed_users(&app, 5).await;

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/collections/users/bulk-update",
            Some(json!({ "filter": { "age": { "$gte": 22 } }, "update": { "senior": true } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["matchedCount"], 3);
        assert_eq!(body["modifiedCount"], 3);

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/collections/users/bulk-update",
            Some(json!({ "update": { "senior": true } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_export() {
        let app = create_test_app().await;
        seed_users(&app, 2).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/collections/users/export")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"users.json\""
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_error_envelopes() {
        let app = create_test_app().await;

        let (status, body) = send(&app, "GET", "/api/collections/$cmd/data", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Failed to fetch documents");
        assert!(body["error"].as_str().unwrap().contains("Invalid collection name"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/collections/users/data",
            Some(json!([1, 2, 3])),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Failed to insert document");

        let (status, body) = send(&app, "GET", "/api/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "API route not found");
    }

    #[tokio::test]
    async fn test_script_name_is_guarded() {
        let app = create_test_app().await;

        let (status, body) = send(&app, "GET", "/api/python/run/..%2Fsecret", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Failed to run script");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_routes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.py"), "echo \"got $1\"\n").unwrap();
        std::fs::write(dir.path().join("fail.py"), "echo bad >&2\nexit 1\n").unwrap();

        let store = Arc::new(DeckStore::in_memory("expressapp").await.unwrap());
        let scripts = ScriptRunner::new(dir.path(), "sh", Duration::from_secs(5));
        let app = create_router(AppState::new(store, scripts));

        let (status, body) = send(&app, "GET", "/api/python/test/hello", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "got hello");
        assert_eq!(body["input"], "hello");

        let (status, body) = send(&app, "GET", "/api/python/run/fail", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "bad");
    }
}
