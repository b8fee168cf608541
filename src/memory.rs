//! In-memory document backend.
//!
//! Collections are created on first insert and kept in insertion order.
//! Filters and `$set` updates are evaluated by [`crate::query`]. A top-level
//! `$text` clause is answered from the collection's registered text fields.

use crate::db::UpdateOutcome;
use crate::error::{DeckError, DeckResult};
use crate::query::{apply_set, bson_eq, matches, text_matches};
use dashmap::DashMap;
use mongodb::bson::{oid::ObjectId, Bson, Document};

#[derive(Default)]
pub struct MemoryBackend {
    collections: DashMap<String, Vec<Document>>,
    text_indexes: DashMap<String, Vec<String>>,
}

/// A filter split into its `$text` search and the remaining clauses
struct PreparedFilter {
    text: Option<(Vec<String>, String)>,
    rest: Document,
}

impl PreparedFilter {
    fn matches(&self, doc: &Document) -> DeckResult<bool> {
        if let Some((fields, search)) = &self.text {
            if !text_matches(doc, fields, search) {
                return Ok(false);
            }
        }
        matches(doc, &self.rest)
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.iter().map(|e| e.key().clone()).collect()
    }

    /// Registers the fields covered by a collection's text index
    pub fn create_text_index(&self, collection: &str, fields: &[&str]) {
        self.text_indexes.insert(
            collection.to_string(),
            fields.iter().map(|f| f.to_string()).collect(),
        );
    }

    pub fn has_text_index(&self, collection: &str) -> bool {
        self.text_indexes.contains_key(collection)
    }

    fn prepare(&self, collection: &str, filter: &Document) -> DeckResult<PreparedFilter> {
        let Some(text) = filter.get("$text") else {
            return Ok(PreparedFilter {
                text: None,
                rest: filter.clone(),
            });
        };

        let search = match text {
            Bson::Document(d) => d.get_str("$search").map_err(|_| {
                DeckError::Database("$text requires a $search string".to_string())
            })?,
            _ => return Err(DeckError::Database("$text expects an object".to_string())),
        };
        let fields = self
            .text_indexes
            .get(collection)
            .map(|f| f.clone())
            .ok_or_else(|| DeckError::Database("text index required for $text query".to_string()))?;

        let mut rest = filter.clone();
        rest.remove("$text");
        Ok(PreparedFilter {
            text: Some((fields, search.to_string())),
            rest,
        })
    }

    pub fn count(&self, collection: &str, filter: &Document) -> DeckResult<u64> {
        let filter = self.prepare(collection, filter)?;
        let Some(docs) = self.collections.get(collection) else {
            return Ok(0);
        };

        let mut n = 0;
        for doc in docs.iter() {
            if filter.matches(doc)? {
                n += 1;
            }
        }
        Ok(n)
    }

    pub fn find(
        &self,
        collection: &str,
        filter: &Document,
        skip: u64,
        limit: Option<i64>,
    ) -> DeckResult<Vec<Document>> {
        let filter = self.prepare(collection, filter)?;
        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        // Same as the server: 0 means no limit, negative means abs(limit)
        let limit = match limit {
            None | Some(0) => usize::MAX,
            Some(n) => n.unsigned_abs() as usize,
        };

        let mut out = Vec::new();
        let mut skipped = 0u64;
        for doc in docs.iter() {
            if out.len() >= limit {
                break;
            }
            if !filter.matches(doc)? {
                continue;
            }
            if skipped < skip {
                skipped += 1;
                continue;
            }
            out.push(doc.clone());
        }
        Ok(out)
    }

    pub fn insert_one(&self, collection: &str, doc: Document) -> DeckResult<Bson> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();

        let (id, doc) = match doc.get("_id") {
            Some(id) => (id.clone(), doc),
            None => {
                // The server puts a generated _id first
                let id = Bson::ObjectId(ObjectId::new());
                let mut with_id = Document::new();
                with_id.insert("_id", id.clone());
                for (key, value) in doc {
                    with_id.insert(key, value);
                }
                (id, with_id)
            }
        };

        let duplicate = docs
            .iter()
            .any(|existing| existing.get("_id").is_some_and(|e| bson_eq(e, &id)));
        if duplicate {
            return Err(DeckError::Database(format!(
                "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: {} }}",
                collection, id
            )));
        }

        docs.push(doc);
        Ok(id)
    }

    pub fn update(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
        many: bool,
    ) -> DeckResult<UpdateOutcome> {
        let filter = self.prepare(collection, filter)?;
        let mut outcome = UpdateOutcome::default();
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(outcome);
        };

        for doc in docs.iter_mut() {
            if !filter.matches(doc)? {
                continue;
            }

            // Validate against a copy so a failing path leaves the document untouched
            let mut updated = doc.clone();
            let changed = apply_set(&mut updated, set)?;
            outcome.matched += 1;
            if changed {
                *doc = updated;
                outcome.modified += 1;
            }

            if !many {
                break;
            }
        }

        Ok(outcome)
    }

    pub fn delete_one(&self, collection: &str, filter: &Document) -> DeckResult<u64> {
        let filter = self.prepare(collection, filter)?;
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut position = None;
        for (i, doc) in docs.iter().enumerate() {
            if filter.matches(doc)? {
                position = Some(i);
                break;
            }
        }

        match position {
            Some(i) => {
                docs.remove(i);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
