//! # Database Module (Deck-Store)
//!
//! A thin facade over the document database. Every operation is a direct,
//! unsynchronized delegation to the backend:
//!
//! - **MongoDB**: the official driver. The `Client` keeps its own connection
//!   pool, so one store is shared by every request.
//! - **In-memory**: a process-local collection map used by `--memory` mode
//!   and by the test suite.

use crate::error::{DeckError, DeckResult};
use crate::memory::MemoryBackend;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::results::CollectionType;
use mongodb::{Client, Collection, Database};
use serde::Serialize;
use tracing::{debug, info};

/// Database used when the connection string names none
pub const DEFAULT_DATABASE: &str = "test";

/// Collection descriptor returned by the listing endpoint
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Outcome of an update call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

enum Backend {
    Mongo(Database),
    Memory(MemoryBackend),
}

/// The Deck-Store: one handle shared by all handlers
pub struct DeckStore {
    backend: Backend,
    database: String,
}

impl DeckStore {
    /// Connects to MongoDB
    ///
    /// # Arguments
    /// * `uri` - MongoDB connection string
    /// * `database` - Overrides the database named in the connection string
    ///
    /// The driver connects lazily; call [`DeckStore::ping`] to verify the
    /// server is reachable.
    pub async fn connect(uri: &str, database: Option<&str>) -> DeckResult<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| DeckError::Database(format!("Invalid connection string: {}", e)))?;
        options
            .app_name
            .get_or_insert_with(|| "mongodeck".to_string());

        let client = Client::with_options(options)?;
        let db = match database {
            Some(name) => client.database(name),
            None => client
                .default_database()
                .unwrap_or_else(|| client.database(DEFAULT_DATABASE)),
        };

        info!("Using MongoDB database: {}", db.name());

        Ok(Self {
            database: db.name().to_string(),
            backend: Backend::Mongo(db),
        })
    }

    /// Creates an in-memory store (useful for testing)
    pub async fn in_memory(database: &str) -> DeckResult<Self> {
        Ok(Self::from_memory(MemoryBackend::new(), database))
    }

    /// Wraps a prepared in-memory backend
    pub fn from_memory(backend: MemoryBackend, database: &str) -> Self {
        info!("Initializing in-memory store '{}'", database);

        Self {
            backend: Backend::Memory(backend),
            database: database.to_string(),
        }
    }

    /// Name of the database being browsed
    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Check if store is in-memory
    pub fn is_in_memory(&self) -> bool {
        matches!(self.backend, Backend::Memory(_))
    }

    fn collection(db: &Database, name: &str) -> Collection<Document> {
        db.collection::<Document>(name)
    }

    /// Round-trips a `ping` command to the server
    pub async fn ping(&self) -> DeckResult<()> {
        match &self.backend {
            Backend::Mongo(db) => {
                db.run_command(doc! { "ping": 1 }, None).await?;
                Ok(())
            }
            Backend::Memory(_) => Ok(()),
        }
    }

    /// Lists every collection in the database, sorted by name
    pub async fn list_collections(&self) -> DeckResult<Vec<CollectionInfo>> {
        let mut collections: Vec<CollectionInfo> = match &self.backend {
            Backend::Mongo(db) => {
                let specs: Vec<_> = db.list_collections(None, None).await?.try_collect().await?;
                specs
                    .into_iter()
                    .map(|spec| CollectionInfo {
                        kind: match spec.collection_type {
                            CollectionType::View => "view",
                            CollectionType::Timeseries => "timeseries",
                            _ => "collection",
                        }
                        .to_string(),
                        name: spec.name,
                    })
                    .collect()
            }
            Backend::Memory(mem) => mem
                .collection_names()
                .into_iter()
                .map(|name| CollectionInfo {
                    name,
                    kind: "collection".to_string(),
                })
                .collect(),
        };

        collections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(collections)
    }

    /// Counts documents matching a filter
    pub async fn count(&self, collection: &str, filter: Document) -> DeckResult<u64> {
        match &self.backend {
            Backend::Mongo(db) => Ok(Self::collection(db, collection)
                .count_documents(filter, None)
                .await?),
            Backend::Memory(mem) => mem.count(collection, &filter),
        }
    }

    /// Finds a page of documents in natural order
    ///
    /// `limit` of `None` returns everything after `skip`.
    pub async fn find(
        &self,
        collection: &str,
        filter: Document,
        skip: u64,
        limit: Option<i64>,
    ) -> DeckResult<Vec<Document>> {
        debug!(collection, skip, ?limit, "find");

        match &self.backend {
            Backend::Mongo(db) => {
                let options = FindOptions::builder().skip(skip).limit(limit).build();
                let docs = Self::collection(db, collection)
                    .find(filter, options)
                    .await?
                    .try_collect()
                    .await?;
                Ok(docs)
            }
            Backend::Memory(mem) => mem.find(collection, &filter, skip, limit),
        }
    }

    /// Finds the first document matching a filter
    pub async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> DeckResult<Option<Document>> {
        match &self.backend {
            Backend::Mongo(db) => Ok(Self::collection(db, collection)
                .find_one(filter, None)
                .await?),
            Backend::Memory(mem) => Ok(mem.find(collection, &filter, 0, Some(1))?.pop()),
        }
    }

    /// Whether the collection carries a text index usable by `$text`
    pub async fn has_text_index(&self, collection: &str) -> DeckResult<bool> {
        match &self.backend {
            Backend::Mongo(db) => {
                let cursor = match Self::collection(db, collection).list_indexes(None).await {
                    Ok(cursor) => cursor,
                    Err(e) => {
                        // Missing collections have no indexes at all
                        debug!("list_indexes on {} failed: {}", collection, e);
                        return Ok(false);
                    }
                };
                let indexes: Vec<_> = cursor.try_collect().await?;
                Ok(indexes.iter().any(|index| {
                    index
                        .keys
                        .values()
                        .any(|v| matches!(v, Bson::String(s) if s == "text"))
                }))
            }
            Backend::Memory(mem) => Ok(mem.has_text_index(collection)),
        }
    }

    /// Inserts one document, returning its `_id`
    pub async fn insert_one(&self, collection: &str, doc: Document) -> DeckResult<Bson> {
        match &self.backend {
            Backend::Mongo(db) => Ok(Self::collection(db, collection)
                .insert_one(doc, None)
                .await?
                .inserted_id),
            Backend::Memory(mem) => mem.insert_one(collection, doc),
        }
    }

    /// Applies `$set` to the first matching document
    pub async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        set: Document,
    ) -> DeckResult<UpdateOutcome> {
        match &self.backend {
            Backend::Mongo(db) => {
                let result = Self::collection(db, collection)
                    .update_one(filter, doc! { "$set": set }, None)
                    .await?;
                Ok(UpdateOutcome {
                    matched: result.matched_count,
                    modified: result.modified_count,
                })
            }
            Backend::Memory(mem) => mem.update(collection, &filter, &set, false),
        }
    }

    /// Applies `$set` to every matching document
    pub async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        set: Document,
    ) -> DeckResult<UpdateOutcome> {
        match &self.backend {
            Backend::Mongo(db) => {
                let result = Self::collection(db, collection)
                    .update_many(filter, doc! { "$set": set }, None)
                    .await?;
                Ok(UpdateOutcome {
                    matched: result.matched_count,
                    modified: result.modified_count,
                })
            }
            Backend::Memory(mem) => mem.update(collection, &filter, &set, true),
        }
    }

    /// Deletes the first matching document, returning the deleted count
    pub async fn delete_one(&self, collection: &str, filter: Document) -> DeckResult<u64> {
        match &self.backend {
            Backend::Mongo(db) => Ok(Self::collection(db, collection)
                .delete_one(filter, None)
                .await?
                .deleted_count),
            Backend::Memory(mem) => mem.delete_one(collection, &filter),
        }
    }
}
