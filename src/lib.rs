//! # 🍃 MongoDeck
//!
//! A generic browser and editor for the collections of one MongoDB
//! database, exposed as a JSON API with a bundled web viewer.
//!
//! ## Core Components
//!
//! - **Deck-API**: HTTP routes via Axum
//! - **Deck-Store**: MongoDB (or in-memory) document access
//! - **Schema Sampler (Inference)**: Infers field types from sample documents
//! - **Guard**: Validates collection and script names
//! - **Query**: Id/search filters and the in-memory filter evaluator
//! - **Deck-Explorer**: Serves the SPA build or the built-in viewer
//! - **Scripts**: Runs helper scripts as child processes

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod explorer;
pub mod format;
pub mod guard;
pub mod inference;
pub mod memory;
pub mod query;
pub mod scripts;

pub use error::{DeckError, DeckResult};
