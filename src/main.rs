//! # 🍃 MongoDeck
//!
//! Browse and edit the collections of a MongoDB database from the browser.
//!
//! ## Quick Start
//!
//! ```bash
//! # Browse the database named in the connection string
//! mongodeck --mongodb-uri mongodb://localhost:27017/expressapp
//!
//! # Pick a database and port explicitly
//! mongodeck --database shop --port 8080
//!
//! # In-memory mode (no MongoDB needed)
//! mongodeck --memory
//! ```
//!
//! ## API Usage
//!
//! ```bash
//! # List collections
//! curl http://localhost:3000/api/collections
//!
//! # Second page of users, 25 per page
//! curl "http://localhost:3000/api/collections/users/data?limit=25&skip=25"
//!
//! # Update one document
//! curl -X PUT http://localhost:3000/api/collections/users/data/65a1b2c3d4e5f60718293a4b \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Alice"}'
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mongodeck::api::{create_router, AppState};
use mongodeck::config::Config;
use mongodeck::db::DeckStore;
use mongodeck::scripts::ScriptRunner;

fn print_banner(config: &Config, store: &DeckStore) {
    println!(
        r#"
╔══════════════════════════════════════════════════════════════════╗
║                                                                  ║
║   🍃  MongoDeck                                                  ║
║                                                                  ║
║   Collection browser & editor                                    ║
║                                                                  ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║   🌐 API:      http://localhost:{:<5}/api                        ║
║   📊 Viewer:   http://localhost:{:<5}                            ║
║   💾 Database: {:<46} ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#,
        config.port,
        config.port,
        if store.is_in_memory() { ":memory:" } else { store.database_name() }
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("👋 Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = Config::parse();

    // Initialize store
    let store = if config.memory {
        info!("🧪 Using in-memory store");
        Arc::new(DeckStore::in_memory(config.database.as_deref().unwrap_or("expressapp")).await?)
    } else {
        let store = DeckStore::connect(&config.mongodb_uri, config.database.as_deref())
            .await
            .context("Failed to configure MongoDB client")?;
        // Keep serving so the viewer can report the outage
        match store.ping().await {
            Ok(()) => info!("✅ Connected to MongoDB"),
            Err(e) => warn!("⚠️  MongoDB is not reachable yet: {}", e),
        }
        Arc::new(store)
    };

    let scripts = ScriptRunner::new(
        &config.scripts_dir,
        config.interpreter.clone(),
        config.script_timeout(),
    );

    let state = AppState::new(Arc::clone(&store), scripts).with_frontend(&config.frontend_dir);
    let app = create_router(state);

    print_banner(&config, &store);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("🚀 MongoDeck listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
