//! # Deck-Explorer
//!
//! Serves the browser UI for every path that is not an API route.
//!
//! - When `<frontend_dir>/index.html` exists, static files are served from
//!   that directory and unknown paths fall back to `index.html` so the SPA
//!   router can take over.
//! - Otherwise a small embedded viewer is served instead, so a bare binary
//!   is still usable.

use axum::{
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Router,
};
use std::path::Path;
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

/// Attaches the frontend as the router's fallback
pub fn with_frontend<S>(router: Router<S>, frontend_dir: Option<&Path>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    match frontend_dir {
        Some(dir) if dir.join("index.html").is_file() => {
            info!("🖥️  Serving frontend from {}", dir.display());
            let spa = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
            router.fallback_service(spa)
        }
        Some(dir) => {
            info!(
                "🖥️  No frontend build in {}, serving the built-in viewer",
                dir.display()
            );
            router.fallback(serve_viewer)
        }
        None => router.fallback(serve_viewer),
    }
}

/// Serves the viewer for page routes; asset-looking paths get a plain 404
async fn serve_viewer(uri: Uri) -> Response {
    let looks_like_file = uri
        .path()
        .rsplit('/')
        .next()
        .is_some_and(|last| last.contains('.'));

    if looks_like_file {
        (StatusCode::NOT_FOUND, "Not Found").into_response()
    } else {
        Html(viewer_html()).into_response()
    }
}

/// Built-in collection viewer
pub fn viewer_html() -> &'static str {
    r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>MongoDeck</title>
    <style>
        :root {
            --bg: #0a0a0f;
            --card: #12121a;
            --border: #1f1f2e;
            --primary: #6366f1;
            --primary-glow: rgba(99, 102, 241, 0.2);
            --text: #e4e4e7;
            --text-muted: #71717a;
            --success: #10b981;
            --error: #ef4444;
        }

        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: 'Inter', -apple-system, BlinkMacSystemFont, sans-serif;
            background: var(--bg);
            color: var(--text);
            min-height: 100vh;
            display: flex;
        }

        aside {
            width: 260px;
            border-right: 1px solid var(--border);
            padding: 1.5rem 1rem;
            overflow-y: auto;
        }

        .logo { font-size: 1.25rem; font-weight: 700; margin-bottom: 0.25rem; }
        .db-name { color: var(--text-muted); font-size: 0.8rem; margin-bottom: 1.5rem; }

        .coll {
            display: flex;
            justify-content: space-between;
            padding: 0.5rem 0.75rem;
            border-radius: 0.5rem;
            cursor: pointer;
            font-size: 0.9rem;
        }
        .coll:hover, .coll.active { background: var(--primary-glow); }
        .coll .kind { color: var(--text-muted); font-size: 0.75rem; }

        main { flex: 1; padding: 1.5rem 2rem; overflow-x: auto; }

        .toolbar {
            display: flex;
            gap: 0.75rem;
            align-items: center;
            margin-bottom: 1.25rem;
            flex-wrap: wrap;
        }
        .toolbar h2 { font-size: 1.25rem; margin-right: auto; }

        input, select, textarea {
            background: var(--card);
            border: 1px solid var(--border);
            color: var(--text);
            border-radius: 0.5rem;
            padding: 0.4rem 0.6rem;
            font-family: inherit;
        }
        textarea { width: 100%; min-height: 220px; font-family: 'JetBrains Mono', monospace; font-size: 0.8rem; }

        .btn {
            background: var(--primary);
            color: white;
            border: none;
            padding: 0.4rem 0.9rem;
            border-radius: 0.5rem;
            cursor: pointer;
            font-size: 0.85rem;
        }
        .btn.ghost { background: transparent; border: 1px solid var(--border); color: var(--text); }
        .btn:disabled { opacity: 0.4; cursor: default; }

        .doc {
            background: var(--card);
            border: 1px solid var(--border);
            border-radius: 0.75rem;
            padding: 1rem;
            margin-bottom: 0.75rem;
            font-family: 'JetBrains Mono', monospace;
            font-size: 0.8rem;
        }
        .doc-actions { display: flex; justify-content: flex-end; gap: 0.5rem; margin-bottom: 0.5rem; }

        details { margin-left: 1rem; }
        summary { cursor: pointer; color: var(--text-muted); }
        .kv { margin-left: 1rem; }
        .key { color: #a5b4fc; }
        .string { color: #86efac; }
        .number { color: #fcd34d; }
        .literal { color: #f9a8d4; }

        .status { color: var(--text-muted); font-size: 0.85rem; }
        .error { color: var(--error); }
        .empty { color: var(--text-muted); padding: 3rem; text-align: center; }
    </style>
</head>
<body>
    <aside>
        <div class="logo">🍃 MongoDeck</div>
        <div class="db-name" id="db-name">connecting...</div>
        <div id="collections"></div>
    </aside>
    <main>
        <div class="toolbar">
            <h2 id="title">Select a collection</h2>
            <input id="search" placeholder="Search..." disabled>
            <select id="page-size">
                <option>10</option>
                <option>25</option>
                <option>50</option>
                <option>100</option>
            </select>
            <button class="btn ghost" id="prev" disabled>‹ Prev</button>
            <span class="status" id="range"></span>
            <button class="btn ghost" id="next" disabled>Next ›</button>
            <button class="btn" id="export" disabled>Export page</button>
        </div>
        <div id="documents"><div class="empty">No collection selected</div></div>
    </main>

    <script>
        const API = '/api';
        const state = { collection: null, skip: 0, limit: 10, total: 0, query: '', docs: [] };

        const $ = (id) => document.getElementById(id);

        async function api(path, options) {
            const res = await fetch(API + path, options);
            const body = await res.json();
            if (!res.ok || body.success === false) {
                throw new Error(body.error || body.message || res.statusText);
            }
            return body;
        }

        function escapeHtml(text) {
            return String(text)
                .replace(/&/g, '&amp;')
                .replace(/</g, '&lt;')
                .replace(/>/g, '&gt;');
        }

        function renderValue(value) {
            if (value === null) return '<span class="literal">null</span>';
            if (Array.isArray(value)) {
                if (value.length === 0) return '[]';
                return `<details><summary>Array(${value.length})</summary>` +
                    value.map((v, i) => `<div class="kv"><span class="key">${i}</span>: ${renderValue(v)}</div>`).join('') +
                    '</details>';
            }
            if (typeof value === 'object') {
                const keys = Object.keys(value);
                if (keys.length === 0) return '{}';
                return `<details><summary>{${keys.length} fields}</summary>` +
                    keys.map(k => `<div class="kv"><span class="key">${escapeHtml(k)}</span>: ${renderValue(value[k])}</div>`).join('') +
                    '</details>';
            }
            if (typeof value === 'string') return `<span class="string">"${escapeHtml(value)}"</span>`;
            if (typeof value === 'number') return `<span class="number">${value}</span>`;
            return `<span class="literal">${value}</span>`;
        }

        async function loadCollections() {
            try {
                const body = await api('/collections');
                $('db-name').textContent = `${body.database} · ${body.count} collections`;
                $('collections').innerHTML = body.collections.map(c => `
                    <div class="coll" data-name="${escapeHtml(c.name)}">
                        <span>${escapeHtml(c.name)}</span>
                        <span class="kind">${c.type}</span>
                    </div>`).join('');
                document.querySelectorAll('.coll').forEach(el => {
                    el.onclick = () => selectCollection(el.dataset.name);
                });
            } catch (e) {
                $('db-name').innerHTML = `<span class="error">${escapeHtml(e.message)}</span>`;
            }
        }

        function selectCollection(name) {
            state.collection = name;
            state.skip = 0;
            state.query = '';
            $('search').value = '';
            $('search').disabled = false;
            document.querySelectorAll('.coll').forEach(el => {
                el.classList.toggle('active', el.dataset.name === name);
            });
            loadDocuments();
        }

        async function loadDocuments() {
            const name = encodeURIComponent(state.collection);
            const page = `limit=${state.limit}&skip=${state.skip}`;
            const path = state.query
                ? `/collections/${name}/search?q=${encodeURIComponent(state.query)}&${page}`
                : `/collections/${name}/data?${page}`;

            try {
                const body = await api(path);
                state.docs = body.data;
                state.total = body.pagination.total;
                renderDocuments();
            } catch (e) {
                $('documents').innerHTML = `<div class="empty error">${escapeHtml(e.message)}</div>`;
            }
        }

        function renderDocuments() {
            $('title').textContent = `${state.collection} (${state.total})`;
            const end = state.skip + state.docs.length;
            $('range').textContent = state.total ? `${state.skip + 1}-${end} of ${state.total}` : '0 of 0';
            $('prev').disabled = state.skip === 0;
            $('next').disabled = end >= state.total;
            $('export').disabled = state.docs.length === 0;

            if (state.docs.length === 0) {
                $('documents').innerHTML = '<div class="empty">No documents</div>';
                return;
            }

            $('documents').innerHTML = state.docs.map((doc, i) => `
                <div class="doc" id="doc-${i}">
                    <div class="doc-actions">
                        <button class="btn ghost" onclick="editDocument(${i})">Edit</button>
                    </div>
                    <div class="body">${Object.keys(doc).map(k =>
                        `<div><span class="key">${escapeHtml(k)}</span>: ${renderValue(doc[k])}</div>`).join('')}
                    </div>
                </div>`).join('');
        }

        // Untouched fields stay out of the $set so their BSON types survive
        function changedFields(original, edited) {
            const changes = {};
            for (const key of Object.keys(edited)) {
                if (key === '_id') continue;
                if (JSON.stringify(edited[key]) !== JSON.stringify(original[key])) {
                    changes[key] = edited[key];
                }
            }
            return changes;
        }

        function editDocument(i) {
            const doc = state.docs[i];
            const card = $(`doc-${i}`);
            card.innerHTML = `
                <textarea>${escapeHtml(JSON.stringify(doc, null, 2))}</textarea>
                <div class="doc-actions" style="margin-top: 0.5rem;">
                    <span class="status error"></span>
                    <button class="btn ghost">Cancel</button>
                    <button class="btn">Save</button>
                </div>`;
            const [cancel, save] = card.querySelectorAll('button');
            cancel.onclick = renderDocuments;
            save.onclick = async () => {
                try {
                    const edited = JSON.parse(card.querySelector('textarea').value);
                    const changes = changedFields(doc, edited);
                    if (Object.keys(changes).length === 0) {
                        renderDocuments();
                        return;
                    }
                    await api(`/collections/${encodeURIComponent(state.collection)}/data/${encodeURIComponent(doc._id)}`, {
                        method: 'PUT',
                        headers: { 'Content-Type': 'application/json' },
                        body: JSON.stringify(changes),
                    });
                    loadDocuments();
                } catch (e) {
                    card.querySelector('.status').textContent = e.message;
                }
            };
        }

        function exportPage() {
            const blob = new Blob([JSON.stringify(state.docs, null, 2)], { type: 'application/json' });
            const link = document.createElement('a');
            link.href = URL.createObjectURL(blob);
            link.download = `${state.collection}-${state.skip}.json`;
            link.click();
            URL.revokeObjectURL(link.href);
        }

        let searchTimer;
        $('search').oninput = (e) => {
            clearTimeout(searchTimer);
            searchTimer = setTimeout(() => {
                state.query = e.target.value.trim();
                state.skip = 0;
                loadDocuments();
            }, 300);
        };
        $('page-size').onchange = (e) => {
            state.limit = Number(e.target.value);
            state.skip = 0;
            if (state.collection) loadDocuments();
        };
        $('prev').onclick = () => { state.skip = Math.max(0, state.skip - state.limit); loadDocuments(); };
        $('next').onclick = () => { state.skip += state.limit; loadDocuments(); };
        $('export').onclick = exportPage;

        loadCollections();
    </script>
</body>
</html>"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::util::ServiceExt;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn base() -> Router {
        Router::new().route("/api/ping", get(|| async { "pong" }))
    }

    #[tokio::test]
    async fn test_spa_fallback_to_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>spa</html>").unwrap();
        std::fs::create_dir(dir.path().join("static")).unwrap();
        std::fs::write(dir.path().join("static/app.js"), "console.log(1)").unwrap();

        let app = with_frontend(base(), Some(dir.path()));

        let (status, body) = get_body(app.clone(), "/collections/users").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<html>spa</html>");

        let (_, body) = get_body(app.clone(), "/static/app.js").await;
        assert_eq!(body, "console.log(1)");

        let (_, body) = get_body(app, "/api/ping").await;
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn test_builtin_viewer_without_build() {
        let dir = tempfile::tempdir().unwrap();
        let app = with_frontend(base(), Some(dir.path()));

        let (status, body) = get_body(app.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("MongoDeck"));
        // Edits send only the changed keys
        assert!(body.contains("body: JSON.stringify(changes)"));

        let (status, _) = get_body(app, "/static/missing.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
