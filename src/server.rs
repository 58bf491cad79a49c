//! Preview backend: HTTP API, iframe rendering and the HMR channel.
//!
//! Built on `tiny_http` with `tungstenite` for the WebSocket leg, following
//! a Stopped → Starting → Serving → Stopped lifecycle: [`Backend::start`]
//! seeds the snapshot store and binds the port, [`Backend::serve`] runs the
//! blocking request loop on the calling thread, and [`Backend::stop`]
//! unblocks it (wired to Ctrl+C by the caller).
//!
//! Routes:
//!
//! - `GET /api/stories` — stories grouped by display-name category, JSON
//! - `GET /iframe/<id>` — self-contained preview document for one story
//! - `GET /__hmr` — WebSocket upgrade; server-to-client reload pushes only
//! - anything else — the embedded workspace index page
//!
//! Request handlers only ever read the current [`SnapshotStore`] value;
//! a reload cycle landing mid-request cannot tear the triple.

use crate::{bundler, html, log, state::SnapshotStore, story::StoryDescriptor};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    io::Cursor,
    net::SocketAddr,
    sync::Arc,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tungstenite::{Message, WebSocket, handshake::derive_accept_key, protocol::Role};

/// Workspace shell served for non-API routes (embedded at compile time)
const INDEX_TEMPLATE: &str = include_str!("embed/index.html");

/// WebSocket upgrade path for the HMR channel
const HMR_PATH: &str = "/__hmr";

// ============================================================================
// HMR Clients
// ============================================================================

type WsStream = Box<dyn tiny_http::ReadWrite + Send>;

/// Server-to-client HMR notifications. Clients send nothing meaningful.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum HmrMessage {
    Reload,
}

/// Registry of connected preview surfaces.
///
/// Sockets are only ever written to; a client whose send fails is assumed
/// gone and dropped from the registry instead of propagating the error.
#[derive(Default)]
pub struct HmrClients {
    sockets: Mutex<Vec<WebSocket<WsStream>>>,
}

impl HmrClients {
    fn register(&self, socket: WebSocket<WsStream>) {
        self.sockets.lock().push(socket);
        log!("hmr"; "client connected");
    }

    /// Broadcast a reload notification to every connected client.
    pub fn notify_reload(&self) {
        let message = serde_json::to_string(&HmrMessage::Reload)
            .unwrap_or_else(|_| String::from(r#"{"type":"reload"}"#));

        let mut sockets = self.sockets.lock();
        let before = sockets.len();
        sockets.retain_mut(|socket| socket.send(Message::text(message.clone())).is_ok());

        let dropped = before - sockets.len();
        if dropped > 0 {
            log!("hmr"; "{dropped} client(s) disconnected");
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

pub struct Backend {
    server: Arc<Server>,
    state: Arc<SnapshotStore>,
    clients: Arc<HmrClients>,
    addr: SocketAddr,
}

impl Backend {
    /// Bind the port and capture the initial state (Stopped → Starting).
    ///
    /// # Errors
    /// A bind failure is unrecoverable for this process and propagates.
    pub fn start(
        state: Arc<SnapshotStore>,
        clients: Arc<HmrClients>,
        port: u16,
    ) -> Result<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let server =
            Server::http(addr).map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}"))?;

        Ok(Self {
            server: Arc::new(server),
            state,
            clients,
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle for unblocking the serve loop from another thread.
    pub fn handle(&self) -> Arc<Server> {
        Arc::clone(&self.server)
    }

    /// Run the blocking request loop (Starting → Serving). Returns when
    /// the server is unblocked (Serving → Stopped).
    pub fn serve(&self) -> Result<()> {
        log!("serve"; "http://{}", self.addr);

        for request in self.server.incoming_requests() {
            if let Err(e) = self.handle_request(request) {
                log!("serve"; "request error: {e:#}");
            }
        }

        Ok(())
    }

    /// Unblock the serve loop (→ Stopped).
    pub fn stop(&self) {
        self.server.unblock();
    }

    // ------------------------------------------------------------------------
    // Request Handling
    // ------------------------------------------------------------------------

    fn handle_request(&self, request: Request) -> Result<()> {
        let url = request.url().to_owned();
        let path = strip_query(&url);

        if path == "/api/stories" {
            return self.handle_story_listing(request);
        }
        if let Some(raw_id) = path.strip_prefix("/iframe/") {
            let id = urlencoding::decode(raw_id)
                .map(std::borrow::Cow::into_owned)
                .unwrap_or_else(|_| raw_id.to_owned());
            return self.handle_iframe(request, &id);
        }
        if path == HMR_PATH {
            return self.handle_hmr_upgrade(request);
        }

        respond_html(request, INDEX_TEMPLATE.to_owned())
    }

    fn handle_story_listing(&self, request: Request) -> Result<()> {
        let snapshot = self.state.current();
        let listing = story_listing(&snapshot.stories);
        let body = serde_json::to_string(&listing).context("Failed to serialize story listing")?;

        let response = Response::from_string(body).with_header(
            Header::from_bytes("Content-Type", "application/json; charset=utf-8").unwrap(),
        );
        request.respond(response)?;
        Ok(())
    }

    fn handle_iframe(&self, request: Request, story_id: &str) -> Result<()> {
        let snapshot = self.state.current();

        // Unknown id is answered before any bundling work starts
        let Some(story) = snapshot.stories.get(story_id) else {
            return respond_plain(request, 404, "Story not found");
        };

        let Some(source_path) = &story.source_path else {
            return respond_plain(
                request,
                500,
                &format!("Story `{}` has no recorded source path", story.name),
            );
        };

        match bundler::bundle_for_browser(source_path, &snapshot.project_root, &story.id) {
            Ok(bundle) => {
                let document = html::iframe_document(&snapshot.css, &bundle);
                respond_no_cache_html(request, document)
            }
            Err(e) => respond_plain(request, 500, &format!("Failed to bundle story: {e:#}")),
        }
    }

    /// Upgrade `/__hmr` to a WebSocket and register the client.
    fn handle_hmr_upgrade(&self, request: Request) -> Result<()> {
        let Some(key) = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("Sec-WebSocket-Key"))
            .map(|h| h.value.as_str().to_owned())
        else {
            return respond_plain(request, 400, "WebSocket upgrade failed");
        };

        let accept = derive_accept_key(key.as_bytes());
        let response = Response::empty(StatusCode(101))
            .with_header(Header::from_bytes("Upgrade", "websocket").unwrap())
            .with_header(Header::from_bytes("Connection", "Upgrade").unwrap())
            .with_header(Header::from_bytes("Sec-WebSocket-Accept", accept).unwrap());

        let stream = request.upgrade("websocket", response);
        let socket = WebSocket::from_raw_socket(stream, Role::Server, None);
        self.clients.register(socket);
        Ok(())
    }
}

// ============================================================================
// Story Listing
// ============================================================================

#[derive(Debug, Serialize, PartialEq, Eq)]
struct StoryListing {
    name: String,
    path: String,
}

/// Group stories by the category before the first `/` of their display
/// name. Names without a separator are skipped entirely. Categories come
/// out lexicographically sorted (BTreeMap), entries sorted by name.
fn story_listing(stories: &HashMap<String, StoryDescriptor>) -> BTreeMap<String, Vec<StoryListing>> {
    let mut categories: BTreeMap<String, Vec<StoryListing>> = BTreeMap::new();

    for story in stories.values() {
        let Some((category, name)) = story.name.split_once('/') else {
            continue;
        };
        if category.is_empty() || name.is_empty() {
            continue;
        }
        categories.entry(category.to_owned()).or_default().push(StoryListing {
            name: name.to_owned(),
            path: story.id.clone(),
        });
    }

    for entries in categories.values_mut() {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
    }
    categories
}

/// Strip the query string from a request URL.
fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

// ============================================================================
// Response Helpers
// ============================================================================

fn respond_html(request: Request, content: String) -> Result<()> {
    let response = Response::from_string(content)
        .with_header(Header::from_bytes("Content-Type", "text/html; charset=utf-8").unwrap());
    request.respond(response)?;
    Ok(())
}

/// Serve an iframe document with caching disabled; the artifact is rebuilt
/// fresh per request.
fn respond_no_cache_html(request: Request, content: String) -> Result<()> {
    let response = Response::from_string(content)
        .with_header(Header::from_bytes("Content-Type", "text/html; charset=utf-8").unwrap())
        .with_header(
            Header::from_bytes("Cache-Control", "no-cache, no-store, must-revalidate").unwrap(),
        )
        .with_header(Header::from_bytes("Pragma", "no-cache").unwrap())
        .with_header(Header::from_bytes("Expires", "0").unwrap());
    request.respond(response)?;
    Ok(())
}

fn respond_plain(request: Request, status: u16, body: &str) -> Result<()> {
    let response = Response::new(
        StatusCode(status),
        vec![Header::from_bytes("Content-Type", "text/plain").unwrap()],
        Cursor::new(body.as_bytes().to_vec()),
        Some(body.len()),
        None,
    );
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
