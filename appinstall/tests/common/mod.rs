//! Shared fixtures for integration tests.
//!
//! [`TestServer`] is an in-process [`HttpClient`] that serves scripted routes
//! and supports the fault injection the lifecycle tests need:
//! - `cork` / `uncork`: bodies stop after their first chunk until uncorked
//! - `fail` / `unfail`: new requests are refused and in-flight bodies drop
//! - per-route status overrides
//! - truncated bodies that end before their declared length

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use appinstall::events::InstallEvent;
use appinstall::http::{BoxFuture, ByteStream, HttpClient, HttpResponse, TransportError};
use appinstall::manager::{AppId, InstallState};

/// Bytes per body chunk.
pub const CHUNK: usize = 1024;

/// How long helpers wait for an event before failing the test.
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default)]
struct Mode {
    corked: bool,
    failing: bool,
}

#[derive(Debug, Clone)]
struct Route {
    status: u16,
    content_type: Option<String>,
    body: Bytes,
    honor_range: bool,
    /// Bytes of the body actually sent, counted from the response start.
    cut_after: Option<usize>,
}

#[derive(Default)]
struct ServerState {
    routes: HashMap<String, Route>,
    requests: Vec<(String, Option<u64>)>,
}

/// Scripted origin server.
#[derive(Clone)]
pub struct TestServer {
    state: Arc<Mutex<ServerState>>,
    mode: Arc<watch::Sender<Mode>>,
}

impl TestServer {
    pub fn new() -> Self {
        let (mode, _) = watch::channel(Mode::default());
        Self {
            state: Arc::new(Mutex::new(ServerState::default())),
            mode: Arc::new(mode),
        }
    }

    fn route(&self, url: &str, route: Route) {
        self.state.lock().routes.insert(url.to_string(), route);
    }

    /// Serve a manifest document.
    pub fn manifest(&self, url: &str, json: &str) {
        self.route(
            url,
            Route {
                status: 200,
                content_type: Some("application/x-web-app-manifest+json".to_string()),
                body: Bytes::copy_from_slice(json.as_bytes()),
                honor_range: false,
                cut_after: None,
            },
        );
    }

    /// Serve a body with an arbitrary content type.
    pub fn document(&self, url: &str, content_type: &str, body: &[u8]) {
        self.route(
            url,
            Route {
                status: 200,
                content_type: Some(content_type.to_string()),
                body: Bytes::copy_from_slice(body),
                honor_range: false,
                cut_after: None,
            },
        );
    }

    /// Serve a package archive that honors `Range` requests.
    pub fn archive(&self, url: &str, body: &[u8]) {
        self.route(
            url,
            Route {
                status: 200,
                content_type: Some("application/zip".to_string()),
                body: Bytes::copy_from_slice(body),
                honor_range: true,
                cut_after: None,
            },
        );
    }

    /// Serve an icon image.
    pub fn icon(&self, url: &str, body: &[u8]) {
        self.document(url, "image/png", body);
    }

    /// Answer every request for `url` with `status` and an empty body.
    pub fn status(&self, url: &str, status: u16) {
        if let Some(route) = self.state.lock().routes.get_mut(url) {
            route.status = status;
        }
    }

    /// Declare the full length for `url` but drop the connection after `len`
    /// body bytes.
    pub fn truncate(&self, url: &str, len: usize) {
        if let Some(route) = self.state.lock().routes.get_mut(url) {
            route.cut_after = Some(len);
        }
    }

    /// Make `url` ignore `Range` and always send the full body.
    pub fn ignore_range(&self, url: &str) {
        if let Some(route) = self.state.lock().routes.get_mut(url) {
            route.honor_range = false;
        }
    }

    pub fn cork(&self) {
        self.mode.send_modify(|mode| mode.corked = true);
    }

    pub fn uncork(&self) {
        self.mode.send_modify(|mode| mode.corked = false);
    }

    pub fn fail(&self) {
        self.mode.send_modify(|mode| mode.failing = true);
    }

    pub fn unfail(&self) {
        self.mode.send_modify(|mode| mode.failing = false);
    }

    /// Range offsets requested for `url`, in order. `0` means no range.
    pub fn offsets(&self, url: &str) -> Vec<u64> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(requested, _)| requested == url)
            .map(|(_, offset)| offset.unwrap_or(0))
            .collect()
    }

    fn respond(&self, url: &str, range_start: Option<u64>) -> Result<HttpResponse, TransportError> {
        let mut state = self.state.lock();
        state.requests.push((url.to_string(), range_start));

        if self.mode.borrow().failing {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let Some(route) = state.routes.get(url).cloned() else {
            return Ok(self.empty(404));
        };
        if route.status != 200 {
            return Ok(self.empty(route.status));
        }

        let offset = range_start.unwrap_or(0) as usize;
        let (status, body) = if route.honor_range && offset > 0 {
            if offset >= route.body.len() {
                return Ok(self.empty(416));
            }
            (206, route.body.slice(offset..))
        } else {
            (200, route.body.clone())
        };

        let content_length = Some(body.len() as u64);
        let body = match route.cut_after {
            Some(len) if len < body.len() => body.slice(..len),
            _ => body,
        };

        Ok(HttpResponse {
            status,
            content_type: route.content_type,
            content_length,
            body: self.stream(body),
        })
    }

    fn empty(&self, status: u16) -> HttpResponse {
        HttpResponse {
            status,
            content_type: None,
            content_length: Some(0),
            body: Box::pin(futures::stream::empty()),
        }
    }

    fn stream(&self, body: Bytes) -> ByteStream {
        let chunks: VecDeque<Bytes> = body
            .chunks(CHUNK)
            .map(Bytes::copy_from_slice)
            .collect();
        let state = BodyState {
            chunks,
            mode: self.mode.subscribe(),
            sent: 0,
            done: false,
        };

        Box::pin(futures::stream::unfold(state, |mut body| async move {
            if body.done {
                return None;
            }
            let chunk = body.chunks.pop_front()?;
            loop {
                let mode = *body.mode.borrow_and_update();
                if mode.failing {
                    body.done = true;
                    let error = TransportError::Body("connection reset".to_string());
                    return Some((Err(error), body));
                }
                if !(mode.corked && body.sent > 0) {
                    break;
                }
                if body.mode.changed().await.is_err() {
                    return None;
                }
            }
            body.sent += 1;
            Some((Ok(chunk), body))
        }))
    }
}

struct BodyState {
    chunks: VecDeque<Bytes>,
    mode: watch::Receiver<Mode>,
    sent: usize,
    done: bool,
}

impl HttpClient for TestServer {
    fn get(
        &self,
        url: &str,
        range_start: Option<u64>,
    ) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        let response = self.respond(url, range_start);
        Box::pin(async move { response })
    }
}

/// Deterministic archive contents of `len` bytes.
pub fn archive_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Wait for the first event matching `predicate`, returning everything
/// received up to and including it.
pub async fn wait_for<F>(
    events: &mut mpsc::UnboundedReceiver<InstallEvent>,
    mut predicate: F,
) -> Vec<InstallEvent>
where
    F: FnMut(&InstallEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, events.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for event; saw {:?}", seen))
            .expect("event channel closed");
        let matched = predicate(&event);
        seen.push(event);
        if matched {
            return seen;
        }
    }
}

/// Wait until `id` enters `state`.
pub async fn wait_for_state(
    events: &mut mpsc::UnboundedReceiver<InstallEvent>,
    id: &AppId,
    state: InstallState,
) -> Vec<InstallEvent> {
    wait_for(events, |event| {
        matches!(event, InstallEvent::StateChanged { id: event_id, current, .. }
            if event_id == id && *current == state)
    })
    .await
}

/// Wait until at least `bytes` of `id`'s archive have been reported.
pub async fn wait_for_progress(
    events: &mut mpsc::UnboundedReceiver<InstallEvent>,
    id: &AppId,
    bytes: u64,
) -> Vec<InstallEvent> {
    wait_for(events, |event| {
        matches!(event, InstallEvent::Progress { id: event_id, bytes_transferred, .. }
            if event_id == id && *bytes_transferred >= bytes)
    })
    .await
}

/// State transitions contained in `events`.
pub fn transitions(events: &[InstallEvent]) -> Vec<(InstallState, InstallState)> {
    events
        .iter()
        .filter_map(|event| match event {
            InstallEvent::StateChanged {
                previous, current, ..
            } => Some((*previous, *current)),
            _ => None,
        })
        .collect()
}

/// Collect whatever arrives within `window`.
pub async fn drain(
    events: &mut mpsc::UnboundedReceiver<InstallEvent>,
    window: Duration,
) -> Vec<InstallEvent> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        seen.push(event);
    }
    seen
}

/// Poll `condition` until it holds.
pub async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for condition"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
