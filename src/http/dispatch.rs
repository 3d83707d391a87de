//! Dispatch bridge between axum handlers and the registered request handler.
//!
//! # Data Flow
//! ```text
//! axum route (fixed entry point)
//!     → collect body, normalize request
//!     → ReplySession (holds the oneshot continuation)
//!     → tokio::spawn(handler(session, request))      fire-and-forget
//!     → await continuation → Response head to hyper
//! ```
//!
//! # Design Decisions
//! - One handler slot per server; registering replaces (last wins)
//! - The slot is written during setup and only loaded during dispatch
//! - Handler panics stay inside the spawned task
//! - A session dropped without a head becomes a `500`

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use axum::body::Body;
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{MatchedPath, RawPathParams, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::oneshot;

use crate::config::ServerSettings;
use crate::http::reply::{ReplyContext, ReplySession};
use crate::http::request::{normalize, LiveRequest, NormalizedRequest, RequestHead};
use crate::net::RequestTracker;
use crate::observability::metrics;

/// Application entry point invoked once per inbound request.
///
/// Completion is signalled through the session, not the returned future.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, session: ReplySession, request: NormalizedRequest) -> BoxFuture<'static, ()>;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(ReplySession, NormalizedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, session: ReplySession, request: NormalizedRequest) -> BoxFuture<'static, ()> {
        Box::pin(self(session, request))
    }
}

/// The single registered-handler slot of a server.
#[derive(Clone, Default)]
pub struct HandlerSlot {
    inner: Arc<ArcSwapOption<Box<dyn RequestHandler>>>,
}

impl HandlerSlot {
    /// Install `handler`, replacing any previous one.
    pub fn replace(&self, handler: impl RequestHandler) {
        let previous = self.inner.swap(Some(Arc::new(Box::new(handler))));
        if previous.is_some() {
            tracing::debug!("Request handler replaced");
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.load().is_some()
    }

    fn current(&self) -> Option<Arc<Box<dyn RequestHandler>>> {
        self.inner.load_full()
    }
}

impl std::fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

/// Router state shared by every route of a server.
#[derive(Clone)]
pub(crate) struct DispatchState {
    pub handler: HandlerSlot,
    pub context: Arc<ReplyContext>,
    pub tracker: RequestTracker,
    pub settings: Arc<ServerSettings>,
}

/// The fixed handler behind every registered route.
pub(crate) async fn dispatch(
    State(state): State<DispatchState>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();

    let request_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // The body limit layer has already rejected oversized declared lengths.
    let payload = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            metrics::record_request(&method, 413, start);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body rejected").into_response();
        }
    };

    let params: Vec<(String, String)> = params
        .map(|raw| {
            raw.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let normalized = normalize(&LiveRequest {
        id: &request_id,
        head: &parts,
        params: &params,
        payload: &payload,
        states: &state.context.states,
        parse_payload: state.settings.payload.parse,
    });

    let route = parts
        .extensions
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string());

    if state.settings.debug.logs("request") {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %normalized.path,
            route = route.as_deref().unwrap_or("-"),
            "Dispatching request"
        );
    } else {
        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = %normalized.path,
            route = route.as_deref().unwrap_or("-"),
            "Dispatching request"
        );
    }

    let (tx, rx) = oneshot::channel();
    let session = ReplySession::new(
        request_id.clone(),
        tx,
        Arc::new(RequestHead::new(&parts, route)),
        Arc::clone(&state.context),
        state.tracker.track(),
    );

    match state.handler.current() {
        Some(handler) => {
            let task_request_id = request_id.clone();
            let task = handler.handle(session, normalized);
            tokio::spawn(async move {
                if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                    tracing::error!(request_id = %task_request_id, "Request handler panicked");
                }
            });
        }
        None => {
            tracing::warn!(request_id = %request_id, "No request handler registered");
            drop(session);
        }
    }

    let response = match rx.await {
        Ok(response) => response,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Request ended without a response",
        )
            .into_response(),
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

#[cfg(test)]
pub(crate) fn empty_request(method: &str, uri: &str) -> Request {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}
