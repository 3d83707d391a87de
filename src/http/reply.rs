//! Streaming reply sessions.
//!
//! # States
//! ```text
//! UNINITIALIZED ──first write-capable op──▶ STREAMING ──send(end = true)──▶ CLOSED
//!                                              │
//!                                              └──stream failure──▶ CLOSED
//! ```
//!
//! # Responsibilities
//! - Lazily allocate the body channel and the pending response head
//! - Apply status, headers and cookies to the head until it is flushed
//! - Write body chunks in issue order, flush, and end the stream
//!
//! # Design Decisions
//! - The head is flushed to hyper on the first `send`, never on a write,
//!   so head operations may be issued in any order before that
//! - Operations on a CLOSED session are no-ops returning `Ok`
//! - Errors are returned to the handler task; hyper only ever sees a
//!   response or a dropped continuation

use std::io;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::Response;
use futures_util::stream;
use tokio::sync::{mpsc, oneshot};

use crate::http::error::{ReplyError, ValidationError};
use crate::http::fragment::{Cookie, Header, HeaderOptions, Reply, ResponseFragment};
use crate::http::request::RequestHead;
use crate::http::state::{is_valid_state_name, StateRegistry};
use crate::net::RequestGuard;
use crate::observability::metrics;
use crate::plugins::static_files::StaticFilesOptions;

type Chunk = Result<Bytes, io::Error>;

/// Lifecycle state of a [`ReplySession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Streaming,
    Closed,
}

/// Server-wide data every session of a server reads.
#[derive(Debug, Default)]
pub struct ReplyContext {
    pub(crate) states: Arc<StateRegistry>,
    pub(crate) static_files: Arc<ArcSwapOption<StaticFilesOptions>>,
    pub(crate) report_errors: bool,
}

/// Observable session state, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Status staged on the unflushed head.
    pub status: Option<u16>,
    /// Headers staged on the unflushed head, in map order.
    pub headers: Vec<(String, String)>,
    pub committed: bool,
    pub bytes_written: u64,
    pub stream_allocations: u32,
}

/// Per-request reply state machine.
///
/// Owned by exactly one handler task. Dropping a session that never flushed
/// its head makes the dispatcher answer `500`; dropping one mid-stream
/// aborts the response body.
pub struct ReplySession {
    request_id: String,
    state: SessionState,
    /// Native reply continuation; consumed when the head is flushed.
    continuation: Option<oneshot::Sender<Response>>,
    /// Head (and body receiver) not yet handed to hyper.
    pending: Option<Response>,
    body_tx: Option<mpsc::UnboundedSender<Chunk>>,
    status_set: bool,
    bytes_written: u64,
    stream_allocations: u32,
    head: Arc<RequestHead>,
    context: Arc<ReplyContext>,
    guard: RequestGuard,
}

impl ReplySession {
    pub(crate) fn new(
        request_id: String,
        continuation: oneshot::Sender<Response>,
        head: Arc<RequestHead>,
        context: Arc<ReplyContext>,
        guard: RequestGuard,
    ) -> Self {
        Self {
            request_id,
            state: SessionState::Uninitialized,
            continuation: Some(continuation),
            pending: None,
            body_tx: None,
            status_set: false,
            bytes_written: 0,
            stream_allocations: 0,
            head,
            context,
            guard,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            status: self.pending.as_ref().map(|r| r.status().as_u16()),
            headers: self
                .pending
                .as_ref()
                .map(|r| {
                    r.headers()
                        .iter()
                        .map(|(name, value)| {
                            (
                                name.as_str().to_string(),
                                String::from_utf8_lossy(value.as_bytes()).into_owned(),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default(),
            committed: self.state != SessionState::Uninitialized && self.pending.is_none(),
            bytes_written: self.bytes_written,
            stream_allocations: self.stream_allocations,
        }
    }

    /// Allocate the output stream and pending head. Idempotent.
    pub fn init(&mut self) -> &mut Self {
        if self.state != SessionState::Uninitialized {
            return self;
        }

        let (tx, rx) = mpsc::unbounded_channel::<Chunk>();
        let body = Body::from_stream(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }));

        self.pending = Some(Response::new(body));
        self.body_tx = Some(tx);
        self.stream_allocations += 1;
        self.state = SessionState::Streaming;
        tracing::trace!(request_id = %self.request_id, "Reply stream initialized");
        self
    }

    /// Set the response status. `0` keeps the engine default (200).
    pub fn with_status_code(&mut self, code: u16) -> Result<&mut Self, ReplyError> {
        if self.is_closed() {
            return Ok(self);
        }

        if code == 0 {
            self.init();
            return Ok(self);
        }

        let status = StatusCode::from_u16(code)
            .map_err(|_| self.fail(ValidationError::InvalidStatus(code).into()))?;
        let response = self.writable_head()?;
        *response.status_mut() = status;
        self.status_set = true;
        Ok(self)
    }

    /// Add a header value. Appends by default; see [`HeaderOptions`].
    pub fn with_header(&mut self, header: &Header) -> Result<&mut Self, ReplyError> {
        if self.is_closed() {
            return Ok(self);
        }

        let (name, value) = parse_header(&header.name, &header.value).map_err(|e| self.fail(e.into()))?;
        let response = self.writable_head()?;
        let merged = merge_header(response.headers_mut(), name, value, &header.options);
        merged.map_err(|e| self.fail(e.into()))?;
        Ok(self)
    }

    /// Set a cookie using the state definition registered under its name.
    pub fn with_cookie(&mut self, cookie: &Cookie) -> Result<&mut Self, ReplyError> {
        if self.is_closed() {
            return Ok(self);
        }

        let Some(definition) = self.context.states.get(&cookie.name) else {
            tracing::warn!(
                request_id = %self.request_id,
                state = %cookie.name,
                "Cookie set without a registered state definition"
            );
            return Err(ValidationError::UnknownState(cookie.name.clone()).into());
        };

        let definition = definition.with_overrides(&cookie.options);
        let set_cookie = definition
            .encode(&cookie.name, &cookie.value)
            .map(|encoded| definition.set_cookie(&cookie.name, &encoded))
            .and_then(|value| {
                HeaderValue::from_str(&value).map_err(|e| ValidationError::InvalidStateValue {
                    name: cookie.name.clone(),
                    reason: e.to_string(),
                })
            })
            .map_err(|e| self.fail(e.into()))?;

        let response = self.writable_head()?;
        replace_set_cookie(response.headers_mut(), &cookie.name, set_cookie);
        Ok(self)
    }

    /// Expire a cookie on the client.
    pub fn without_cookie(&mut self, name: &str) -> Result<&mut Self, ReplyError> {
        if self.is_closed() {
            return Ok(self);
        }
        if !is_valid_state_name(name) {
            return Err(self.fail(ValidationError::InvalidStateName(name.to_string()).into()));
        }

        let definition = self.context.states.get(name).unwrap_or_default();
        let unset = HeaderValue::from_str(&definition.unset_cookie(name)).map_err(|e| {
            self.fail(
                ValidationError::InvalidStateValue {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
                .into(),
            )
        })?;

        let response = self.writable_head()?;
        replace_set_cookie(response.headers_mut(), name, unset);
        Ok(self)
    }

    /// Write a body chunk. Nothing reaches the client before [`send`](Self::send).
    ///
    /// Chunks queue without limit until the client reads them; memory is
    /// bounded only by how much the caller writes.
    pub fn with_body(&mut self, chunk: impl Into<Bytes>) -> Result<&mut Self, ReplyError> {
        if self.is_closed() {
            return Ok(self);
        }

        let chunk = chunk.into();
        self.init();
        if chunk.is_empty() {
            return Ok(self);
        }

        let len = chunk.len() as u64;
        let sent = self
            .body_tx
            .as_ref()
            .map(|tx| tx.send(Ok(chunk)).is_ok())
            .unwrap_or(false);
        if !sent {
            return Err(self.abort(ReplyError::StreamClosed));
        }

        self.bytes_written += len;
        Ok(self)
    }

    /// Flush the head and buffered chunks; `end` closes the session.
    pub fn send(&mut self, end: bool) -> Result<&mut Self, ReplyError> {
        if self.is_closed() {
            return Ok(self);
        }

        self.init();
        self.commit()?;
        if end {
            self.finish();
        }
        Ok(self)
    }

    /// Apply a batch reply: status, headers, cookies, unsets, body, flush.
    pub fn reply(&mut self, reply: Reply) -> Result<&mut Self, ReplyError> {
        for fragment in reply.into_fragments() {
            self.apply(fragment)?;
        }
        Ok(self)
    }

    /// Apply a single response fragment. Body fragments flush.
    pub fn apply(&mut self, fragment: ResponseFragment) -> Result<&mut Self, ReplyError> {
        match fragment {
            ResponseFragment::StatusCode(code) => self.with_status_code(code),
            ResponseFragment::Header(header) => self.with_header(&header),
            ResponseFragment::SetCookie(cookie) => self.with_cookie(&cookie),
            ResponseFragment::UnsetCookie(name) => self.without_cookie(&name),
            ResponseFragment::Body { chunk, end } => {
                self.with_body(chunk)?;
                self.send(end)
            }
        }
    }

    pub(crate) fn head(&self) -> Arc<RequestHead> {
        Arc::clone(&self.head)
    }

    pub(crate) fn static_files(&self) -> Option<Arc<StaticFilesOptions>> {
        self.context.static_files.load_full()
    }

    /// Replace the streamed body with a complete response and close.
    ///
    /// Staged cookies and headers the response does not set itself are kept,
    /// as is an explicitly staged status when the response is a plain 200.
    pub(crate) fn commit_response(&mut self, mut response: Response) -> Result<&mut Self, ReplyError> {
        if self.is_closed() {
            return Ok(self);
        }

        match self.pending.take() {
            Some(staged) => {
                let (parts, _) = staged.into_parts();
                let headers = response.headers_mut();
                for (name, value) in parts.headers.iter() {
                    if name == header::SET_COOKIE || !headers.contains_key(name) {
                        headers.append(name.clone(), value.clone());
                    }
                }
                if self.status_set && response.status() == StatusCode::OK {
                    *response.status_mut() = parts.status;
                }
            }
            None if self.state == SessionState::Streaming => {
                return Err(self.fail(ReplyError::HeadersSent));
            }
            None => {}
        }

        self.state = SessionState::Streaming;
        self.deliver(response)?;
        self.finish();
        Ok(self)
    }

    fn writable_head(&mut self) -> Result<&mut Response, ReplyError> {
        self.init();
        if self.pending.is_none() {
            return Err(self.fail(ReplyError::HeadersSent));
        }
        self.pending.as_mut().ok_or(ReplyError::HeadersSent)
    }

    fn commit(&mut self) -> Result<(), ReplyError> {
        let Some(mut response) = self.pending.take() else {
            return Ok(());
        };

        let status = response.status();
        let has_body = !(status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED);
        if has_body && !response.headers().contains_key(header::CONTENT_TYPE) {
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
        }

        self.deliver(response)
    }

    fn deliver(&mut self, response: Response) -> Result<(), ReplyError> {
        let status = response.status().as_u16();
        let delivered = match self.continuation.take() {
            Some(continuation) => continuation.send(response).is_ok(),
            None => false,
        };
        if !delivered {
            return Err(self.abort(ReplyError::StreamClosed));
        }

        tracing::debug!(request_id = %self.request_id, status, "Response head sent");
        Ok(())
    }

    fn finish(&mut self) {
        self.body_tx = None;
        self.state = SessionState::Closed;
        self.guard.mark_closed();
        metrics::record_reply_closed(self.bytes_written);
        tracing::debug!(
            request_id = %self.request_id,
            bytes = self.bytes_written,
            "Reply closed"
        );
    }

    /// Close the session after a fatal stream failure.
    fn abort(&mut self, error: ReplyError) -> ReplyError {
        self.pending = None;
        self.continuation = None;
        self.body_tx = None;
        self.state = SessionState::Closed;
        self.guard.mark_closed();
        self.fail(error)
    }

    /// Log a failed operation at the level the server's debug settings ask for.
    pub(crate) fn fail(&self, error: ReplyError) -> ReplyError {
        if self.context.report_errors {
            tracing::error!(request_id = %self.request_id, error = %error, "Reply operation failed");
        } else {
            tracing::debug!(request_id = %self.request_id, error = %error, "Reply operation failed");
        }
        error
    }
}

impl std::fmt::Debug for ReplySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplySession")
            .field("request_id", &self.request_id)
            .field("state", &self.state)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl Drop for ReplySession {
    fn drop(&mut self) {
        match self.state {
            SessionState::Closed => {}
            SessionState::Streaming if self.pending.is_none() => {
                tracing::warn!(request_id = %self.request_id, "Reply session dropped mid-stream, aborting body");
                if let Some(tx) = self.body_tx.take() {
                    let _ = tx.send(Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "reply session dropped before end of body",
                    )));
                }
            }
            _ => {
                tracing::warn!(request_id = %self.request_id, "Reply session dropped without a response");
            }
        }
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidHeader {
        name: name.to_string(),
        reason,
    };
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
    Ok((header_name, header_value))
}

fn merge_header(
    headers: &mut HeaderMap,
    name: HeaderName,
    value: HeaderValue,
    options: &HeaderOptions,
) -> Result<(), ValidationError> {
    let existing: Vec<HeaderValue> = headers.get_all(&name).iter().cloned().collect();

    if existing.is_empty() {
        headers.append(name, value);
        return Ok(());
    }
    if options.keep_existing || (options.dedupe && existing.contains(&value)) {
        return Ok(());
    }
    if !options.combine {
        headers.append(name, value);
        return Ok(());
    }

    let separator = options.separator.as_bytes();
    let mut joined = existing
        .iter()
        .map(HeaderValue::as_bytes)
        .collect::<Vec<_>>()
        .join(separator);
    joined.extend_from_slice(separator);
    joined.extend_from_slice(value.as_bytes());

    let combined = HeaderValue::from_bytes(&joined).map_err(|e| ValidationError::InvalidHeader {
        name: name.as_str().to_string(),
        reason: e.to_string(),
    })?;
    headers.insert(name, combined);
    Ok(())
}

/// Keep at most one `Set-Cookie` per cookie name; the last one wins.
fn replace_set_cookie(headers: &mut HeaderMap, name: &str, value: HeaderValue) {
    let prefix = format!("{name}=");
    let kept: Vec<HeaderValue> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter(|v| !v.as_bytes().starts_with(prefix.as_bytes()))
        .cloned()
        .collect();

    headers.remove(header::SET_COOKIE);
    for v in kept {
        headers.append(header::SET_COOKIE, v);
    }
    headers.append(header::SET_COOKIE, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Uri};
    use serde_json::json;

    use crate::http::state::StateDefinition;
    use crate::net::RequestTracker;

    fn head() -> Arc<RequestHead> {
        Arc::new(RequestHead {
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            route: None,
        })
    }

    fn session_with(states: StateRegistry) -> (ReplySession, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        let context = Arc::new(ReplyContext {
            states: Arc::new(states),
            ..ReplyContext::default()
        });
        let guard = RequestTracker::new().track();
        (ReplySession::new("req-1".to_string(), tx, head(), context, guard), rx)
    }

    fn session() -> (ReplySession, oneshot::Receiver<Response>) {
        session_with(StateRegistry::new())
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn init_is_idempotent() {
        let (mut session, _rx) = session();
        assert_eq!(session.state(), SessionState::Uninitialized);

        session.init().init();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Streaming);
        assert_eq!(snapshot.stream_allocations, 1);
        assert!(!snapshot.committed);
    }

    #[tokio::test]
    async fn head_operations_land_before_the_body() {
        let states = StateRegistry::new();
        states.register("session", StateDefinition::default());
        let (mut session, rx) = session_with(states);

        session
            .with_status_code(201)
            .unwrap()
            .with_header(&Header::new("x-a", "1"))
            .unwrap()
            .with_cookie(&Cookie::new("session", "abc"))
            .unwrap()
            .with_header(&Header::new("x-a", "2"))
            .unwrap()
            .with_body("hello ")
            .unwrap()
            .with_body(String::from("world"))
            .unwrap()
            .send(true)
            .unwrap();

        assert!(session.is_closed());
        assert_eq!(session.bytes_written(), 11);

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let values: Vec<_> = response.headers().get_all("x-a").iter().collect();
        assert_eq!(values, vec!["1", "2"]);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("session=abc"));
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(body_string(response).await, "hello world");
    }

    #[tokio::test]
    async fn closed_sessions_ignore_every_operation() {
        let states = StateRegistry::new();
        states.register("session", StateDefinition::default());
        let (mut session, _rx) = session_with(states);
        session.with_body("done").unwrap().send(true).unwrap();

        let before = session.snapshot();
        session.with_status_code(500).unwrap();
        session.with_header(&Header::new("x-late", "1")).unwrap();
        session.with_cookie(&Cookie::new("session", "late")).unwrap();
        session.without_cookie("session").unwrap();
        session.with_body("more").unwrap();
        session.send(true).unwrap();
        session.init();
        assert_eq!(session.snapshot(), before);
    }

    #[tokio::test]
    async fn zero_status_keeps_the_default() {
        let (mut session, rx) = session();
        session.with_status_code(0).unwrap().send(true).unwrap();
        assert_eq!(rx.await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn batch_replies_continue_an_open_stream() {
        let (mut session, rx) = session();
        session.reply(Reply::chunk("a")).unwrap();
        assert!(session.snapshot().committed);

        session.with_status_code(0).unwrap();
        session.reply(Reply::full(0, "b")).unwrap();
        assert!(session.is_closed());

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ab");
    }

    #[test]
    fn status_after_flush_is_rejected() {
        let (mut session, _rx) = session();
        session.with_body("a").unwrap().send(false).unwrap();
        let err = session.with_status_code(404).unwrap_err();
        assert!(matches!(err, ReplyError::HeadersSent));
    }

    #[test]
    fn invalid_status_is_rejected() {
        let (mut session, _rx) = session();
        let err = session.with_status_code(1000).unwrap_err();
        assert!(matches!(err, ReplyError::Validation(ValidationError::InvalidStatus(1000))));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn unknown_cookie_leaves_the_session_untouched() {
        let (mut session, _rx) = session();
        let before = session.snapshot();

        let err = session.with_cookie(&Cookie::new("session", "abc")).unwrap_err();
        assert!(matches!(
            err,
            ReplyError::Validation(ValidationError::UnknownState(ref name)) if name == "session"
        ));
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn invalid_header_leaves_the_session_untouched() {
        let (mut session, _rx) = session();
        let before = session.snapshot();
        assert!(session.with_header(&Header::new("bad header", "x")).is_err());
        assert!(session.with_header(&Header::new("x-ok", "line\nbreak")).is_err());
        assert_eq!(session.snapshot(), before);
    }

    #[tokio::test]
    async fn chunks_stream_after_the_first_flush() {
        let (mut session, rx) = session();
        session.with_header(&Header::new("content-type", "text/event-stream")).unwrap();
        session.with_body("a").unwrap().send(false).unwrap();

        let response = rx.await.unwrap();
        assert!(session.snapshot().committed);
        assert!(matches!(
            session.with_header(&Header::new("x-late", "1")),
            Err(ReplyError::HeadersSent)
        ));

        session.with_body("b").unwrap().with_body("c").unwrap().send(true).unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(body_string(response).await, "abc");
    }

    #[test]
    fn lost_continuation_closes_the_session() {
        let (mut session, rx) = session();
        drop(rx);
        let err = session.with_body("x").unwrap().send(true).unwrap_err();
        assert!(err.is_fatal());
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn dropping_mid_stream_aborts_the_body() {
        let (mut session, rx) = session();
        session.with_body("partial").unwrap().send(false).unwrap();
        let response = rx.await.unwrap();
        drop(session);
        assert!(axum::body::to_bytes(response.into_body(), usize::MAX).await.is_err());
    }

    #[tokio::test]
    async fn dropping_before_any_reply_drops_the_continuation() {
        let (session, rx) = session();
        drop(session);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn batch_reply_applies_in_order() {
        let states = StateRegistry::new();
        states.register("session", StateDefinition::default());
        let (mut session, rx) = session_with(states);

        session
            .reply(
                Reply::full(202, "ok")
                    .header("x-batch", "1")
                    .state("session", json!("v1"))
                    .unstate("legacy"),
            )
            .unwrap();
        assert!(session.is_closed());

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("session=v1"));
        assert!(cookies[1].starts_with("legacy=; Max-Age=0"));
        assert_eq!(body_string(response).await, "ok");
    }

    #[test]
    fn header_options_control_merging() {
        let (mut session, _rx) = session();
        let combine = HeaderOptions {
            combine: true,
            separator: ", ".to_string(),
            ..HeaderOptions::default()
        };
        let keep = HeaderOptions {
            keep_existing: true,
            ..HeaderOptions::default()
        };
        let dedupe = HeaderOptions {
            dedupe: true,
            ..HeaderOptions::default()
        };

        session.with_header(&Header::new("vary", "accept")).unwrap();
        session
            .with_header(&Header::new("vary", "origin").with_options(combine))
            .unwrap();
        session.with_header(&Header::new("x-kept", "first")).unwrap();
        session
            .with_header(&Header::new("x-kept", "second").with_options(keep))
            .unwrap();
        session.with_header(&Header::new("x-once", "1")).unwrap();
        session
            .with_header(&Header::new("x-once", "1").with_options(dedupe))
            .unwrap();

        let headers = session.snapshot().headers;
        let count = |name: &str| headers.iter().filter(|(n, _)| n == name).count();
        assert!(headers.contains(&("vary".to_string(), "accept, origin".to_string())));
        assert_eq!(count("vary"), 1);
        assert!(headers.contains(&("x-kept".to_string(), "first".to_string())));
        assert_eq!(count("x-kept"), 1);
        assert_eq!(count("x-once"), 1);
    }

    #[test]
    fn setting_a_cookie_twice_keeps_the_last_value() {
        let states = StateRegistry::new();
        states.register("session", StateDefinition::default());
        let (mut session, _rx) = session_with(states);

        session.with_cookie(&Cookie::new("session", "one")).unwrap();
        session.with_cookie(&Cookie::new("session", "two")).unwrap();

        let cookies: Vec<_> = session
            .snapshot()
            .headers
            .into_iter()
            .filter(|(name, _)| name == "set-cookie")
            .collect();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].1.starts_with("session=two"));
    }
}
