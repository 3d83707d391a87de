//! Static file replies.
//!
//! # Responsibilities
//! - Register file serving options as a server plugin
//! - Reply a single file, or a file resolved from a directory route's tail
//! - Keep served paths confined under the configured root
//!
//! # Design Decisions
//! - File replies bypass the chunked body path: tower-http's `ServeFile` /
//!   `ServeDir` build the whole response (ranges, conditional requests,
//!   content type) and the session commits it in one step
//! - Directory routes end in a `{*wildcard}` segment; the part of the request
//!   path after the literal route prefix is looked up under the directory

use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{self, HeaderValue};
use axum::http::{Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

use crate::http::error::ReplyError;
use crate::http::reply::ReplySession;
use crate::http::request::RequestHead;
use crate::server::{BoxError, Plugin, PluginDescriptor, ServerHandle};

pub const PLUGIN_NAME: &str = "static-files";

/// Options the static files plugin is registered with.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesOptions {
    /// Root relative paths resolve against. Confined replies stay under it.
    pub relative_to: Option<PathBuf>,
}

/// The static files plugin.
#[derive(Debug, Default)]
pub struct StaticFiles;

impl Plugin for StaticFiles {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn register<'a>(
        &'a self,
        server: &'a mut ServerHandle,
        options: &'a Value,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            let options: StaticFilesOptions = match options {
                Value::Null => StaticFilesOptions::default(),
                options => serde_json::from_value(options.clone())?,
            };
            if let Some(root) = &options.relative_to {
                if !tokio::fs::metadata(root).await?.is_dir() {
                    return Err(format!("`{}` is not a directory", root.display()).into());
                }
            }

            tracing::debug!(root = ?options.relative_to, "Static files enabled");
            server.enable_static_files(options);
            Ok::<(), BoxError>(())
        })
    }
}

/// Descriptor registering [`StaticFiles`] with `options`.
pub fn plugin(options: StaticFilesOptions) -> PluginDescriptor {
    let options = serde_json::to_value(options).unwrap_or(Value::Null);
    PluginDescriptor::new(StaticFiles, options)
}

/// How the client should present a served file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub path: PathBuf,
    /// Refuse paths outside `relative_to` (and any `..` component).
    pub confine: bool,
    /// Adds a `Content-Disposition` header when set.
    pub mode: Option<Disposition>,
    /// Filename for `Content-Disposition`; defaults to the file's name.
    pub filename: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            confine: true,
            mode: None,
            filename: None,
        }
    }
}

impl FileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub path: PathBuf,
    /// Serve `index.html` for directory requests.
    pub index: bool,
    /// Serve files and directories whose name starts with `.`.
    pub show_hidden: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            index: true,
            show_hidden: false,
        }
    }
}

impl DirectoryConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// A static reply target, serialized as `{"file": ..}` or `{"directory": ..}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StaticTarget {
    File(FileConfig),
    Directory(DirectoryConfig),
}

pub fn file(config: FileConfig) -> StaticTarget {
    StaticTarget::File(config)
}

pub fn directory(config: DirectoryConfig) -> StaticTarget {
    StaticTarget::Directory(config)
}

impl ReplySession {
    /// Reply a file or directory target and close the session.
    pub async fn reply_static(&mut self, target: &StaticTarget) -> Result<&mut Self, ReplyError> {
        match target {
            StaticTarget::File(config) => self.reply_file(config).await,
            StaticTarget::Directory(config) => self.reply_directory(config).await,
        }
    }

    /// Reply the whole file at `config.path` and close the session.
    ///
    /// Status, headers and cookies staged before the call are kept unless the
    /// file response sets them itself.
    pub async fn reply_file(&mut self, config: &FileConfig) -> Result<&mut Self, ReplyError> {
        if self.is_closed() {
            return Ok(self);
        }

        let options = self.static_options()?;
        let path = resolve(&options, &config.path, config.confine).map_err(|e| self.fail(e))?;
        let head = self.head();

        let response = serve(ServeFile::new(&path).oneshot(rebuild(&head, head.uri.clone())).await);
        let mut response = response.map(Body::new);

        if let Some(mode) = config.mode.filter(|_| response.status().is_success()) {
            let filename = config.filename.clone().or_else(|| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            });
            let value = match filename {
                Some(filename) => format!("{}; filename=\"{}\"", mode.as_str(), filename.replace('"', "")),
                None => mode.as_str().to_string(),
            };
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
                }
                Err(e) => tracing::warn!(
                    request_id = %self.request_id(),
                    error = %e,
                    "Skipping unrepresentable Content-Disposition"
                ),
            }
        }

        tracing::debug!(
            request_id = %self.request_id(),
            path = %path.display(),
            status = response.status().as_u16(),
            "Replying file"
        );
        self.commit_response(response)
    }

    /// Reply the file a directory route's wildcard tail names and close the session.
    pub async fn reply_directory(&mut self, config: &DirectoryConfig) -> Result<&mut Self, ReplyError> {
        if self.is_closed() {
            return Ok(self);
        }

        let options = self.static_options()?;
        let root = resolve(&options, &config.path, true).map_err(|e| self.fail(e))?;
        let head = self.head();

        let prefix = route_prefix(head.route.as_deref());
        let tail = head
            .uri
            .path()
            .strip_prefix(prefix)
            .unwrap_or("")
            .trim_start_matches('/');
        let segments: Vec<&str> = tail.split('/').collect();

        if segments.iter().any(|s| *s == "..") {
            tracing::warn!(request_id = %self.request_id(), path = %head.uri.path(), "Directory traversal refused");
            return self.commit_response((StatusCode::FORBIDDEN, "Forbidden").into_response());
        }
        if !config.show_hidden && segments.iter().any(|s| s.starts_with('.')) {
            return self.commit_response((StatusCode::NOT_FOUND, "Not Found").into_response());
        }

        let Ok(uri) = format!("/{tail}").parse::<Uri>() else {
            return self.commit_response((StatusCode::NOT_FOUND, "Not Found").into_response());
        };

        let service = ServeDir::new(&root).append_index_html_on_directories(config.index);
        let mut response = serve(service.oneshot(rebuild(&head, uri)).await).map(Body::new);

        // Redirects to `dir/` are relative to the rebuilt path.
        if response.status().is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|location| location.starts_with('/'))
                .map(|location| format!("{}{location}", prefix.trim_end_matches('/')));
            if let Some(value) = location.and_then(|l| HeaderValue::from_str(&l).ok()) {
                response.headers_mut().insert(header::LOCATION, value);
            }
        }

        tracing::debug!(
            request_id = %self.request_id(),
            root = %root.display(),
            tail = %tail,
            status = response.status().as_u16(),
            "Replying from directory"
        );
        self.commit_response(response)
    }

    fn static_options(&self) -> Result<Arc<StaticFilesOptions>, ReplyError> {
        self.static_files()
            .ok_or_else(|| self.fail(ReplyError::StaticFilesUnavailable))
    }
}

fn serve<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

fn resolve(options: &StaticFilesOptions, path: &Path, confine: bool) -> Result<PathBuf, ReplyError> {
    let forbidden = || ReplyError::Forbidden(path.display().to_string());
    if confine && path.components().any(|c| c == Component::ParentDir) {
        return Err(forbidden());
    }
    match &options.relative_to {
        Some(root) if path.is_relative() => Ok(root.join(path)),
        Some(root) if confine && !path.starts_with(root) => Err(forbidden()),
        _ => Ok(path.to_path_buf()),
    }
}

/// Literal part of a route before its first parameter.
fn route_prefix(route: Option<&str>) -> &str {
    match route {
        Some(route) => route.find('{').map_or(route, |i| &route[..i]),
        None => "/",
    }
}

fn rebuild(head: &RequestHead, uri: Uri) -> Request<Body> {
    let mut request = Request::new(Body::empty());
    *request.method_mut() = head.method.clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = head.headers.clone();
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method};
    use serde_json::json;
    use tokio::sync::oneshot;

    use crate::http::fragment::Header;
    use crate::http::reply::{ReplyContext, SessionState};
    use crate::net::RequestTracker;

    struct Fixture {
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let root = std::env::temp_dir().join(format!("http-bridge-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(root.join("css")).unwrap();
            std::fs::write(root.join("hello.txt"), "hello file").unwrap();
            std::fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();
            std::fs::write(root.join("css/site.css"), "body{}").unwrap();
            std::fs::write(root.join(".env"), "SECRET=1").unwrap();
            Self { root }
        }

        fn session(&self, uri: &str, route: Option<&str>) -> (ReplySession, oneshot::Receiver<Response>) {
            let context = ReplyContext::default();
            context.static_files.store(Some(Arc::new(StaticFilesOptions {
                relative_to: Some(self.root.clone()),
            })));
            session_with(context, uri, route)
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn session_with(
        context: ReplyContext,
        uri: &str,
        route: Option<&str>,
    ) -> (ReplySession, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        let head = Arc::new(RequestHead {
            method: Method::GET,
            uri: uri.parse().unwrap(),
            headers: HeaderMap::new(),
            route: route.map(str::to_string),
        });
        let session = ReplySession::new(
            "req-static".to_string(),
            tx,
            head,
            Arc::new(context),
            RequestTracker::new().track(),
        );
        (session, rx)
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn targets_serialize_as_tagged_values() {
        let value = serde_json::to_value(file(FileConfig::new("a.txt"))).unwrap();
        assert_eq!(value["file"]["path"], json!("a.txt"));
        assert_eq!(value["file"]["confine"], json!(true));

        let value = serde_json::to_value(directory(DirectoryConfig::new("public"))).unwrap();
        assert_eq!(value["directory"]["index"], json!(true));

        let parsed: StaticTarget = serde_json::from_value(json!({"file": {"path": "b.txt"}})).unwrap();
        assert_eq!(parsed, file(FileConfig::new("b.txt")));
    }

    #[test]
    fn route_prefix_stops_at_the_first_parameter() {
        assert_eq!(route_prefix(Some("/assets/{*path}")), "/assets/");
        assert_eq!(route_prefix(Some("/docs")), "/docs");
        assert_eq!(route_prefix(None), "/");
    }

    #[tokio::test]
    async fn file_replies_need_the_plugin() {
        let (mut session, _rx) = session_with(ReplyContext::default(), "/", None);
        let err = session.reply_file(&FileConfig::new("hello.txt")).await.unwrap_err();
        assert!(matches!(err, ReplyError::StaticFilesUnavailable));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn file_reply_keeps_staged_headers() {
        let fixture = Fixture::new();
        let (mut session, rx) = fixture.session("/download", Some("/download"));

        session.with_header(&Header::new("x-staged", "1")).unwrap();
        let config = FileConfig {
            mode: Some(Disposition::Attachment),
            ..FileConfig::new("hello.txt")
        };
        session.reply_file(&config).await.unwrap();
        assert!(session.is_closed());

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-staged"], "1");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"hello.txt\""
        );
        assert_eq!(body_string(response).await, "hello file");
    }

    #[tokio::test]
    async fn confined_files_cannot_escape_the_root() {
        let fixture = Fixture::new();
        let (mut session, _rx) = fixture.session("/", None);

        let err = session.reply_file(&FileConfig::new("../etc/passwd")).await.unwrap_err();
        assert!(matches!(err, ReplyError::Forbidden(_)));
        let err = session.reply_file(&FileConfig::new("/etc/passwd")).await.unwrap_err();
        assert!(matches!(err, ReplyError::Forbidden(_)));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn missing_files_answer_404() {
        let fixture = Fixture::new();
        let (mut session, rx) = fixture.session("/", None);
        session.reply_file(&FileConfig::new("nope.txt")).await.unwrap();
        assert_eq!(rx.await.unwrap().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn directory_serves_the_route_tail() {
        let fixture = Fixture::new();
        let (mut session, rx) = fixture.session("/assets/css/site.css", Some("/assets/{*path}"));
        session
            .reply_static(&directory(DirectoryConfig::new(".")))
            .await
            .unwrap();
        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "body{}");
    }

    #[tokio::test]
    async fn directory_serves_index_files() {
        let fixture = Fixture::new();
        let (mut session, rx) = fixture.session("/site", Some("/site"));
        session.reply_directory(&DirectoryConfig::new(".")).await.unwrap();
        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "<h1>home</h1>");
    }

    #[tokio::test]
    async fn directory_hides_dotfiles_and_refuses_traversal() {
        let fixture = Fixture::new();

        let (mut session, rx) = fixture.session("/assets/.env", Some("/assets/{*path}"));
        session.reply_directory(&DirectoryConfig::new(".")).await.unwrap();
        assert_eq!(rx.await.unwrap().status(), StatusCode::NOT_FOUND);

        let (mut session, rx) = fixture.session("/assets/../hello.txt", Some("/assets/{*path}"));
        session.reply_directory(&DirectoryConfig::new(".")).await.unwrap();
        assert_eq!(rx.await.unwrap().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn closed_sessions_skip_file_replies() {
        let fixture = Fixture::new();
        let (mut session, _rx) = fixture.session("/", None);
        session.with_body("done").unwrap().send(true).unwrap();
        session.reply_file(&FileConfig::new("hello.txt")).await.unwrap();
        assert!(session.is_closed());
    }
}
