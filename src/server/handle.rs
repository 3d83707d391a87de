//! Server handle: construction, registration and listener lifecycle.
//!
//! # Responsibilities
//! - Hold connections, routes, plugins, state definitions and the handler slot
//! - Bind every listener and serve the route table on `start`
//! - Drain and release listeners on `stop`
//!
//! # Design Decisions
//! - Registration methods take `&mut self` and return `&mut Self` for chaining
//! - `start` binds every listener before serving any; a bind failure drops
//!   the ones already bound
//! - `stop` waits for in-flight responses up to `timeouts.stop_secs`, then
//!   aborts whatever is still serving

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use axum::serve::Listener as _;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::config::validation::validate_config;
use crate::config::{ConnectionConfig, ServerConfig, ServerSettings};
use crate::http::dispatch::{DispatchState, HandlerSlot, RequestHandler};
use crate::http::error::ValidationError;
use crate::http::reply::ReplyContext;
use crate::http::state::{is_valid_state_name, StateDefinition, StateRegistry};
use crate::lifecycle::Shutdown;
use crate::net::{BoundedListener, ConnectionId, ListenerError, RequestTracker};
use crate::plugins::static_files::StaticFilesOptions;
use crate::server::error::{InitializationError, PluginError, StartError, StopError};
use crate::server::plugin::PluginDescriptor;
use crate::server::route::{build_router, RouteConfig};

/// A configured listener binding.
#[derive(Debug)]
pub(super) struct Connection {
    pub id: ConnectionId,
    pub config: ConnectionConfig,
    pub created: DateTime<Utc>,
    /// Actual address while serving.
    pub bound: Option<SocketAddr>,
}

#[derive(Debug)]
pub(super) struct Running {
    pub shutdown: Shutdown,
    pub tasks: Vec<JoinHandle<io::Result<()>>>,
    pub started: DateTime<Utc>,
}

/// Handle to one bridge server, running or stopped.
pub struct ServerHandle {
    pub(super) settings: Arc<ServerSettings>,
    pub(super) connections: Vec<Connection>,
    pub(super) routes: Vec<RouteConfig>,
    pub(super) plugins: Vec<String>,
    pub(super) handler: HandlerSlot,
    pub(super) context: Arc<ReplyContext>,
    pub(super) tracker: RequestTracker,
    pub(super) running: Option<Running>,
}

impl ServerHandle {
    /// Construct a server from `config`.
    ///
    /// Connections and states listed in the config are registered as if
    /// added through [`with_connection`](Self::with_connection) and
    /// [`with_state`](Self::with_state).
    pub fn create(config: ServerConfig) -> Result<Self, InitializationError> {
        validate_config(&config).map_err(InitializationError::InvalidConfig)?;

        let states = StateRegistry::new();
        for (name, definition) in config.states {
            states.register(name, definition);
        }

        let context = ReplyContext {
            states: Arc::new(states),
            static_files: Arc::new(ArcSwapOption::empty()),
            report_errors: config.settings.debug.reports_request_errors(),
        };

        let mut handle = Self {
            settings: Arc::new(config.settings),
            connections: Vec::new(),
            routes: Vec::new(),
            plugins: Vec::new(),
            handler: HandlerSlot::default(),
            context: Arc::new(context),
            tracker: RequestTracker::new(),
            running: None,
        };
        for connection in config.connections {
            handle.with_connection(connection);
        }

        tracing::debug!(
            connections = handle.connections.len(),
            states = handle.context.states.names().len(),
            "Server created"
        );
        Ok(handle)
    }

    /// Add a listener binding. Takes effect on the next `start`.
    pub fn with_connection(&mut self, connection: ConnectionConfig) -> &mut Self {
        if self.running.is_some() {
            tracing::warn!(
                host = %connection.host,
                port = connection.port,
                "Connection added to a running server; it will bind on the next start"
            );
        }
        self.connections.push(Connection {
            id: ConnectionId::new(),
            config: connection,
            created: Utc::now(),
            bound: None,
        });
        self
    }

    /// Register a route served by the request handler.
    pub fn with_route(&mut self, route: RouteConfig) -> &mut Self {
        self.routes.push(route);
        self
    }

    /// Register the state definition cookies named `name` are set with.
    pub fn with_state(
        &mut self,
        name: impl Into<String>,
        definition: StateDefinition,
    ) -> Result<&mut Self, ValidationError> {
        let name = name.into();
        if !is_valid_state_name(&name) {
            return Err(ValidationError::InvalidStateName(name));
        }
        self.context.states.register(name, definition);
        Ok(self)
    }

    /// Register plugins in order, stopping at the first failure.
    ///
    /// Plugins registered before the failing one stay registered.
    pub async fn with_plugins(
        &mut self,
        plugins: impl IntoIterator<Item = PluginDescriptor>,
    ) -> Result<&mut Self, PluginError> {
        for descriptor in plugins {
            let name = descriptor.name().to_string();
            if self.plugins.contains(&name) {
                return Err(PluginError::Duplicate(name));
            }

            let plugin = Arc::clone(&descriptor.plugin);
            if let Err(source) = plugin.register(self, &descriptor.options).await {
                tracing::error!(plugin = %name, error = %source, "Plugin registration failed");
                return Err(PluginError::Registration { plugin: name, source });
            }

            tracing::info!(plugin = %name, "Plugin registered");
            self.plugins.push(name);
        }
        Ok(self)
    }

    /// Install the request handler, replacing any previous one.
    pub fn on_request(&self, handler: impl RequestHandler) -> &Self {
        self.handler.replace(handler);
        self
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    /// Addresses currently being served, in connection order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.connections.iter().filter_map(|c| c.bound).collect()
    }

    pub(crate) fn enable_static_files(&self, options: StaticFilesOptions) {
        self.context.static_files.store(Some(Arc::new(options)));
    }

    /// Bind every connection and start serving.
    ///
    /// Starting a running server is a no-op.
    pub async fn start(&mut self) -> Result<(), StartError> {
        if self.running.is_some() {
            tracing::debug!("Server already started");
            return Ok(());
        }
        if self.connections.is_empty() {
            return Err(StartError::NoConnections);
        }
        if !self.handler.is_set() {
            tracing::warn!("Starting without a request handler, requests will fail with 500");
        }

        let router = build_router(&self.routes, self.dispatch_state())?;

        let mut listeners = Vec::with_capacity(self.connections.len());
        for connection in &self.connections {
            let bound = BoundedListener::bind(&connection.config)
                .await
                .and_then(|listener| {
                    let address = listener.local_addr().map_err(|source| ListenerError::Bind {
                        address: format!("{}:{}", connection.config.host, connection.config.port),
                        source,
                    })?;
                    Ok((listener, address))
                });
            match bound {
                Ok(pair) => listeners.push(pair),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        released = listeners.len(),
                        "Start failed, releasing bound listeners"
                    );
                    return Err(e.into());
                }
            }
        }

        let shutdown = Shutdown::new();
        let mut tasks = Vec::with_capacity(listeners.len());
        for (connection, (listener, address)) in self.connections.iter_mut().zip(listeners) {
            let signal = shutdown.subscribe();
            let app = router.clone();
            tasks.push(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(signal.recv())
                    .await
            }));
            connection.bound = Some(address);
            tracing::info!(connection = %connection.id, address = %address, "Server listening");
        }

        self.running = Some(Running {
            shutdown,
            tasks,
            started: Utc::now(),
        });
        Ok(())
    }

    /// Stop accepting, drain in-flight requests and release listeners.
    ///
    /// Stopping a stopped server succeeds without doing anything.
    pub async fn stop(&mut self) -> Result<(), StopError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        for connection in &mut self.connections {
            connection.bound = None;
        }

        tracing::info!(
            in_flight = self.tracker.in_flight(),
            "Stopping server, draining in-flight requests"
        );
        running.shutdown.trigger();

        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.settings.timeouts.stop_secs);
        let mut first_error = None;
        for mut task in running.tasks {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    tracing::error!(error = %e, "Listener failed while serving");
                    first_error = first_error.or(Some(StopError::Listener(e)));
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Serving task failed");
                    first_error = first_error.or(Some(StopError::Task(e)));
                }
                Err(_) => {
                    tracing::warn!(
                        in_flight = self.tracker.in_flight(),
                        "Stop deadline reached, aborting listener"
                    );
                    task.abort();
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!("Server stopped");
                Ok(())
            }
        }
    }

    fn dispatch_state(&self) -> DispatchState {
        DispatchState {
            handler: self.handler.clone(),
            context: Arc::clone(&self.context),
            tracker: self.tracker.clone(),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("connections", &self.connections.len())
            .field("routes", &self.routes.len())
            .field("plugins", &self.plugins)
            .field("handler", &self.handler)
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use serde_json::{json, Value};

    use crate::config::validation::ValidationIssue;
    use crate::server::error::BoxError;
    use crate::server::plugin::Plugin;

    fn local_config() -> ServerConfig {
        ServerConfig {
            connections: vec![ConnectionConfig::new("127.0.0.1", 0)],
            ..ServerConfig::default()
        }
    }

    struct Routes(&'static str);

    impl Plugin for Routes {
        fn name(&self) -> &str {
            self.0
        }

        fn register<'a>(
            &'a self,
            server: &'a mut ServerHandle,
            options: &'a Value,
        ) -> BoxFuture<'a, Result<(), BoxError>> {
            Box::pin(async move {
                let path = options["path"].as_str().ok_or("missing path")?;
                server.with_route(RouteConfig::new("GET", path));
                Ok::<(), BoxError>(())
            })
        }
    }

    #[test]
    fn invalid_config_fails_construction() {
        let mut config = local_config();
        config.settings.app = json!("not an object");
        config.connections[0].max_connections = 0;

        let Err(InitializationError::InvalidConfig(issues)) = ServerHandle::create(config) else {
            panic!("config should be rejected");
        };
        let fields: Vec<&str> = issues.iter().map(|i: &ValidationIssue| i.field.as_str()).collect();
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn invalid_state_names_are_rejected() {
        let mut server = ServerHandle::create(local_config()).unwrap();
        assert!(matches!(
            server.with_state("bad name", StateDefinition::default()),
            Err(ValidationError::InvalidStateName(_))
        ));
        server.with_state("session", StateDefinition::default()).unwrap();
        assert!(server.context.states.contains("session"));
    }

    #[tokio::test]
    async fn plugins_register_in_order_and_stop_at_failure() {
        let mut server = ServerHandle::create(local_config()).unwrap();
        let err = server
            .with_plugins([
                PluginDescriptor::new(Routes("a"), json!({"path": "/a"})),
                PluginDescriptor::new(Routes("b"), json!({})),
                PluginDescriptor::new(Routes("c"), json!({"path": "/c"})),
            ])
            .await
            .unwrap_err();

        assert_eq!(err.plugin(), "b");
        assert_eq!(server.plugins, vec!["a".to_string()]);
        assert_eq!(server.routes, vec![RouteConfig::new("GET", "/a")]);
    }

    #[tokio::test]
    async fn duplicate_plugins_are_rejected() {
        let mut server = ServerHandle::create(local_config()).unwrap();
        server
            .with_plugins([PluginDescriptor::new(Routes("a"), json!({"path": "/a"}))])
            .await
            .unwrap();
        let err = server
            .with_plugins([PluginDescriptor::new(Routes("a"), json!({"path": "/b"}))])
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Duplicate(ref name) if name == "a"));
    }

    #[tokio::test]
    async fn start_without_connections_fails() {
        let mut server = ServerHandle::create(ServerConfig::default()).unwrap();
        assert!(matches!(server.start().await, Err(StartError::NoConnections)));
        assert!(!server.is_started());
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let mut server = ServerHandle::create(local_config()).unwrap();
        server.with_route(RouteConfig::new("GET", "/ping"));

        server.start().await.unwrap();
        let addrs = server.local_addrs();
        assert_eq!(addrs.len(), 1);
        assert_ne!(addrs[0].port(), 0);

        server.start().await.unwrap();
        assert_eq!(server.local_addrs(), addrs);

        server.stop().await.unwrap();
        assert!(!server.is_started());
        assert!(server.local_addrs().is_empty());
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn bad_routes_fail_start_before_binding() {
        let mut server = ServerHandle::create(local_config()).unwrap();
        server.with_route(RouteConfig::new("GET", "no-slash"));
        assert!(matches!(server.start().await, Err(StartError::InvalidRoute { .. })));
        assert!(server.local_addrs().is_empty());
    }
}
