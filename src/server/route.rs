//! Route table construction.
//!
//! # Responsibilities
//! - Validate registered routes (method, path syntax, duplicates, conflicts)
//! - Group routes by path into axum method routers, all pointing at `dispatch`
//! - Wrap the router in the engine middleware stack
//!
//! # Design Decisions
//! - Validation runs before any socket is bound, so a bad route never
//!   leaves a half-started server
//! - Routes are checked here because axum panics on conflicting paths
//! - `*` registers a method fallback for the path

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use axum::http::Method;
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::dispatch::{dispatch, DispatchState};
use crate::server::error::StartError;

/// A registered route. The handler is always the dispatch bridge.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// HTTP method, or `*` for any method not otherwise routed on the path.
    pub method: String,

    /// Path with `{param}` and trailing `{*wildcard}` segments.
    pub path: String,

    /// Per-route settings, opaque to the bridge.
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl RouteConfig {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            settings: serde_json::Value::Null,
        }
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RouteMethod {
    Any,
    Only(Method),
}

/// Validate `routes` and build the served router.
pub(crate) fn build_router(routes: &[RouteConfig], state: DispatchState) -> Result<Router, StartError> {
    let mut seen: HashSet<(RouteMethod, &str)> = HashSet::new();
    let mut shapes: HashMap<String, &str> = HashMap::new();
    let mut by_path: BTreeMap<&str, MethodRouter<DispatchState>> = BTreeMap::new();

    for route in routes {
        let method = parse_method(route)?;
        let shape = path_shape(&route.path).map_err(|reason| StartError::InvalidRoute {
            method: route.method.clone(),
            path: route.path.clone(),
            reason,
        })?;

        if let Some(existing) = shapes.get(&shape) {
            if *existing != route.path {
                return Err(StartError::RouteConflict {
                    method: route.method.clone(),
                    path: route.path.clone(),
                    existing: existing.to_string(),
                });
            }
        }
        if !seen.insert((method.clone(), route.path.as_str())) {
            return Err(StartError::RouteConflict {
                method: route.method.clone(),
                path: route.path.clone(),
                existing: format!("{} {}", route.method, route.path),
            });
        }
        shapes.insert(shape, route.path.as_str());

        let method_router = by_path.remove(route.path.as_str()).unwrap_or_default();
        let method_router = match method {
            RouteMethod::Any => method_router.fallback(dispatch),
            RouteMethod::Only(method) => {
                let filter = MethodFilter::try_from(method).map_err(|e| StartError::InvalidRoute {
                    method: route.method.clone(),
                    path: route.path.clone(),
                    reason: e.to_string(),
                })?;
                method_router.on(filter, dispatch)
            }
        };
        by_path.insert(route.path.as_str(), method_router);

        tracing::debug!(method = %route.method, path = %route.path, "Route registered");
    }

    let settings = state.settings.clone();
    let router = by_path
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(path, method_router)
        })
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(settings.payload.max_bytes));

    let router = match settings.timeouts.request_secs {
        0 => router,
        secs => router.layer(timeout_layer(secs)),
    };

    Ok(router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid)))
}

#[allow(deprecated)]
fn timeout_layer(secs: u64) -> TimeoutLayer {
    TimeoutLayer::new(Duration::from_secs(secs))
}

fn parse_method(route: &RouteConfig) -> Result<RouteMethod, StartError> {
    if route.method == "*" {
        return Ok(RouteMethod::Any);
    }
    Method::from_bytes(route.method.to_ascii_uppercase().as_bytes())
        .map(RouteMethod::Only)
        .map_err(|e| StartError::InvalidRoute {
            method: route.method.clone(),
            path: route.path.clone(),
            reason: e.to_string(),
        })
}

/// Reduce a path to its matching shape: parameter names are erased.
fn path_shape(path: &str) -> Result<String, String> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err("path must start with `/`".to_string());
    };

    let segments: Vec<&str> = rest.split('/').collect();
    let mut names = HashSet::new();
    let mut shape = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
            if segment.contains(['{', '}']) {
                return Err(format!("parameter `{segment}` must span a whole segment"));
            }
            if segment.starts_with([':', '*']) {
                return Err(format!("segment `{segment}` needs `{{name}}` syntax"));
            }
            shape.push(segment.to_string());
            continue;
        };

        let (name, wildcard) = match inner.strip_prefix('*') {
            Some(name) => (name, true),
            None => (inner, false),
        };
        if name.is_empty() || name.contains(['{', '}', '*']) {
            return Err(format!("invalid parameter `{segment}`"));
        }
        if wildcard && i + 1 != segments.len() {
            return Err("wildcard must be the last segment".to_string());
        }
        if !names.insert(name) {
            return Err(format!("parameter `{name}` appears twice"));
        }
        shape.push(if wildcard { "{*}" } else { "{}" }.to_string());
    }

    Ok(format!("/{}", shape.join("/")))
}
