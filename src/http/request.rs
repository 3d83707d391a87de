//! Request normalization.
//!
//! # Responsibilities
//! - Copy the fixed field set of a live request into an owned value
//! - Flatten headers, query and cookies into plain maps
//! - Turn the collected body into a payload value
//!
//! # Design Decisions
//! - Normalization is total: malformed parts degrade to strings or are dropped
//! - Nothing engine-owned (extensions, connection info, server state) survives
//! - The result owns all of its data, so later mutation of the live request
//!   can never be observed through it

use std::borrow::Cow;
use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::{header, request, HeaderMap, Method, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::state::StateRegistry;

/// Immutable snapshot of an inbound request handed to the request handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizedRequest {
    pub id: String,
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, Value>,
    pub state: BTreeMap<String, Value>,
    pub payload: Value,
}

/// Borrowed view over everything the transport knows about a request.
///
/// `head` still carries engine extensions and `states` points back into the
/// server; neither is allowed to leak past [`normalize`].
pub struct LiveRequest<'a> {
    pub id: &'a str,
    pub head: &'a request::Parts,
    pub params: &'a [(String, String)],
    pub payload: &'a Bytes,
    pub states: &'a StateRegistry,
    pub parse_payload: bool,
}

/// Strip a live request down to a [`NormalizedRequest`].
pub fn normalize(live: &LiveRequest<'_>) -> NormalizedRequest {
    NormalizedRequest {
        id: live.id.to_string(),
        method: live.head.method.as_str().to_string(),
        path: live.head.uri.path().to_string(),
        headers: flatten_headers(&live.head.headers),
        params: live.params.iter().cloned().collect(),
        query: live
            .head
            .uri
            .query()
            .map(|q| collect_pairs(url::form_urlencoded::parse(q.as_bytes())))
            .unwrap_or_default(),
        state: live.states.parse_request(&live.head.headers),
        payload: payload_value(&live.head.headers, live.payload, live.parse_payload),
    }
}

/// The parts of a request a reply may still need (file replies).
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Route pattern that matched, e.g. `/assets/{*path}`.
    pub route: Option<String>,
}

impl RequestHead {
    pub fn new(head: &request::Parts, route: Option<String>) -> Self {
        Self {
            method: head.method.clone(),
            uri: head.uri.clone(),
            headers: head.headers.clone(),
            route,
        }
    }
}

fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let separator = if name == header::COOKIE { "; " } else { ", " };
            let joined = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(separator);
            (name.as_str().to_string(), joined)
        })
        .collect()
}

fn collect_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> BTreeMap<String, Value> {
    let mut out: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in pairs {
        let value = Value::String(value.into_owned());
        match out.get_mut(key.as_ref()) {
            None => {
                out.insert(key.into_owned(), value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    out
}

fn payload_value(headers: &HeaderMap, body: &Bytes, parse: bool) -> Value {
    if body.is_empty() {
        return Value::Null;
    }

    if parse {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if content_type == "application/json" || content_type.ends_with("+json") {
            match serde_json::from_slice(body) {
                Ok(value) => return value,
                Err(e) => tracing::debug!(error = %e, "JSON payload did not parse, keeping text"),
            }
        } else if content_type == "application/x-www-form-urlencoded" {
            let form = collect_pairs(url::form_urlencoded::parse(body));
            return Value::Object(form.into_iter().collect());
        }
    }

    Value::String(String::from_utf8_lossy(body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};
    use serde_json::json;

    use crate::http::state::{StateDefinition, StateEncoding};

    fn parts(builder: axum::http::request::Builder) -> request::Parts {
        builder.body(()).unwrap().into_parts().0
    }

    fn live<'a>(
        head: &'a request::Parts,
        params: &'a [(String, String)],
        payload: &'a Bytes,
        states: &'a StateRegistry,
    ) -> LiveRequest<'a> {
        LiveRequest {
            id: "req-1",
            head,
            params,
            payload,
            states,
            parse_payload: true,
        }
    }

    #[test]
    fn copies_the_fixed_field_set_only() {
        #[derive(Clone)]
        struct ServerBackReference;

        let mut head = parts(Request::builder().method("POST").uri("/users/7?tag=a&tag=b&q=x%20y"));
        head.extensions.insert(ServerBackReference);
        head.headers.insert("x-one", HeaderValue::from_static("1"));
        head.headers.append("x-one", HeaderValue::from_static("2"));

        let params = vec![("id".to_string(), "7".to_string())];
        let payload = Bytes::new();
        let states = StateRegistry::new();

        let normalized = normalize(&live(&head, &params, &payload, &states));
        assert_eq!(normalized.id, "req-1");
        assert_eq!(normalized.method, "POST");
        assert_eq!(normalized.path, "/users/7");
        assert_eq!(normalized.headers["x-one"], "1, 2");
        assert_eq!(normalized.params["id"], "7");
        assert_eq!(normalized.query["tag"], json!(["a", "b"]));
        assert_eq!(normalized.query["q"], json!("x y"));
        assert_eq!(normalized.payload, Value::Null);

        let value = serde_json::to_value(&normalized).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["headers", "id", "method", "params", "path", "payload", "query", "state"]
        );
    }

    #[test]
    fn later_mutation_of_the_live_request_is_not_observed() {
        let mut head = parts(Request::builder().uri("/a").header("x-test", "before"));
        let params = vec![("p".to_string(), "v".to_string())];
        let payload = Bytes::new();
        let states = StateRegistry::new();

        let normalized = normalize(&live(&head, &params, &payload, &states));
        let snapshot = normalized.clone();

        head.headers.insert("x-test", HeaderValue::from_static("after"));
        head.uri = "/b".parse().unwrap();

        assert_eq!(normalized, snapshot);
        assert_eq!(normalized.headers["x-test"], "before");
        assert_eq!(normalized.path, "/a");
    }

    #[test]
    fn cookies_become_state() {
        let states = StateRegistry::new();
        states.register(
            "session",
            StateDefinition {
                encoding: StateEncoding::Base64,
                ..StateDefinition::default()
            },
        );
        let head = parts(Request::builder().uri("/").header("cookie", "session=YWJj; theme=dark"));
        let payload = Bytes::new();

        let normalized = normalize(&live(&head, &[], &payload, &states));
        assert_eq!(normalized.state["session"], json!("abc"));
        assert_eq!(normalized.state["theme"], json!("dark"));
        assert_eq!(normalized.headers["cookie"], "session=YWJj; theme=dark");
    }

    #[test]
    fn payload_follows_content_type() {
        let states = StateRegistry::new();

        let json_head = parts(Request::builder().uri("/").header("content-type", "application/json; charset=utf-8"));
        let body = Bytes::from_static(br#"{"a":[1,2]}"#);
        assert_eq!(normalize(&live(&json_head, &[], &body, &states)).payload, json!({"a": [1, 2]}));

        let form_head = parts(Request::builder().uri("/").header("content-type", "application/x-www-form-urlencoded"));
        let body = Bytes::from_static(b"a=1&b=two+words");
        assert_eq!(
            normalize(&live(&form_head, &[], &body, &states)).payload,
            json!({"a": "1", "b": "two words"})
        );

        let bad_json = Bytes::from_static(b"{nope");
        assert_eq!(normalize(&live(&json_head, &[], &bad_json, &states)).payload, json!("{nope"));

        let mut raw = live(&json_head, &[], &body, &states);
        raw.parse_payload = false;
        assert_eq!(normalize(&raw).payload, json!("a=1&b=two+words"));
    }
}
