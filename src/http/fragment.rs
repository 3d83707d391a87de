//! Response values produced by application logic.
//!
//! Fragments are plain data: they are consumed by a [`ReplySession`] the
//! moment they are applied and never stored.
//!
//! [`ReplySession`]: crate::http::reply::ReplySession

use std::collections::BTreeMap;

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a header is merged with values already present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderOptions {
    /// Join onto an existing value with `separator` instead of adding a line.
    pub combine: bool,
    pub separator: String,
    /// Leave an existing value untouched.
    pub keep_existing: bool,
    /// Skip the value if an identical one is already present.
    pub dedupe: bool,
}

impl Default for HeaderOptions {
    fn default() -> Self {
        Self {
            combine: false,
            separator: ",".to_string(),
            keep_existing: false,
            dedupe: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Header {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub options: HeaderOptions,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            options: HeaderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: HeaderOptions) -> Self {
        self.options = options;
        self
    }
}

/// Per-response overrides of a registered state definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieOptions {
    pub ttl_secs: Option<u64>,
    pub path: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub options: CookieOptions,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            options: CookieOptions::default(),
        }
    }
}

/// A single reply operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFragment {
    StatusCode(u16),
    Header(Header),
    SetCookie(Cookie),
    UnsetCookie(String),
    /// Write a chunk and flush; `end` closes the session.
    Body { chunk: Bytes, end: bool },
}

/// A batch of fragments applied in one reply call.
///
/// Application order is fixed: status, headers, cookies set, cookies
/// unset, body, then flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    /// 0 leaves the current status untouched.
    pub status_code: u16,
    pub headers: Vec<Header>,
    pub states: BTreeMap<String, Value>,
    pub unstate: Vec<String>,
    pub body: Bytes,
    pub end: bool,
}

impl Reply {
    /// A complete response in one call.
    pub fn full(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status_code,
            body: body.into(),
            end: true,
            ..Self::default()
        }
    }

    /// A chunk of a response that stays open.
    pub fn chunk(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn state(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.states.insert(name.into(), value.into());
        self
    }

    pub fn unstate(mut self, name: impl Into<String>) -> Self {
        self.unstate.push(name.into());
        self
    }

    /// Expand into fragments in application order.
    pub fn into_fragments(self) -> Vec<ResponseFragment> {
        let mut fragments = Vec::with_capacity(self.headers.len() + self.states.len() + 3);
        fragments.push(ResponseFragment::StatusCode(self.status_code));
        fragments.extend(self.headers.into_iter().map(ResponseFragment::Header));
        fragments.extend(
            self.states
                .into_iter()
                .map(|(name, value)| ResponseFragment::SetCookie(Cookie::new(name, value))),
        );
        fragments.extend(self.unstate.into_iter().map(ResponseFragment::UnsetCookie));
        fragments.push(ResponseFragment::Body {
            chunk: self.body,
            end: self.end,
        });
        fragments
    }
}
