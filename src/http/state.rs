//! Cookie/state definitions.
//!
//! # Responsibilities
//! - Hold the named state definitions registered through `with_state`
//! - Encode values into `Set-Cookie` headers and expire them again
//! - Decode the `Cookie` request header into the normalized `state` map
//!
//! # Design Decisions
//! - A cookie may only be set under a registered name
//! - Unregistered request cookies are passed through as raw strings
//! - Undecodable request cookies are dropped, never fatal

use std::collections::BTreeMap;

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::error::ValidationError;
use crate::http::fragment::CookieOptions;

const EPOCH_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// How a state value is serialized into the cookie string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateEncoding {
    /// Value is written verbatim and must be a string.
    #[default]
    None,
    /// String value, base64 encoded.
    Base64,
    /// Any JSON value, serialized then base64 encoded.
    Base64Json,
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Server-side description of a named cookie.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StateDefinition {
    pub encoding: StateEncoding,

    /// Lifetime in seconds; session cookie when absent.
    pub ttl_secs: Option<u64>,

    pub path: Option<String>,
    pub domain: Option<String>,
    pub is_secure: bool,
    pub is_http_only: bool,

    /// `None` omits the attribute.
    pub same_site: Option<SameSite>,

    /// Reject values outside the RFC 6265 cookie-octet set.
    pub strict_header: bool,

    /// Drop undecodable request cookies without logging.
    pub ignore_errors: bool,
}

impl Default for StateDefinition {
    fn default() -> Self {
        Self {
            encoding: StateEncoding::None,
            ttl_secs: None,
            path: None,
            domain: None,
            is_secure: true,
            is_http_only: true,
            same_site: Some(SameSite::Strict),
            strict_header: true,
            ignore_errors: false,
        }
    }
}

impl StateDefinition {
    /// Apply per-response overrides on top of the registered definition.
    pub fn with_overrides(&self, options: &CookieOptions) -> StateDefinition {
        let mut merged = self.clone();
        if let Some(ttl) = options.ttl_secs {
            merged.ttl_secs = Some(ttl);
        }
        if let Some(path) = &options.path {
            merged.path = Some(path.clone());
        }
        if let Some(domain) = &options.domain {
            merged.domain = Some(domain.clone());
        }
        merged
    }

    /// Serialize `value` into the cookie value string.
    pub fn encode(&self, name: &str, value: &Value) -> Result<String, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidStateValue {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let encoded = match self.encoding {
            StateEncoding::None => match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(invalid("encoding `none` needs a scalar value")),
            },
            StateEncoding::Base64 => match value {
                Value::String(s) => STANDARD.encode(s.as_bytes()),
                _ => return Err(invalid("encoding `base64` needs a string value")),
            },
            StateEncoding::Base64Json => {
                let json = serde_json::to_vec(value).map_err(|e| invalid(&e.to_string()))?;
                STANDARD.encode(json)
            }
        };

        if self.strict_header && !unquote(&encoded).bytes().all(is_cookie_octet) {
            return Err(invalid("value contains characters not allowed in a cookie"));
        }
        Ok(encoded)
    }

    /// Parse a raw request cookie value.
    pub fn decode(&self, name: &str, raw: &str) -> Result<Value, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidStateValue {
            name: name.to_string(),
            reason,
        };
        let raw = unquote(raw);

        match self.encoding {
            StateEncoding::None => Ok(Value::String(raw.to_string())),
            StateEncoding::Base64 => {
                let bytes = STANDARD.decode(raw).map_err(|e| invalid(e.to_string()))?;
                let text = String::from_utf8(bytes).map_err(|e| invalid(e.to_string()))?;
                Ok(Value::String(text))
            }
            StateEncoding::Base64Json => {
                let bytes = STANDARD.decode(raw).map_err(|e| invalid(e.to_string()))?;
                serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))
            }
        }
    }

    /// Build a `Set-Cookie` header value.
    pub fn set_cookie(&self, name: &str, encoded: &str) -> String {
        let mut cookie = format!("{name}={encoded}");

        if let Some(ttl) = self.ttl_secs {
            cookie.push_str(&format!("; Max-Age={ttl}"));
            let expires = i64::try_from(ttl)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .and_then(|delta| Utc::now().checked_add_signed(delta));
            if let Some(expires) = expires {
                cookie.push_str(&format!(
                    "; Expires={}",
                    expires.format("%a, %d %b %Y %H:%M:%S GMT")
                ));
            }
        }

        self.push_attributes(&mut cookie);
        cookie
    }

    /// Build a `Set-Cookie` header value that expires `name` on the client.
    pub fn unset_cookie(&self, name: &str) -> String {
        let mut cookie = format!("{name}=; Max-Age=0; Expires={EPOCH_EXPIRES}");
        self.push_attributes(&mut cookie);
        cookie
    }

    fn push_attributes(&self, cookie: &mut String) {
        if self.is_secure {
            cookie.push_str("; Secure");
        }
        if self.is_http_only {
            cookie.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            cookie.push_str("; SameSite=");
            cookie.push_str(same_site.as_str());
        }
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        if let Some(path) = &self.path {
            cookie.push_str("; Path=");
            cookie.push_str(path);
        }
    }
}

/// Registered state definitions, shared by every request of a server.
#[derive(Debug, Default)]
pub struct StateRegistry {
    definitions: DashMap<String, StateDefinition>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the definition for `name`.
    pub fn register(&self, name: impl Into<String>, definition: StateDefinition) {
        let name = name.into();
        if self.definitions.insert(name.clone(), definition).is_some() {
            tracing::debug!(state = %name, "State definition replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<StateDefinition> {
        self.definitions.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .definitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Decode every cookie carried by `headers`.
    ///
    /// Repeated names collapse into an array in arrival order.
    pub fn parse_request(&self, headers: &HeaderMap) -> BTreeMap<String, Value> {
        let mut states: BTreeMap<String, Value> = BTreeMap::new();

        let pairs = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(parse_cookie_header);

        for (name, raw) in pairs {
            let value = match self.get(name) {
                Some(definition) => match definition.decode(name, raw) {
                    Ok(value) => value,
                    Err(e) => {
                        if !definition.ignore_errors {
                            tracing::warn!(state = %name, error = %e, "Dropping undecodable cookie");
                        }
                        continue;
                    }
                },
                None => Value::String(unquote(raw).to_string()),
            };

            match states.remove(name) {
                None => {
                    states.insert(name.to_string(), value);
                }
                Some(Value::Array(mut values)) => {
                    values.push(value);
                    states.insert(name.to_string(), Value::Array(values));
                }
                Some(previous) => {
                    states.insert(name.to_string(), Value::Array(vec![previous, value]));
                }
            }
        }

        states
    }
}

/// Split a `Cookie` header into `(name, value)` pairs.
pub fn parse_cookie_header(header: &str) -> impl Iterator<Item = (&str, &str)> {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        let name = name.trim();
        (!name.is_empty()).then(|| (name, value.trim()))
    })
}

/// RFC 7230 token check used for cookie names.
pub fn is_valid_state_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
