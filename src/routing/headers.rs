//! Request header view used by the matching engine.
//!
//! # Responsibilities
//! - Hold request headers with lowercase names
//! - Carry the path, query string and method as pseudo headers so every
//!   protocol (HTTP or RPC) is matched through the same map
//! - Parse the query string into ordered key/value pairs
//!
//! # Design Decisions
//! - Names are lowercased on insert; lookups with lowercase names never allocate
//! - Repeated HTTP headers are folded into one comma-joined value
//! - Client headers in the `x-mesh-` namespace are dropped by the adapter,
//!   and the pre-rewrite path lives outside the header map
//! - Query parsing never fails: malformed input degrades to what can be decoded

use std::collections::HashMap;

use axum::http::{header::HOST, Request};

/// Pseudo header carrying the request path (without query string).
pub const PATH_HEADER: &str = "x-mesh-path";
/// Pseudo header carrying the raw query string (without `?`).
pub const QUERY_STRING_HEADER: &str = "x-mesh-querystring";
/// Pseudo header carrying the request method.
pub const METHOD_HEADER: &str = "x-mesh-method";
/// Namespace reserved for pseudo headers.
pub const PSEUDO_HEADER_PREFIX: &str = "x-mesh-";
/// Application routing key matched by service routes.
pub const SERVICE_HEADER: &str = "service";
/// Host header (authority).
pub const HOST_HEADER: &str = "host";

/// Parsed query string, in request order.
pub type QueryParams = Vec<(String, String)>;

/// Parse a raw query string into ordered, percent-decoded pairs.
pub fn parse_query_string(raw: &str) -> QueryParams {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Request headers keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: HashMap<String, String>,
    /// Path before the first rewrite; never taken from the client.
    original_path: Option<String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: HashMap::with_capacity(capacity),
            original_path: None,
        }
    }

    /// Build the routing view of an HTTP request.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let mut headers = Self::with_capacity(request.headers().len() + 3);

        for (name, value) in request.headers() {
            if is_pseudo_header(name.as_str()) {
                tracing::debug!(header = %name, "Dropping client header in pseudo header namespace");
                continue;
            }
            match value.to_str() {
                Ok(value) => headers.append(name.as_str(), value),
                Err(_) => {
                    tracing::trace!(header = %name, "Skipping non-ASCII header value");
                }
            }
        }

        if !headers.contains(HOST.as_str()) {
            if let Some(authority) = request.uri().authority() {
                headers.insert(HOST_HEADER, authority.as_str());
            }
        }

        headers.insert(PATH_HEADER, request.uri().path());
        match request.uri().query() {
            Some(query) => headers.insert(QUERY_STRING_HEADER, query),
            None => {
                headers.remove(QUERY_STRING_HEADER);
            }
        }
        headers.insert(METHOD_HEADER, request.method().as_str());

        headers
    }

    /// Look up a header value.
    pub fn get(&self, name: &str) -> Option<&str> {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            return self
                .inner
                .get(&name.to_ascii_lowercase())
                .map(String::as_str);
        }
        self.inner.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a header, replacing any existing value.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Add a value, comma-joining it to an existing one.
    pub fn append(&mut self, name: impl AsRef<str>, value: &str) {
        let name = name.as_ref().to_ascii_lowercase();
        match self.inner.get_mut(&name) {
            Some(existing) if !existing.is_empty() => {
                existing.push(',');
                existing.push_str(value);
            }
            _ => {
                self.inner.insert(name, value.to_string());
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.inner.remove(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Request path, if the protocol carries one.
    pub fn path(&self) -> Option<&str> {
        self.get(PATH_HEADER)
    }

    pub fn host(&self) -> Option<&str> {
        self.get(HOST_HEADER)
    }

    pub fn method(&self) -> Option<&str> {
        self.get(METHOD_HEADER)
    }

    /// Path as received, before any prefix rewrite.
    pub fn original_path(&self) -> Option<&str> {
        self.original_path.as_deref()
    }

    /// Remember the pre-rewrite path. Only the first call has an effect.
    pub fn set_original_path(&mut self, path: impl Into<String>) {
        if self.original_path.is_none() {
            self.original_path = Some(path.into());
        }
    }

    /// Headers to send upstream: everything but the pseudo headers.
    pub fn upstream_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(name, _)| !is_pseudo_header(name))
    }

    /// Parsed query parameters; empty when there is no query string.
    pub fn query_params(&self) -> QueryParams {
        self.get(QUERY_STRING_HEADER)
            .map(parse_query_string)
            .unwrap_or_default()
    }
}

fn is_pseudo_header(name: &str) -> bool {
    name.as_bytes()
        .get(..PSEUDO_HEADER_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(PSEUDO_HEADER_PREFIX.as_bytes()))
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}
