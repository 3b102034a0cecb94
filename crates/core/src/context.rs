//! Ambient request context.
//!
//! The full URL of the current unit of work takes part in every cache key so
//! that request-dependent criteria (query parameters read inside a criterion)
//! never collide. The same context carries the cache bypass parameter.

use url::Url;

use crate::Error;
use crate::fingerprint::NO_REQUEST_CONTEXT;

/// The request that drives the current unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    full_url: String,
    query: Vec<(String, String)>,
}

impl RequestContext {
    /// Build a context from an absolute URL.
    ///
    /// The URL is parsed so query parameters can be inspected; the original
    /// string is kept verbatim as the fingerprint component.
    pub fn from_url(full_url: &str) -> Result<Self, Error> {
        let parsed = Url::parse(full_url).map_err(|e| Error::InvalidInput(format!("invalid request URL: {e}")))?;
        let query = parsed.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        Ok(Self { full_url: full_url.to_string(), query })
    }

    /// Build a context from an opaque identifier with explicit parameters.
    ///
    /// Used by hosts whose units of work are not HTTP requests (queue jobs,
    /// RPC calls) but still want per-call variation in keys.
    pub fn new(full_url: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self { full_url: full_url.into(), query }
    }

    pub fn full_url(&self) -> &str {
        &self.full_url
    }

    /// First value of the named query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Whether the named bypass parameter is present with a truthy value.
    ///
    /// Empty strings, `0` and `false` count as absent.
    pub fn bypass_requested(&self, param: &str) -> bool {
        match self.query_param(param) {
            Some(value) => !matches!(value.trim(), "" | "0" | "false"),
            None => false,
        }
    }
}

/// The ambient component of a fingerprint.
pub fn fingerprint_component(ctx: Option<&RequestContext>) -> &str {
    ctx.map(RequestContext::full_url).unwrap_or(NO_REQUEST_CONTEXT)
}
