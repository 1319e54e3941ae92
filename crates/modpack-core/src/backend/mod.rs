//! Source backends: one fetch strategy per item method.
//!
//! Every remote backend knows how to derive a [`CacheKey`] from an item's
//! identity without touching the network, and how to turn that identity into
//! the URL of the actual content. The local backend skips the cache entirely.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use reqwest::blocking::{Client, Response};
use url::Url;

use crate::config::Endpoints;
use crate::error::{PackError, Result};
use crate::item::Item;

mod api;
mod direct;
mod local;
mod scrape;

pub use api::ApiBackend;
pub use direct::DirectBackend;
pub use local::LocalBackend;
pub use scrape::ScrapeBackend;

/// Location of a cache entry relative to the cache root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    dir: String,
    base: String,
}

impl CacheKey {
    pub fn new(dir: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base: base.into(),
        }
    }

    /// Slash separated directory below the cache root.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dir, self.base)
    }
}

/// A remote source of pack items.
pub trait SourceBackend: Send + Sync {
    /// Item method this backend serves.
    fn method(&self) -> &'static str;

    /// Derives the cache location from the item's identity. Must not perform
    /// any I/O.
    fn locate(&self, item: &Item) -> CacheKey;

    /// Resolves the item to the URL its content is downloaded from.
    fn resolve(&self, client: &Client, item: &Item) -> Result<Url>;
}

/// Backend selected for an item method.
#[derive(Clone)]
pub enum Source {
    Remote(Arc<dyn SourceBackend>),
    Local(LocalBackend),
}

#[derive(Default, Clone)]
pub struct BackendRegistry {
    sources: HashMap<String, Source>,
}

impl BackendRegistry {
    pub fn register(&mut self, backend: impl SourceBackend + 'static) {
        self.sources.insert(
            backend.method().to_string(),
            Source::Remote(Arc::new(backend)),
        );
    }

    pub fn register_local(&mut self, method: &str) {
        self.sources
            .insert(method.to_ascii_lowercase(), Source::Local(LocalBackend));
    }

    pub fn builtin(endpoints: &Endpoints) -> Self {
        let mut registry = Self::default();
        registry.register(ApiBackend::new(endpoints.curse_api.clone()));
        registry.register(ScrapeBackend::new(endpoints.optifine.clone()));
        registry.register(DirectBackend);
        registry.register_local(local::METHOD);
        registry.register_local("");
        registry
    }

    pub fn lookup(&self, method: &str) -> Result<&Source> {
        self.sources
            .get(&method.to_ascii_lowercase())
            .ok_or_else(|| PackError::UnknownMethod {
                method: method.to_string(),
            })
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|source| PackError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

pub(crate) fn join_url(base: &Url, reference: &str) -> Result<Url> {
    base.join(reference).map_err(|source| PackError::InvalidUrl {
        url: reference.to_string(),
        source,
    })
}

/// Issues a GET request and rejects non-success statuses.
pub(crate) fn get(client: &Client, url: &Url) -> Result<Response> {
    client
        .get(url.clone())
        .send()
        .and_then(Response::error_for_status)
        .map_err(|source| PackError::Http {
            url: url.to_string(),
            source,
        })
}

/// Reads at most `limit` bytes of the response body; the rest is discarded.
pub(crate) fn read_capped(response: Response, limit: u64, url: &Url) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    response
        .take(limit)
        .read_to_end(&mut body)
        .map_err(|source| PackError::Transfer {
            url: url.to_string(),
            source,
        })?;
    Ok(body)
}

/// Turns an arbitrary string into a single safe path segment.
pub(crate) fn sanitize_segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect();
    match cleaned.as_str() {
        "" => "_".to_string(),
        "." | ".." => cleaned.replace('.', "_"),
        _ => cleaned,
    }
}
