use reqwest::blocking::Client;
use url::Url;

use super::{CacheKey, SourceBackend};
use crate::error::Result;
use crate::item::Item;

pub(crate) const METHOD: &str = "curse";

/// Download-URL responses larger than this are truncated.
const RESPONSE_LIMIT: u64 = 1024;

/// Resolves project/file pairs through the provider's download-url endpoint.
pub struct ApiBackend {
    base: Url,
}

impl ApiBackend {
    pub const METHOD: &'static str = METHOD;

    pub fn new(base: Url) -> Self {
        Self { base }
    }

    fn endpoint(&self, project_id: u64, file_id: u64) -> Result<Url> {
        super::join_url(
            &self.base,
            &format!("{project_id}/file/{file_id}/download-url"),
        )
    }
}

impl SourceBackend for ApiBackend {
    fn method(&self) -> &'static str {
        METHOD
    }

    fn locate(&self, item: &Item) -> CacheKey {
        CacheKey::new(
            format!("{METHOD}/{}", item.project_id),
            item.file_id.to_string(),
        )
    }

    fn resolve(&self, client: &Client, item: &Item) -> Result<Url> {
        let endpoint = self.endpoint(item.project_id, item.file_id)?;
        let response = super::get(client, &endpoint)?;
        let body = super::read_capped(response, RESPONSE_LIMIT, &endpoint)?;
        let raw = String::from_utf8_lossy(&body);
        tracing::debug!(endpoint = %endpoint, "resolved download url");
        super::parse_url(raw.trim())
    }
}
