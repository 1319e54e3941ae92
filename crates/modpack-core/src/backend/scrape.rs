use std::sync::LazyLock;

use reqwest::blocking::Client;
use scraper::{Html, Selector};
use url::Url;

use super::{CacheKey, SourceBackend};
use crate::error::{PackError, Result};
use crate::item::Item;

pub(crate) const METHOD: &str = "optifine";

/// Download pages larger than this are truncated before parsing.
const PAGE_LIMIT: u64 = 1024 * 1024;

static DOWNLOAD_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#Download > a").expect("static selector"));

/// Resolves file names by scraping the provider's download page.
pub struct ScrapeBackend {
    base: Url,
}

impl ScrapeBackend {
    pub const METHOD: &'static str = METHOD;

    pub fn new(base: Url) -> Self {
        Self { base }
    }

    fn page(&self, file: &str) -> Result<Url> {
        let mut page = super::join_url(&self.base, "adloadx")?;
        page.query_pairs_mut().append_pair("f", file);
        Ok(page)
    }

    fn extract_link(&self, document: &str, page: &Url) -> Result<Url> {
        let unexpected = || PackError::UnexpectedNode {
            url: page.to_string(),
        };
        let html = Html::parse_document(document);
        let node = html.select(&DOWNLOAD_LINK).next().ok_or_else(unexpected)?;
        let href = node.value().attr("href").ok_or_else(unexpected)?;
        super::join_url(&self.base, href.trim())
    }
}

impl SourceBackend for ScrapeBackend {
    fn method(&self) -> &'static str {
        METHOD
    }

    fn locate(&self, item: &Item) -> CacheKey {
        CacheKey::new(METHOD, super::sanitize_segment(&item.file))
    }

    fn resolve(&self, client: &Client, item: &Item) -> Result<Url> {
        let page = self.page(&item.file)?;
        let response = super::get(client, &page)?;
        let body = super::read_capped(response, PAGE_LIMIT, &page)?;
        self.extract_link(&String::from_utf8_lossy(&body), &page)
    }
}
