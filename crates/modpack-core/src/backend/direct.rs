use reqwest::blocking::Client;
use sha1::{Digest, Sha1};
use url::Url;

use super::{CacheKey, SourceBackend};
use crate::error::Result;
use crate::item::Item;

pub(crate) const METHOD: &str = "http";

/// Items whose file reference already is the download URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectBackend;

impl DirectBackend {
    pub const METHOD: &'static str = METHOD;
}

impl SourceBackend for DirectBackend {
    fn method(&self) -> &'static str {
        METHOD
    }

    // Keyed by a hash of the URL, not of the content, with a two character
    // prefix directory to bound fan-out.
    fn locate(&self, item: &Item) -> CacheKey {
        let digest = hex::encode(Sha1::digest(item.file.as_bytes()));
        CacheKey::new(format!("{METHOD}/{}", &digest[..2]), digest)
    }

    fn resolve(&self, _client: &Client, item: &Item) -> Result<Url> {
        super::parse_url(&item.file)
    }
}
