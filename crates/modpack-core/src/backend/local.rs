use std::fs::File;
use std::path::PathBuf;

use crate::error::{PackError, Result};
use crate::item::Item;

pub(crate) const METHOD: &str = "file";

/// Reads items straight from the local filesystem; nothing is cached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalBackend;

impl LocalBackend {
    pub const METHOD: &'static str = METHOD;

    pub fn path(&self, item: &Item) -> PathBuf {
        PathBuf::from(&item.file)
    }

    pub fn open(&self, item: &Item) -> Result<File> {
        let path = self.path(item);
        File::open(&path).map_err(|source| PackError::io(path, source))
    }
}
