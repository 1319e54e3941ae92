use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::checksum::Checksum;
use crate::item::ItemId;

/// Unified error across the fetcher and builder.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("unknown method `{method}`")]
    UnknownMethod { method: String },

    #[error("unknown action `{action}` for {item}")]
    UnknownAction { action: String, item: ItemId },

    #[error("checksum mismatch for {item}: `{expected}` is not recorded for the cached file")]
    ChecksumMismatch { item: ItemId, expected: Checksum },

    #[error("unexpected html node in page {url}")]
    UnexpectedNode { url: String },

    #[error("invalid checksum `{raw}`; expected algorithm:hexdigest")]
    InvalidChecksum { raw: String },

    #[error("archive entry `{name}` escapes destination `{destination}`")]
    UnsafeEntryPath { name: String, destination: String },

    #[error("invalid url `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response body from {url}")]
    Transfer {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive error: {context}")]
    Archive {
        context: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to encode host manifest")]
    Manifest(#[source] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PackError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(context: impl Into<String>, source: zip::result::ZipError) -> Self {
        Self::Archive {
            context: context.into(),
            source,
        }
    }
}

/// Result alias for pack operations.
pub type Result<T> = std::result::Result<T, PackError>;
