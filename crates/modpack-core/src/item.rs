use std::fmt;

use serde::Serialize;

use crate::checksum::Checksum;
use crate::error::{PackError, Result};

/// One fetchable unit of a pack.
///
/// `method` and `action` are kept as written by the configuration loader so
/// that unsupported values are reported when the item is used, not when it
/// is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    /// Path of the file inside the output archive.
    pub destination: String,
    /// Backend used to download the item (`curse`, `optifine`, `http`, `file`).
    pub method: String,
    /// Post-processing applied to the downloaded file (`""`, `none`, `unzip`).
    pub action: String,
    /// Backend-specific file reference: URL, local path or provider file name.
    pub file: String,
    pub project_id: u64,
    pub file_id: u64,
    /// Checksums the cached file must have been recorded with.
    pub checksums: Vec<Checksum>,
}

impl Item {
    pub fn new(destination: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            method: method.into(),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn with_project(mut self, project_id: u64, file_id: u64) -> Self {
        self.project_id = project_id;
        self.file_id = file_id;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_checksums(mut self, checksums: impl IntoIterator<Item = Checksum>) -> Self {
        self.checksums.extend(checksums);
        self
    }

    pub fn identity(&self) -> ItemId {
        ItemId {
            method: self.method.clone(),
            file: self.file.clone(),
            project_id: self.project_id,
            file_id: self.file_id,
        }
    }

    pub fn parsed_action(&self) -> Result<Action> {
        match self.action.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Action::None),
            "unzip" => Ok(Action::Unzip),
            other => Err(PackError::UnknownAction {
                action: other.to_string(),
                item: self.identity(),
            }),
        }
    }
}

/// Identity fields of an [`Item`]. Two items with equal identities share a
/// cache entry regardless of destination or action.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ItemId {
    pub method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(rename = "projectID", skip_serializing_if = "is_zero")]
    pub project_id: u64,
    #[serde(rename = "fileID", skip_serializing_if = "is_zero")]
    pub file_id: u64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = if self.method.is_empty() {
            "file"
        } else {
            &self.method
        };
        if !self.file.is_empty() {
            write!(f, "{method} `{}`", self.file)
        } else {
            write!(f, "{method} {}/{}", self.project_id, self.file_id)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Unzip,
}
