//! `manifest.json` consumed by the CurseForge/Twitch launcher.

use serde::{Deserialize, Serialize};

use crate::error::{PackError, Result};

pub const MANIFEST_NAME: &str = "manifest.json";
pub const OVERRIDES_DIR: &str = "overrides";
const MANIFEST_TYPE: &str = "minecraftModpack";
const MANIFEST_VERSION: u32 = 1;

/// File the launcher downloads itself instead of reading it from the pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestReference {
    #[serde(rename = "projectID")]
    pub project_id: u64,
    #[serde(rename = "fileID")]
    pub file_id: u64,
    pub required: bool,
}

/// Static pack metadata copied into the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackMetadata {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub project_id: u64,
    pub game_version: String,
    /// Loader ids such as `forge-36.2.0`; the first one is primary.
    pub mod_loaders: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub manifest_type: String,
    pub manifest_version: u32,
    pub minecraft: MinecraftInstance,
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    #[serde(rename = "projectID")]
    pub project_id: u64,
    pub files: Vec<ManifestReference>,
    pub overrides: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinecraftInstance {
    pub version: String,
    pub mod_loaders: Vec<ModLoader>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModLoader {
    pub id: String,
    pub primary: bool,
}

impl Manifest {
    pub fn new(meta: &PackMetadata, files: &[ManifestReference]) -> Self {
        let mod_loaders = meta
            .mod_loaders
            .iter()
            .enumerate()
            .map(|(index, id)| ModLoader {
                id: id.clone(),
                primary: index == 0,
            })
            .collect();
        Self {
            manifest_type: MANIFEST_TYPE.to_string(),
            manifest_version: MANIFEST_VERSION,
            minecraft: MinecraftInstance {
                version: meta.game_version.clone(),
                mod_loaders,
            },
            name: meta.name.clone(),
            version: meta.version.clone(),
            author: meta.author.clone(),
            description: meta.description.clone(),
            project_id: meta.project_id,
            files: files.to_vec(),
            overrides: OVERRIDES_DIR.to_string(),
        }
    }
}

/// Serializes the manifest document.
pub fn emit(meta: &PackMetadata, files: &[ManifestReference]) -> Result<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec_pretty(&Manifest::new(meta, files)).map_err(PackError::Manifest)?;
    bytes.push(b'\n');
    Ok(bytes)
}
