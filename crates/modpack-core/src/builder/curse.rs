use tracing::info;

use super::{EmbedHook, GeneratedFile, Route};
use crate::backend::ApiBackend;
use crate::error::Result;
use crate::item::{Action, Item};
use crate::manifest::{self, MANIFEST_NAME, ManifestReference, OVERRIDES_DIR, PackMetadata};

/// Lists launcher-resolvable files in `manifest.json` and moves everything
/// else under `overrides/`.
#[derive(Debug, Clone, Default)]
pub struct CurseManifest {
    meta: PackMetadata,
    files: Vec<ManifestReference>,
}

impl CurseManifest {
    pub fn new(meta: PackMetadata) -> Self {
        Self {
            meta,
            files: Vec::new(),
        }
    }

    pub fn references(&self) -> &[ManifestReference] {
        &self.files
    }

    fn is_native(item: &Item) -> bool {
        item.method.eq_ignore_ascii_case(ApiBackend::METHOD)
    }
}

impl EmbedHook for CurseManifest {
    fn route(&mut self, item: &Item) -> Result<Route> {
        if Self::is_native(item) && item.parsed_action()? == Action::None {
            self.files.push(ManifestReference {
                project_id: item.project_id,
                file_id: item.file_id,
                required: true,
            });
            return Ok(Route::Reference);
        }
        let destination = item.destination.trim_start_matches('/');
        Ok(Route::Embed(format!("{OVERRIDES_DIR}/{destination}")))
    }

    fn finalize(&mut self) -> Result<Vec<GeneratedFile>> {
        let contents = manifest::emit(&self.meta, &self.files)?;
        info!(references = self.files.len(), "emitting host manifest");
        Ok(vec![GeneratedFile {
            path: MANIFEST_NAME.to_string(),
            contents,
        }])
    }
}
