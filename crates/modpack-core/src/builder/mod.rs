//! Pack archive assembly.
//!
//! [`PackBuilder`] owns the output zip writer and is the only writer of the
//! archive. Before an item is embedded the builder asks its [`EmbedHook`]
//! where the item goes: to a path inside the archive, or into a reference
//! list that the hook turns into generated files when the builder closes.

use std::fs::File;
use std::io::{self, Read, Seek, Write};

use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::OutputMode;
use crate::error::{PackError, Result};
use crate::fetcher::Fetcher;
use crate::item::{Action, Item};
use crate::manifest::PackMetadata;

mod curse;

pub use curse::CurseManifest;

/// Where an item ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Fetch the item and write it at this archive path.
    Embed(String),
    /// The hook recorded the item; nothing is fetched or written.
    Reference,
}

/// File produced by a hook when the archive is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub contents: Vec<u8>,
}

/// Decides, per item, between embedding and external reference.
pub trait EmbedHook {
    fn route(&mut self, item: &Item) -> Result<Route>;

    /// Extra archive entries written right before the archive is finished.
    fn finalize(&mut self) -> Result<Vec<GeneratedFile>>;
}

impl<H: EmbedHook + ?Sized> EmbedHook for Box<H> {
    fn route(&mut self, item: &Item) -> Result<Route> {
        (**self).route(item)
    }

    fn finalize(&mut self) -> Result<Vec<GeneratedFile>> {
        (**self).finalize()
    }
}

/// Embeds every item at its own destination.
#[derive(Debug, Default, Clone, Copy)]
pub struct Standalone;

impl EmbedHook for Standalone {
    fn route(&mut self, item: &Item) -> Result<Route> {
        Ok(Route::Embed(item.destination.clone()))
    }

    fn finalize(&mut self) -> Result<Vec<GeneratedFile>> {
        Ok(Vec::new())
    }
}

impl OutputMode {
    pub fn hook(self, meta: PackMetadata) -> Box<dyn EmbedHook + Send> {
        match self {
            Self::Standalone => Box::new(Standalone),
            Self::Curse => Box::new(CurseManifest::new(meta)),
        }
    }
}

pub struct PackBuilder<'f, W: Write + Seek, H = Standalone> {
    fetcher: &'f Fetcher,
    archive: ZipWriter<W>,
    hook: H,
}

impl<'f, W: Write + Seek> PackBuilder<'f, W, Standalone> {
    pub fn new(fetcher: &'f Fetcher, writer: W) -> Self {
        Self::with_hook(fetcher, writer, Standalone)
    }
}

impl<'f, W: Write + Seek, H: EmbedHook> PackBuilder<'f, W, H> {
    pub fn with_hook(fetcher: &'f Fetcher, writer: W, hook: H) -> Self {
        Self {
            fetcher,
            archive: ZipWriter::new(writer),
            hook,
        }
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn add(&mut self, item: &Item) -> Result<()> {
        match self.hook.route(item)? {
            Route::Embed(destination) => self.embed(item, &destination),
            Route::Reference => Ok(()),
        }
    }

    /// Adds items in order, downloading the embedded ones with up to `jobs`
    /// concurrent workers first. Archive writes stay sequential.
    pub fn add_all(&mut self, items: &[Item], jobs: usize) -> Result<()> {
        let mut planned = Vec::new();
        for item in items {
            if let Route::Embed(destination) = self.hook.route(item)? {
                planned.push((item, destination));
            }
        }
        let embedded: Vec<&Item> = planned.iter().map(|(item, _)| *item).collect();
        self.fetcher.prefetch(&embedded, jobs)?;
        for (item, destination) in &planned {
            self.embed(item, destination)?;
        }
        Ok(())
    }

    /// Writes hook-generated files and finishes the archive.
    pub fn close(mut self) -> Result<W> {
        for file in self.hook.finalize()? {
            self.write_entry(&file.path, &mut file.contents.as_slice())?;
        }
        let writer = self
            .archive
            .finish()
            .map_err(|err| PackError::archive("failed to finish pack archive", err))?;
        info!("pack archive finished");
        Ok(writer)
    }

    fn embed(&mut self, item: &Item, destination: &str) -> Result<()> {
        let action = item.parsed_action()?;
        let mut source = self.fetcher.open(item)?;
        match action {
            Action::None => self.write_entry(destination, &mut source),
            Action::Unzip => self.expand(source, destination),
        }
    }

    // Directory entries of the nested archive are skipped, so empty
    // directories do not make it into the pack.
    fn expand(&mut self, source: File, destination: &str) -> Result<()> {
        let mut nested = ZipArchive::new(source).map_err(|err| {
            PackError::archive(format!("content for `{destination}` is not a zip archive"), err)
        })?;
        for index in 0..nested.len() {
            let mut entry = nested.by_index(index).map_err(|err| {
                PackError::archive(format!("failed to read entry #{index} for `{destination}`"), err)
            })?;
            let name = entry.name().to_string();
            if name.ends_with('/') {
                debug!(entry = %name, "skipping directory entry");
                continue;
            }
            let path = join_entry(destination, &name)?;
            self.write_entry(&path, &mut entry)?;
        }
        Ok(())
    }

    fn write_entry(&mut self, name: &str, reader: &mut dyn Read) -> Result<()> {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        self.archive
            .start_file(name, options)
            .map_err(|err| PackError::archive(format!("failed to start entry `{name}`"), err))?;
        io::copy(reader, &mut self.archive).map_err(|err| {
            PackError::archive(format!("failed to write entry `{name}`"), err.into())
        })?;
        debug!(entry = %name, "wrote archive entry");
        Ok(())
    }
}

/// Joins a nested archive entry name onto `destination`, refusing names that
/// would leave it. Backslash separators are read as `/`.
pub(crate) fn join_entry(destination: &str, name: &str) -> Result<String> {
    let unsafe_entry = || PackError::UnsafeEntryPath {
        name: name.to_string(),
        destination: destination.to_string(),
    };
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') || is_drive_prefix(normalized.split('/').next()) {
        return Err(unsafe_entry());
    }
    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(unsafe_entry()),
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return Err(unsafe_entry());
    }
    let base = destination.trim_end_matches('/');
    let relative = segments.join("/");
    if base.is_empty() {
        Ok(relative)
    } else {
        Ok(format!("{base}/{relative}"))
    }
}

// `C:` and the like.
fn is_drive_prefix(segment: Option<&str>) -> bool {
    matches!(segment.map(str::as_bytes), Some([letter, b':']) if letter.is_ascii_alphabetic())
}
