//! Modpack building core.
//!
//! This crate provides the building blocks required to download pack items
//! from multiple backends into a checksum-verified on-disk cache and to
//! assemble them into a pack archive, optionally with a launcher manifest
//! listing files the launcher downloads itself.

pub mod backend;
pub mod builder;
pub mod cache;
pub mod checksum;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod item;
pub mod manifest;

pub use backend::{BackendRegistry, CacheKey, SourceBackend};
pub use builder::{CurseManifest, EmbedHook, PackBuilder, Route, Standalone};
pub use cache::CacheStore;
pub use checksum::{Algorithm, Checksum};
pub use config::{CacheLocation, Endpoints, FetchConfig, OutputMode};
pub use error::{PackError, Result};
pub use fetcher::{Fetcher, SumsRecord};
pub use item::{Action, Item, ItemId};
pub use manifest::{ManifestReference, PackMetadata};
