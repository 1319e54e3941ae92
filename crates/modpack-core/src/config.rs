use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{PackError, Result};

const DEFAULT_CURSE_API: &str = "https://addons-ecs.forgesvc.net/api/v2/addon/";
const DEFAULT_OPTIFINE_URL: &str = "https://optifine.net/";
const CACHE_DIR_NAME: &str = "modpacker";
const DEFAULT_JOBS: usize = 4;

/// Environment-driven configuration for the fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub cache: CacheLocation,
    pub endpoints: Endpoints,
    pub timeout: Option<Duration>,
    pub jobs: usize,
}

impl FetchConfig {
    /// Build a [`FetchConfig`] by reading the documented MODPACK_* variables.
    pub fn from_env() -> Result<Self> {
        let no_cache = env::var("MODPACK_NO_CACHE")
            .ok()
            .map(|value| parse_flag("MODPACK_NO_CACHE", &value))
            .transpose()?
            .unwrap_or(false);
        let cache = if no_cache {
            CacheLocation::Ephemeral
        } else {
            let dir = env::var("MODPACK_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_cache_dir());
            CacheLocation::Dir(dir)
        };

        let mut endpoints = Endpoints::default();
        if let Ok(raw) = env::var("MODPACK_CURSE_API") {
            endpoints.curse_api = parse_base_url("MODPACK_CURSE_API", &raw)?;
        }
        if let Ok(raw) = env::var("MODPACK_OPTIFINE_URL") {
            endpoints.optifine = parse_base_url("MODPACK_OPTIFINE_URL", &raw)?;
        }

        let timeout = env::var("MODPACK_HTTP_TIMEOUT_SECS")
            .ok()
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| {
                        PackError::Config(format!("MODPACK_HTTP_TIMEOUT_SECS `{raw}` is not a number"))
                    })
            })
            .transpose()?;

        let jobs = env::var("MODPACK_JOBS")
            .ok()
            .map(|raw| match raw.trim().parse::<usize>() {
                Ok(jobs) if jobs > 0 => Ok(jobs),
                _ => Err(PackError::Config(format!(
                    "MODPACK_JOBS `{raw}` must be a positive integer"
                ))),
            })
            .transpose()?
            .unwrap_or(DEFAULT_JOBS);

        Ok(Self {
            cache,
            endpoints,
            timeout,
            jobs,
        })
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache = CacheLocation::Dir(dir.into());
        self
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache: CacheLocation::Dir(default_cache_dir()),
            endpoints: Endpoints::default(),
            timeout: None,
            jobs: DEFAULT_JOBS,
        }
    }
}

/// Where cached downloads live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLocation {
    Dir(PathBuf),
    /// Temporary directory removed when the store is dropped.
    Ephemeral,
}

/// Base URLs of the network backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub curse_api: Url,
    pub optifine: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            curse_api: Url::parse(DEFAULT_CURSE_API).expect("default curse endpoint"),
            optifine: Url::parse(DEFAULT_OPTIFINE_URL).expect("default optifine endpoint"),
        }
    }
}

/// Layout of the produced archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Every item is embedded.
    #[default]
    Standalone,
    /// Curse-hosted items are listed in `manifest.json` for the launcher to
    /// download; everything else goes under `overrides/`.
    Curse,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Curse => "curse",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = PackError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standalone" => Ok(Self::Standalone),
            "curse" | "curseforge" | "twitch" => Ok(Self::Curse),
            other => Err(PackError::Config(format!("unknown output mode `{other}`"))),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join(CACHE_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".modpacker-cache"))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PackError::Config(format!("{name} `{other}` is not a boolean"))),
    }
}

// Relative joins against a base without a trailing slash drop its last
// segment, so one is always added.
fn parse_base_url(name: &str, raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|err| PackError::Config(format!("{name} `{raw}`: {err}")))
}
