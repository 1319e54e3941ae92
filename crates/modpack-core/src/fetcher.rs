use std::borrow::Borrow;
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{self, BackendRegistry, CacheKey, Source, SourceBackend};
use crate::cache::CacheStore;
use crate::checksum::{Checksum, HashingWriter};
use crate::config::FetchConfig;
use crate::error::{PackError, Result};
use crate::item::{Item, ItemId};

/// Checksums recorded for one distinct item identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SumsRecord {
    #[serde(flatten)]
    pub id: ItemId,
    pub sums: Vec<Checksum>,
}

/// Coordinates backends and the cache store.
pub struct Fetcher {
    store: CacheStore,
    client: Client,
    backends: BackendRegistry,
}

impl Fetcher {
    pub fn new(store: CacheStore, client: Client, backends: BackendRegistry) -> Self {
        Self {
            store,
            client,
            backends,
        }
    }

    pub fn from_config(cfg: &FetchConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = cfg.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| PackError::Config(format!("failed to build http client: {err}")))?;
        let store = CacheStore::open(&cfg.cache)?;
        Ok(Self::new(
            store,
            client,
            BackendRegistry::builtin(&cfg.endpoints),
        ))
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Makes sure the item is cached and matches its expected checksums,
    /// downloading it only when no cache entry exists yet.
    pub fn ensure_cached(&self, item: &Item) -> Result<()> {
        match self.backends.lookup(&item.method)? {
            Source::Remote(backend) => self.cached_entry(backend.as_ref(), item).map(|_| ()),
            Source::Local(_) => Ok(()),
        }
    }

    /// Opens verified content of the item.
    pub fn open(&self, item: &Item) -> Result<File> {
        match self.backends.lookup(&item.method)? {
            Source::Remote(backend) => {
                let key = self.cached_entry(backend.as_ref(), item)?;
                self.store.open_data(&key)
            }
            Source::Local(local) => local.open(item),
        }
    }

    /// Every checksum recorded for the item's cache entry, sorted and
    /// deduplicated. Local items have none.
    pub fn compute_sums(&self, item: &Item) -> Result<Vec<Checksum>> {
        match self.backends.lookup(&item.method)? {
            Source::Remote(backend) => {
                let key = self.cached_entry(backend.as_ref(), item)?;
                let sums: BTreeSet<Checksum> = self.store.read_sums(&key)?.into_iter().collect();
                Ok(sums.into_iter().collect())
            }
            Source::Local(_) => Ok(Vec::new()),
        }
    }

    /// One record per distinct identity that has checksums, in first-seen
    /// order.
    pub fn collect_sums<'a>(
        &self,
        items: impl IntoIterator<Item = &'a Item>,
    ) -> Result<Vec<SumsRecord>> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for item in items {
            let id = item.identity();
            if !seen.insert(id.clone()) {
                continue;
            }
            let sums = self.compute_sums(item)?;
            if sums.is_empty() {
                continue;
            }
            records.push(SumsRecord { id, sums });
        }
        Ok(records)
    }

    /// Caches every item using up to `jobs` worker threads. Stops starting
    /// new downloads after the first failure and returns that failure.
    pub fn prefetch<T>(&self, items: &[T], jobs: usize) -> Result<()>
    where
        T: Borrow<Item> + Sync,
    {
        if jobs <= 1 || items.len() <= 1 {
            return items
                .iter()
                .try_for_each(|item| self.ensure_cached(item.borrow()));
        }

        let next = AtomicUsize::new(0);
        let failure: Mutex<Option<PackError>> = Mutex::new(None);
        thread::scope(|scope| {
            for _ in 0..jobs.min(items.len()) {
                scope.spawn(|| {
                    loop {
                        if failure.lock().is_some() {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(item) = items.get(index) else {
                            break;
                        };
                        let item = item.borrow();
                        if let Err(err) = self.ensure_cached(item) {
                            warn!(item = %item.identity(), error = %err, "prefetch failed");
                            failure.lock().get_or_insert(err);
                            break;
                        }
                    }
                });
            }
        });
        match failure.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn cached_entry(&self, backend: &dyn SourceBackend, item: &Item) -> Result<CacheKey> {
        let key = backend.locate(item);
        self.fill(backend, item, &key)?;
        self.verify(item, &key)?;
        Ok(key)
    }

    fn fill(&self, backend: &dyn SourceBackend, item: &Item, key: &CacheKey) -> Result<()> {
        if self.store.contains(key)? {
            debug!(item = %item.identity(), key = %key, "cache hit");
            return Ok(());
        }
        let lock = self.store.key_lock(key);
        let result = {
            let _guard = lock.lock();
            // Another worker may have filled the entry while we waited.
            match self.store.contains(key) {
                Ok(true) => Ok(()),
                Ok(false) => backend
                    .resolve(&self.client, item)
                    .and_then(|url| self.download(&url, key)),
                Err(err) => Err(err),
            }
        };
        self.store.release_lock(key, lock);
        result
    }

    fn download(&self, url: &Url, key: &CacheKey) -> Result<()> {
        let mut response = backend::get(&self.client, url)?;
        let mut pending = self.store.begin(key)?;
        let (written, sums) = {
            let mut writer = HashingWriter::new(BufWriter::new(pending.as_file_mut()));
            io::copy(&mut response, &mut writer).map_err(|source| PackError::Transfer {
                url: url.to_string(),
                source,
            })?;
            let written = writer.written();
            let (mut buffered, sums) = writer.finish();
            buffered
                .flush()
                .map_err(|source| PackError::io(self.store.data_path(key), source))?;
            (written, sums)
        };
        self.store.publish(key, pending, &sums)?;
        info!(url = %url, key = %key, bytes = written, "downloaded");
        Ok(())
    }

    fn verify(&self, item: &Item, key: &CacheKey) -> Result<()> {
        if item.checksums.is_empty() {
            return Ok(());
        }
        let recorded: HashSet<Checksum> = self.store.read_sums(key)?.into_iter().collect();
        match item.checksums.iter().find(|sum| !recorded.contains(*sum)) {
            Some(missing) => {
                warn!(item = %item.identity(), expected = %missing, "checksum mismatch");
                Err(PackError::ChecksumMismatch {
                    item: item.identity(),
                    expected: missing.clone(),
                })
            }
            None => Ok(()),
        }
    }
}
