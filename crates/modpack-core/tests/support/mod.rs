#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, ErrorKind, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Result, anyhow};
use modpack_core::{CacheLocation, Endpoints, FetchConfig, Fetcher};
use tiny_http::{Response, Server};
use url::Url;
use zip::ZipWriter;
use zip::write::FileOptions;

/// Local HTTP server answering fixed routes and counting requests per path.
pub struct TestServer {
    base: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    /// Starts a server; `routes` receives the base URL (without trailing
    /// slash) and returns `(path, body)` pairs. Returns `None` when the
    /// sandbox does not allow binding sockets.
    pub fn start(routes: impl FnOnce(&str) -> Vec<(String, Vec<u8>)>) -> Result<Option<Self>> {
        let listener = match TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                eprintln!("skipping http test: {err}");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let base = format!("http://{}", listener.local_addr()?);
        let routes: HashMap<String, Vec<u8>> = routes(&base).into_iter().collect();
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let server =
            Server::from_listener(listener, None).map_err(|err| anyhow!("server error: {err}"))?;
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                let path = request.url().to_string();
                *counter.lock().unwrap().entry(path.clone()).or_insert(0) += 1;
                let _ = match routes.get(&path) {
                    Some(body) => request.respond(Response::from_data(body.clone())),
                    None => request.respond(Response::from_string("missing").with_status_code(404)),
                };
            }
        });
        Ok(Some(Self { base, hits }))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }

    pub fn endpoints(&self) -> Result<Endpoints> {
        Ok(Endpoints {
            curse_api: Url::parse(&self.url("/api/addon/"))?,
            optifine: Url::parse(&self.url("/optifine/"))?,
        })
    }
}

pub fn config(cache: &Path, endpoints: Endpoints) -> FetchConfig {
    FetchConfig {
        cache: CacheLocation::Dir(cache.to_path_buf()),
        endpoints,
        timeout: None,
        jobs: 4,
    }
}

pub fn fetcher(cache: &Path, endpoints: Endpoints) -> Result<Fetcher> {
    Ok(Fetcher::from_config(&config(cache, endpoints))?)
}

/// Endpoints nothing listens on; any request made through them fails.
pub fn unreachable_endpoints() -> Endpoints {
    Endpoints {
        curse_api: Url::parse("http://127.0.0.1:9/api/addon/").unwrap(),
        optifine: Url::parse("http://127.0.0.1:9/optifine/").unwrap(),
    }
}

/// Zip with `a.txt`, a `sub/` directory marker and `sub/b.txt`.
pub fn world_zip() -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();
    writer.start_file("a.txt", options)?;
    writer.write_all(b"alpha")?;
    writer.add_directory("sub/", options)?;
    writer.start_file("sub/b.txt", options)?;
    writer.write_all(b"bravo")?;
    Ok(writer.finish()?.into_inner())
}

pub fn zip_with(entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer.start_file(*name, FileOptions::default())?;
        writer.write_all(contents)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Entry names of an archive, in archive order, with their contents.
pub fn read_entries(bytes: Vec<u8>) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let mut contents = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut contents)?;
        entries.push((entry.name().to_string(), contents));
    }
    Ok(entries)
}
