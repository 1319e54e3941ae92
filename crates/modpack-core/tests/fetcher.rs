mod support;

use std::fs;
use std::io::{ErrorKind, Read};

use anyhow::Result;
use modpack_core::{CacheKey, Checksum, Item, PackError};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;
use support::{TestServer, fetcher, unreachable_endpoints};
use tempfile::TempDir;

const JEI: &[u8] = b"jei jar contents";
const OPTIFINE: &[u8] = b"optifine jar contents";
const DIRECT: &[u8] = b"direct download contents";

fn start() -> Result<Option<TestServer>> {
    TestServer::start(|base| {
        vec![
            (
                "/api/addon/10/file/20/download-url".to_string(),
                format!("{base}/files/jei.jar\n").into_bytes(),
            ),
            ("/files/jei.jar".to_string(), JEI.to_vec()),
            (
                "/optifine/adloadx?f=OptiFine_1.16.5.jar".to_string(),
                br#"<html><body><span id="Download">
                    <a href="/files/optifine.jar">Download</a>
                </span></body></html>"#
                    .to_vec(),
            ),
            ("/files/optifine.jar".to_string(), OPTIFINE.to_vec()),
            ("/files/direct.zip".to_string(), DIRECT.to_vec()),
        ]
    })
}

fn jei() -> Item {
    Item::new("mods/jei.jar", "curse").with_project(10, 20)
}

fn read_all(mut file: fs::File) -> Result<Vec<u8>> {
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

fn sha256(bytes: &[u8]) -> Checksum {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
        .parse()
        .unwrap()
}

#[test]
fn api_item_is_resolved_and_downloaded_once() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;

    fetcher.ensure_cached(&jei())?;
    fetcher.ensure_cached(&jei())?;
    let contents = read_all(fetcher.open(&jei())?)?;

    assert_eq!(contents, JEI);
    assert_eq!(server.hits("/api/addon/10/file/20/download-url"), 1);
    assert_eq!(server.hits("/files/jei.jar"), 1);
    let key = CacheKey::new("curse/10", "20");
    assert!(fetcher.store().data_path(&key).is_file());
    assert!(fetcher.store().sums_path(&key).is_file());
    Ok(())
}

#[test]
fn cache_survives_a_new_fetcher() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    fetcher(cache.path(), server.endpoints()?)?.ensure_cached(&jei())?;

    // Same cache directory, no reachable backend.
    let offline = fetcher(cache.path(), unreachable_endpoints())?;
    assert_eq!(read_all(offline.open(&jei())?)?, JEI);
    assert_eq!(server.total_hits(), 2);
    Ok(())
}

#[test]
fn recorded_sums_verify_the_cached_file() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;

    let sums = fetcher.compute_sums(&jei())?;
    assert_eq!(sums.len(), 4);
    assert!(sums.contains(&sha256(JEI)));
    assert!(sums.windows(2).all(|pair| pair[0] < pair[1]));

    let pinned = jei().with_checksums(sums);
    assert_eq!(read_all(fetcher.open(&pinned)?)?, JEI);
    assert_eq!(server.hits("/files/jei.jar"), 1);
    Ok(())
}

#[test]
fn keccak256_labelled_sum_verifies() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let pinned: Checksum = format!("keccak256:{}", hex::encode(Sha3_256::digest(JEI))).parse()?;

    let item = jei().with_checksums([pinned.clone()]);
    assert_eq!(read_all(fetcher.open(&item)?)?, JEI);
    assert!(fetcher.compute_sums(&jei())?.contains(&pinned));
    Ok(())
}

#[test]
fn api_response_is_read_up_to_one_kibibyte() -> Result<()> {
    let Some(server) = TestServer::start(|base| {
        let link = format!("{base}/files/jei.jar");
        // Whitespace pads the link to the limit; the tail would turn it into
        // a different path if it were read.
        let mut body = format!("{link:<1024}").into_bytes();
        body.extend_from_slice(b"-tail/../../elsewhere.jar");
        vec![
            ("/api/addon/10/file/20/download-url".to_string(), body),
            ("/files/jei.jar".to_string(), JEI.to_vec()),
        ]
    })?
    else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;

    assert_eq!(read_all(fetcher.open(&jei())?)?, JEI);
    assert_eq!(server.hits("/files/jei.jar"), 1);
    Ok(())
}

#[test]
fn scrape_page_is_read_up_to_one_mebibyte() -> Result<()> {
    let Some(server) = TestServer::start(|_| {
        let mut page = b"<html><body><p>".to_vec();
        page.resize(page.len() + 1024 * 1024, b'x');
        page.extend_from_slice(
            br#"</p><span id="Download"><a href="/files/optifine.jar">Download</a></span></body></html>"#,
        );
        vec![
            ("/optifine/adloadx?f=late.jar".to_string(), page),
            ("/files/optifine.jar".to_string(), OPTIFINE.to_vec()),
        ]
    })?
    else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let item = Item::new("mods/late.jar", "optifine").with_file("late.jar");

    assert!(matches!(
        fetcher.ensure_cached(&item),
        Err(PackError::UnexpectedNode { .. })
    ));
    assert_eq!(server.hits("/files/optifine.jar"), 0);
    Ok(())
}

#[test]
fn concurrent_pinned_fetches_of_one_entry_agree() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let items: Vec<Item> = (0..32)
        .map(|_| jei().with_checksums([sha256(JEI)]))
        .collect();

    fetcher.prefetch(&items, 8)?;

    let key = CacheKey::new("curse/10", "20");
    assert_eq!(fs::read_to_string(fetcher.store().sums_path(&key))?.lines().count(), 4);
    assert_eq!(server.hits("/files/jei.jar"), 1);
    Ok(())
}

#[test]
fn unknown_checksum_is_rejected_but_entry_is_kept() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let wrong: Checksum = format!("sha256:{}", "0".repeat(64)).parse()?;
    let pinned = jei().with_checksums([wrong.clone()]);

    let err = fetcher.open(&pinned).unwrap_err();
    match err {
        PackError::ChecksumMismatch { item, expected } => {
            assert_eq!(item, jei().identity());
            assert_eq!(expected, wrong);
        }
        other => panic!("unexpected error: {other}"),
    }
    let key = CacheKey::new("curse/10", "20");
    assert!(fetcher.store().data_path(&key).is_file());

    // A second attempt is answered from the cache and fails the same way.
    assert!(matches!(
        fetcher.ensure_cached(&pinned),
        Err(PackError::ChecksumMismatch { .. })
    ));
    assert_eq!(server.hits("/files/jei.jar"), 1);
    Ok(())
}

#[test]
fn redownload_appends_to_the_sidecar() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let key = CacheKey::new("curse/10", "20");

    fetcher.ensure_cached(&jei())?;
    fs::remove_file(fetcher.store().data_path(&key))?;
    fetcher.ensure_cached(&jei())?;

    let sidecar = fs::read_to_string(fetcher.store().sums_path(&key))?;
    assert_eq!(sidecar.lines().count(), 8);
    assert!(sidecar.ends_with('\n'));
    assert_eq!(fetcher.compute_sums(&jei())?.len(), 4);
    assert_eq!(server.hits("/files/jei.jar"), 2);
    Ok(())
}

#[test]
fn scraped_item_follows_the_download_link() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let item = Item::new("mods/optifine.jar", "optifine").with_file("OptiFine_1.16.5.jar");

    assert_eq!(read_all(fetcher.open(&item)?)?, OPTIFINE);
    assert_eq!(server.hits("/optifine/adloadx?f=OptiFine_1.16.5.jar"), 1);
    assert!(
        fetcher
            .store()
            .data_path(&CacheKey::new("optifine", "OptiFine_1.16.5.jar"))
            .is_file()
    );
    Ok(())
}

#[test]
fn scrape_without_download_anchor_fails() -> Result<()> {
    let Some(server) = TestServer::start(|_| {
        vec![(
            "/optifine/adloadx?f=gone.jar".to_string(),
            b"<html><body>mirror offline</body></html>".to_vec(),
        )]
    })?
    else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let item = Item::new("mods/gone.jar", "optifine").with_file("gone.jar");

    assert!(matches!(
        fetcher.ensure_cached(&item),
        Err(PackError::UnexpectedNode { .. })
    ));
    Ok(())
}

#[test]
fn direct_item_is_keyed_by_url() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let url = server.url("/files/direct.zip");
    let item = Item::new("config/direct.zip", "http").with_file(url.clone());

    assert_eq!(read_all(fetcher.open(&item)?)?, DIRECT);

    let digest = hex::encode(sha1::Sha1::digest(url.as_bytes()));
    let key = CacheKey::new(format!("http/{}", &digest[..2]), digest);
    assert!(fetcher.store().data_path(&key).is_file());
    Ok(())
}

#[test]
fn http_error_status_leaves_no_entry() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let item = Item::new("mods/missing.jar", "http").with_file(server.url("/files/missing.jar"));

    assert!(matches!(
        fetcher.ensure_cached(&item),
        Err(PackError::Http { .. })
    ));
    // Nothing was committed, so a retry goes back to the network.
    assert!(fetcher.ensure_cached(&item).is_err());
    assert_eq!(server.hits("/files/missing.jar"), 2);
    Ok(())
}

#[test]
fn unknown_method_fails_before_any_io() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let item = Item::new("mods/a.jar", "torrent").with_file(server.url("/files/jei.jar"));

    match fetcher.open(&item) {
        Err(PackError::UnknownMethod { method }) => assert_eq!(method, "torrent"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(server.total_hits(), 0);
    assert!(fs::read_dir(cache.path())?.next().is_none());
    Ok(())
}

#[test]
fn local_items_bypass_the_cache() -> Result<()> {
    let cache = TempDir::new()?;
    let source = TempDir::new()?;
    let path = source.path().join("options.txt");
    fs::write(&path, b"fov:90")?;
    let fetcher = fetcher(cache.path(), unreachable_endpoints())?;

    for method in ["file", ""] {
        let item = Item::new("options.txt", method).with_file(path.display().to_string());
        fetcher.ensure_cached(&item)?;
        assert_eq!(read_all(fetcher.open(&item)?)?, b"fov:90");
        assert!(fetcher.compute_sums(&item)?.is_empty());
    }
    assert!(fs::read_dir(cache.path())?.next().is_none());

    let missing = Item::new("gone.txt", "file")
        .with_file(source.path().join("gone.txt").display().to_string());
    match fetcher.open(&missing) {
        Err(PackError::Io { source, .. }) => assert_eq!(source.kind(), ErrorKind::NotFound),
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn prefetch_fills_every_distinct_entry_once() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let items = vec![
        jei(),
        Item::new("mods/optifine.jar", "optifine").with_file("OptiFine_1.16.5.jar"),
        Item::new("config/direct.zip", "http").with_file(server.url("/files/direct.zip")),
        jei().with_action("unzip"),
        jei(),
    ];

    fetcher.prefetch(&items, 4)?;

    assert_eq!(server.hits("/files/jei.jar"), 1);
    assert_eq!(server.hits("/files/optifine.jar"), 1);
    assert_eq!(server.hits("/files/direct.zip"), 1);
    Ok(())
}

#[test]
fn prefetch_reports_a_failure() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let fetcher = fetcher(cache.path(), server.endpoints()?)?;
    let items = vec![
        jei(),
        Item::new("mods/missing.jar", "http").with_file(server.url("/files/missing.jar")),
    ];

    assert!(matches!(
        fetcher.prefetch(&items, 2),
        Err(PackError::Http { .. })
    ));
    Ok(())
}

#[test]
fn collect_sums_lists_each_identity_once() -> Result<()> {
    let Some(server) = start()? else {
        return Ok(());
    };
    let cache = TempDir::new()?;
    let local = cache.path().join("local.txt");
    let fetcher = fetcher(&cache.path().join("store"), server.endpoints()?)?;
    fs::write(&local, b"local")?;
    let items = vec![
        jei(),
        Item::new("a/copy.jar", "curse").with_project(10, 20),
        Item::new("local.txt", "file").with_file(local.display().to_string()),
        Item::new("mods/optifine.jar", "optifine").with_file("OptiFine_1.16.5.jar"),
    ];

    let records = fetcher.collect_sums(&items)?;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, jei().identity());
    assert!(records[0].sums.contains(&sha256(JEI)));
    assert_eq!(records[1].id.method, "optifine");
    assert!(records[1].sums.contains(&sha256(OPTIFINE)));

    let json = serde_json::to_value(&records[0])?;
    assert_eq!(json["method"], "curse");
    assert_eq!(json["projectID"], 10);
    assert_eq!(json["fileID"], 20);
    assert_eq!(json["sums"].as_array().map(Vec::len), Some(4));
    Ok(())
}
