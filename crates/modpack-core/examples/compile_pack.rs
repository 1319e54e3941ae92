use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use modpack_core::{FetchConfig, Fetcher, Item, OutputMode, PackBuilder, PackMetadata};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use zip::ZipWriter;
use zip::write::FileOptions;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    ensure_env_defaults();

    let cfg = FetchConfig::from_env()?;
    let mode: OutputMode = env::var("MODPACK_MODE")
        .ok()
        .map(|raw| raw.parse())
        .transpose()?
        .unwrap_or_default();
    let output = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("demo-pack.zip"));

    let inputs = TempDir::new()?;
    let items = example_items(inputs.path())?;
    let fetcher = Fetcher::from_config(&cfg)?;

    let file = File::create(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut builder = PackBuilder::with_hook(&fetcher, BufWriter::new(file), mode.hook(example_meta()));
    builder.add_all(&items, cfg.jobs)?;
    builder.close()?.flush()?;

    println!("built {mode} pack with {} items at {}", items.len(), output.display());
    for record in fetcher.collect_sums(&items)? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

fn ensure_env_defaults() {
    if env::var("MODPACK_CACHE_DIR").is_err() {
        unsafe {
            env::set_var("MODPACK_CACHE_DIR", "./.modpack-cache");
        }
    }
}

/// Local-only items so the demo runs without network access.
fn example_items(dir: &Path) -> Result<Vec<Item>> {
    let options = dir.join("options.txt");
    fs::write(&options, "renderDistance:12\nfov:0.25\n")?;

    let world = dir.join("world.zip");
    let mut writer = ZipWriter::new(File::create(&world)?);
    writer.start_file("level.dat", FileOptions::default())?;
    writer.write_all(b"demo level")?;
    writer.add_directory("region/", FileOptions::default())?;
    writer.start_file("region/r.0.0.mca", FileOptions::default())?;
    writer.write_all(b"demo region")?;
    writer.finish()?;

    Ok(vec![
        Item::new("options.txt", "file").with_file(options.display().to_string()),
        Item::new("saves/demo", "file")
            .with_file(world.display().to_string())
            .with_action("unzip"),
    ])
}

fn example_meta() -> PackMetadata {
    PackMetadata {
        name: "Demo Pack".into(),
        version: "0.1.0".into(),
        author: "modpacker".into(),
        description: "Minimal pack built from local files".into(),
        project_id: 0,
        game_version: "1.16.5".into(),
        mod_loaders: vec!["forge-36.2.0".into()],
    }
}
