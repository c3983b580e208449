// src/store/file.rs
//! JSON key/value document on disk, e.g. `{"last_seen_pub_timestamp": "2026-02-18T12:00:00Z"}`.
//!
//! Readers take a shared `fs2` lock, writers an exclusive one on a sibling `.lock`
//! file. Writes go to a temp file that is fsynced and renamed over the document.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{decode_watermark, encode_watermark, WatermarkStore};
use crate::model::Watermark;

#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get_blocking(path: &Path, key: &str) -> Result<Watermark> {
        let lock = open_lock(path)?;
        fs2::FileExt::lock_shared(&lock).context("locking watermark file (shared)")?;
        let doc = read_document(path);
        fs2::FileExt::unlock(&lock).ok();
        decode_watermark(doc?.get(key))
            .with_context(|| format!("decoding watermark {key:?} in {}", path.display()))
    }

    fn set_blocking(path: &Path, key: &str, timestamp: DateTime<Utc>) -> Result<()> {
        let lock = open_lock(path)?;
        fs2::FileExt::lock_exclusive(&lock).context("locking watermark file (exclusive)")?;
        let res = Self::merge_and_write(path, key, timestamp);
        fs2::FileExt::unlock(&lock).ok();
        res
    }

    fn merge_and_write(path: &Path, key: &str, timestamp: DateTime<Utc>) -> Result<()> {
        let mut doc = read_document(path)?;
        let current = decode_watermark(doc.get(key))
            .with_context(|| format!("decoding watermark {key:?} in {}", path.display()))?;
        if current.present && current.timestamp >= timestamp {
            tracing::debug!(
                key,
                stored = %current.timestamp,
                requested = %timestamp,
                "stored watermark already at or past requested value"
            );
            return Ok(());
        }

        doc.insert(key.to_string(), encode_watermark(timestamp));
        let bytes = serde_json::to_vec_pretty(&Value::Object(doc))?;

        let tmp = path.with_extension("tmp");
        {
            let mut f = File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

fn open_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating state dir {}", parent.display()))?;
    }
    let lock_path = path.with_extension("lock");
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("opening {}", lock_path.display()))
}

/// Missing or blank file is an empty document; anything unparseable is an error.
fn read_document(path: &Path) -> Result<Map<String, Value>> {
    let content = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    if content.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&content)
        .with_context(|| format!("parsing {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("{} is not a JSON object", path.display()),
    }
}

#[async_trait::async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn get(&self, key: &str) -> Result<Watermark> {
        let path = self.path.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::get_blocking(&path, &key))
            .await
            .map_err(|e| anyhow!("watermark read task failed: {e}"))?
    }

    async fn set(&self, key: &str, timestamp: DateTime<Utc>) -> Result<()> {
        let path = self.path.clone();
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || Self::set_blocking(&path, &owned_key, timestamp))
            .await
            .map_err(|e| anyhow!("watermark write task failed: {e}"))??;
        tracing::info!(
            key,
            path = %self.path.display(),
            watermark = %timestamp,
            "watermark committed"
        );
        Ok(())
    }
}
