use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "tipset_terminal";
const CACHE_FILE: &str = "odds_cache.json";
// Entries older than this are dropped when the file is rewritten.
const MAX_ENTRY_AGE_SECS: u64 = 24 * 60 * 60;

static CACHE: Mutex<Option<HttpCacheFile>> = Mutex::new(None);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HttpCacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    fetched_at: u64,
}

/// GETs `url`, serving a stored body while it is younger than `ttl_secs`.
///
/// `cache_key` must not contain secrets; it is written to disk.
pub fn fetch_text_cached(
    client: &Client,
    url: &str,
    cache_key: &str,
    ttl_secs: u64,
) -> Result<String> {
    let now = system_time_to_secs(SystemTime::now()).unwrap_or_default();
    let cached_entry = {
        let mut guard = CACHE.lock().unwrap_or_else(|e| e.into_inner());
        let cache = guard.get_or_insert_with(load_cache_file);
        cache.entries.get(cache_key).cloned()
    };
    if let Some(entry) = cached_entry {
        if is_fresh(entry.fetched_at, now, ttl_secs) {
            return Ok(entry.body);
        }
    }

    // The URL carries the API key, keep it out of error messages.
    let resp = client
        .get(url)
        .send()
        .map_err(|e| e.without_url())
        .context("request failed")?;
    let status = resp.status();
    let body = resp
        .text()
        .map_err(|e| e.without_url())
        .context("failed reading body")?;
    if !status.is_success() {
        return Err(anyhow::anyhow!("http {}: {}", status, snippet(&body)));
    }

    store_entry(
        cache_key,
        CacheEntry {
            body: body.clone(),
            fetched_at: now,
        },
    );
    Ok(body)
}

pub fn is_fresh(fetched_at: u64, now: u64, ttl_secs: u64) -> bool {
    now.saturating_sub(fetched_at) < ttl_secs
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

fn snippet(body: &str) -> String {
    body.trim()
        .replace(['\n', '\r'], " ")
        .chars()
        .take(220)
        .collect()
}

fn store_entry(key: &str, entry: CacheEntry) {
    let mut guard = CACHE.lock().unwrap_or_else(|e| e.into_inner());
    let cache = guard.get_or_insert_with(load_cache_file);
    cache.version = CACHE_VERSION;
    let now = entry.fetched_at;
    cache
        .entries
        .retain(|_, e| now.saturating_sub(e.fetched_at) < MAX_ENTRY_AGE_SECS);
    cache.entries.insert(key.to_string(), entry);
    let _ = save_cache_file(cache);
}

fn load_cache_file() -> HttpCacheFile {
    let Some(path) = cache_path() else {
        return HttpCacheFile::default();
    };
    let Ok(raw) = fs::read_to_string(path) else {
        return HttpCacheFile::default();
    };
    let cache = serde_json::from_str::<HttpCacheFile>(&raw).unwrap_or_default();
    if cache.version != CACHE_VERSION {
        return HttpCacheFile::default();
    }
    cache
}

fn save_cache_file(cache: &HttpCacheFile) -> Result<()> {
    let Some(path) = cache_path() else {
        return Ok(());
    };
    let Some(dir) = path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(dir).ok();
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(cache).context("serialize odds cache")?;
    fs::write(&tmp, json).context("write odds cache")?;
    fs::rename(&tmp, &path).context("swap odds cache")?;
    Ok(())
}

fn cache_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(CACHE_FILE))
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}
