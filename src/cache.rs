// src/cache.rs

//! Content-addressed download cache
//!
//! Fetched package payloads are stored under their SHA-256 digest, so the
//! cache never holds a stale entry and concurrent runs can share it. Writes
//! go through a temporary file and an atomic rename.

use crate::error::Result;
use std::env;
use std::fs::{self, File};
use std::path::PathBuf;
use tracing::debug;

/// A digest-keyed file cache rooted at one directory
#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default cache location: `$XDG_CACHE_HOME/<name>` or `~/.cache/<name>`
    pub fn default_dir(name: &str) -> PathBuf {
        if let Ok(cache_home) = env::var("XDG_CACHE_HOME") {
            if !cache_home.is_empty() {
                return PathBuf::from(cache_home).join(name);
            }
        }
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".cache").join(name)
    }

    fn entry_path(&self, digest: &str) -> PathBuf {
        self.dir.join("sha256").join(digest)
    }

    /// Open a cached payload, when present
    pub fn open(&self, digest: &str) -> Option<File> {
        File::open(self.entry_path(digest)).ok()
    }

    /// Store a payload under its digest
    ///
    /// The temp-file + rename dance keeps concurrent writers from exposing
    /// torn contents; whoever renames last wins with identical bytes.
    pub fn write(&self, digest: &str, data: &[u8]) -> Result<PathBuf> {
        let parent = self.dir.join("sha256");
        fs::create_dir_all(&parent)?;
        let path = parent.join(digest);
        let temp = parent.join(format!(".{}.tmp-{}", digest, std::process::id()));
        fs::write(&temp, data)?;
        fs::rename(&temp, &path)?;
        debug!("Cached {} bytes as sha256/{}", data.len(), digest);
        Ok(path)
    }
}
