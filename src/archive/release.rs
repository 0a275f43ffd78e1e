// src/archive/release.rs

//! Parsers for the signed release file and the package indices
//!
//! Both formats are Debian control syntax: `Field: value` lines grouped in
//! paragraphs. The release file has one paragraph with a multi-line
//! `SHA256:` section listing the digest and size of every index it covers;
//! a `Packages` index is a sequence of paragraphs, one per package.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Digest and size of an index file covered by the release signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDigest {
    pub sha256: String,
    pub size: u64,
}

/// The parsed body of an InRelease document
#[derive(Debug, Clone, Default)]
pub struct ReleaseFile {
    pub suite: String,
    pub label: String,
    pub version: String,
    pub architectures: Vec<String>,
    pub components: Vec<String>,
    /// Relative index path to its signed digest
    pub sha256: HashMap<String, IndexDigest>,
}

/// Parse the verified body of an InRelease document
pub fn parse_release_file(text: &str) -> Result<ReleaseFile> {
    let mut release = ReleaseFile::default();
    let mut in_sha256 = false;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with([' ', '\t']) {
            if !in_sha256 {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(digest), Some(size), Some(path)) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(Error::Network(format!(
                    "invalid SHA256 line in release file: {line:?}"
                )));
            };
            let size = size.parse::<u64>().map_err(|_| {
                Error::Network(format!("invalid SHA256 line in release file: {line:?}"))
            })?;
            release.sha256.insert(
                path.to_string(),
                IndexDigest {
                    sha256: digest.to_lowercase(),
                    size,
                },
            );
            continue;
        }
        in_sha256 = false;
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match field {
            "Suite" => release.suite = value.to_string(),
            "Label" => release.label = value.to_string(),
            "Version" => release.version = value.to_string(),
            "Architectures" => {
                release.architectures = value.split_whitespace().map(String::from).collect()
            }
            "Components" => {
                release.components = value.split_whitespace().map(String::from).collect()
            }
            "SHA256" => in_sha256 = true,
            _ => {}
        }
    }
    Ok(release)
}

/// One paragraph of a `Packages` index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageStanza {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub filename: String,
    pub sha256: String,
    pub size: u64,
}

/// Parse a decompressed `Packages` index into its stanzas
pub fn parse_packages(text: &str) -> Vec<PackageStanza> {
    let mut stanzas = Vec::new();
    let mut current = PackageStanza::default();
    for line in text.lines().chain(std::iter::once("")) {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !current.name.is_empty() {
                stanzas.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.starts_with([' ', '\t']) {
            // Continuation lines carry descriptions, nothing indexed here.
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match field {
            "Package" => current.name = value.to_string(),
            "Version" => current.version = value.to_string(),
            "Architecture" => current.arch = value.to_string(),
            "Filename" => current.filename = value.to_string(),
            "SHA256" => current.sha256 = value.to_lowercase(),
            "Size" => current.size = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    stanzas
}
