// src/manifest/mod.rs

//! The `manifest.wall` document
//!
//! A zstd-compressed jsonwall carrying four record kinds: the installed
//! packages, the selected slices, one `content` record per (slice, path)
//! pair and one `path` record per materialized path. The writer validates
//! the structures it is handed; the reader validates the cross-references
//! between records before returning anything.

use crate::archive::PackageInfo;
use crate::error::{Error, Result};
use crate::fsutil::EntryKind;
use crate::jsonwall::{Db, DbWriter, DbWriterOptions};
use crate::setup::{PathKind, SliceKey};
use crate::slicer::{Report, ReportEntry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;

pub const FILENAME: &str = "manifest.wall";
pub const SCHEMA: &str = "1.0";
pub const MODE: u32 = 0o644;

fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub kind: String,
    pub name: String,
    pub version: String,
    pub sha256: String,
    pub arch: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub kind: String,
    pub path: String,
    pub mode: String,
    pub slices: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub final_sha256: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub inode: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub kind: String,
    pub slice: String,
    pub path: String,
}

/// A fully parsed and validated manifest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub paths: Vec<Path>,
    pub contents: Vec<Content>,
    pub packages: Vec<Package>,
    pub slices: Vec<Slice>,
}

/// Render permission bits the way the manifest stores them
pub fn format_mode(mode: u32) -> String {
    format!("0{mode:o}")
}

/// Map every `generate: manifest` declaration to its manifest path
///
/// Returns rooted relative manifest file paths mapped to the slices that
/// declared the generate entry for that directory.
pub fn locate_manifest_paths(
    slices: &[crate::setup::Slice],
) -> BTreeMap<String, Vec<SliceKey>> {
    let mut paths: BTreeMap<String, Vec<SliceKey>> = BTreeMap::new();
    for slice in slices {
        for (path, info) in &slice.contents {
            if info.kind == PathKind::GenerateManifest {
                let dir = path.trim_end_matches("**");
                let rel = format!("{}/{}", dir.trim_end_matches('/'), FILENAME);
                paths.entry(rel).or_default().push(slice.key());
            }
        }
    }
    paths
}

/// Options for [`write`]
pub struct WriteOptions<'a> {
    pub package_info: &'a [PackageInfo],
    pub selection: &'a [SliceKey],
    pub report: &'a Report,
    /// Manifest file paths and the slices declaring them
    pub manifest_paths: &'a BTreeMap<String, Vec<SliceKey>>,
}

/// Emit the manifest document, uncompressed
pub fn write<W: std::io::Write>(options: &WriteOptions, writer: &mut W) -> Result<()> {
    fast_validate(options)?;

    let mut db = DbWriter::new(DbWriterOptions {
        schema: SCHEMA.to_string(),
    });

    for info in options.package_info {
        db.add(&Package {
            kind: "package".to_string(),
            name: info.name.clone(),
            version: info.version.clone(),
            sha256: info.sha256.clone(),
            arch: info.arch.clone(),
        })?;
    }
    for key in options.selection {
        db.add(&Slice {
            kind: "slice".to_string(),
            name: key.to_string(),
        })?;
    }
    for entry in options.report.entries.values() {
        let mut slices = Vec::new();
        for slice in &entry.slices {
            db.add(&Content {
                kind: "content".to_string(),
                slice: slice.to_string(),
                path: entry.path.clone(),
            })?;
            slices.push(slice.to_string());
        }
        slices.sort();
        db.add(&Path {
            kind: "path".to_string(),
            path: entry.path.clone(),
            mode: format_mode(entry.mode),
            slices,
            sha256: entry.sha256.clone(),
            final_sha256: entry.final_sha256.clone(),
            size: entry.size,
            link: entry.link.clone(),
            inode: entry.inode,
        })?;
    }
    for (path, declaring) in options.manifest_paths {
        let mut slices = Vec::new();
        for slice in declaring {
            db.add(&Content {
                kind: "content".to_string(),
                slice: slice.to_string(),
                path: path.clone(),
            })?;
            slices.push(slice.to_string());
        }
        slices.sort();
        db.add(&Path {
            kind: "path".to_string(),
            path: path.clone(),
            mode: format_mode(MODE),
            slices,
            ..Default::default()
        })?;
    }

    db.write_to(writer)
}

/// Compress and install the manifest document at its final location
pub fn write_file(options: &WriteOptions, abs_path: &std::path::Path) -> Result<()> {
    let file = std::fs::File::create(abs_path)?;
    let mut encoder = zstd::Encoder::new(file, 0)?;
    write(options, &mut encoder)?;
    let mut file = encoder.finish()?;
    file.flush()?;
    std::fs::set_permissions(abs_path, std::fs::Permissions::from_mode(MODE))?;
    Ok(())
}

/// Read, decompress and validate a manifest from the output tree
pub fn read(root_dir: &std::path::Path, rel_path: &str) -> Result<Manifest> {
    let abs = root_dir.join(rel_path.trim_start_matches('/'));
    let file = std::fs::File::open(&abs)
        .map_err(|e| Error::ManifestRead(format!("cannot open {}: {e}", abs.display())))?;
    let decoder = zstd::Decoder::new(file)
        .map_err(|e| Error::ManifestRead(format!("cannot decompress manifest: {e}")))?;
    let db = Db::read(decoder).map_err(|e| Error::ManifestRead(e.to_string()))?;

    let manifest = Manifest {
        paths: db.iterate(&serde_json::json!({"kind": "path"}))?,
        contents: db.iterate(&serde_json::json!({"kind": "content"}))?,
        packages: db.iterate(&serde_json::json!({"kind": "package"}))?,
        slices: db.iterate(&serde_json::json!({"kind": "slice"}))?,
    };
    validate(&manifest).map_err(|e| Error::ManifestRead(format!("invalid manifest: {e}")))?;
    Ok(manifest)
}

/// Cross-check the four record kinds against each other
fn validate(manifest: &Manifest) -> std::result::Result<(), String> {
    let packages: HashSet<&str> = manifest.packages.iter().map(|p| p.name.as_str()).collect();
    let slices: HashSet<&str> = manifest.slices.iter().map(|s| s.name.as_str()).collect();
    let paths: HashSet<&str> = manifest.paths.iter().map(|p| p.path.as_str()).collect();

    for slice in &manifest.slices {
        let package = slice.name.split('_').next().unwrap_or("");
        if !packages.contains(package) {
            return Err(format!("package {package:?} not found in packages"));
        }
    }

    let mut path_slices: HashMap<&str, Vec<&str>> = HashMap::new();
    for content in &manifest.contents {
        if !slices.contains(content.slice.as_str()) {
            return Err(format!("slice {} not found in slices", content.slice));
        }
        if !paths.contains(content.path.as_str()) {
            return Err(format!("path {} not found in paths", content.path));
        }
        path_slices
            .entry(content.path.as_str())
            .or_default()
            .push(content.slice.as_str());
    }

    for path in &manifest.paths {
        let Some(mut referenced) = path_slices.remove(path.path.as_str()) else {
            return Err(format!("path {} not found in contents", path.path));
        };
        referenced.sort();
        referenced.dedup();
        let declared: Vec<&str> = path.slices.iter().map(String::as_str).collect();
        if referenced != declared {
            return Err(format!(
                "path {} and content have diverging slices: {:?} != {:?}",
                path.path, declared, referenced
            ));
        }
    }
    Ok(())
}

/// Validate the structures handed to the writer
///
/// These are internal structures that are correct unless there is a bug,
/// so only cheap assertions run here.
fn fast_validate(options: &WriteOptions) -> Result<()> {
    let fail = |message: String| Err(Error::ManifestWrite(message));

    let mut packages = HashSet::new();
    for package in options.package_info {
        if package.name.is_empty() {
            return fail("package name not set".to_string());
        }
        if package.version.is_empty() {
            return fail(format!("package {:?} missing version", package.name));
        }
        if package.sha256.is_empty() {
            return fail(format!("package {:?} missing sha256", package.name));
        }
        if package.arch.is_empty() {
            return fail(format!("package {:?} missing arch", package.name));
        }
        packages.insert(package.name.as_str());
    }

    let mut slices = HashSet::new();
    for key in options.selection {
        if !packages.contains(key.package.as_str()) {
            return fail(format!(
                "slice {key} refers to missing package {:?}",
                key.package
            ));
        }
        slices.insert(key.clone());
    }

    let mut groups: BTreeMap<u64, Vec<&ReportEntry>> = BTreeMap::new();
    for entry in options.report.entries.values() {
        if let Err(message) = validate_report_entry(entry) {
            return fail(format!("path {:?} has invalid options: {message}", entry.path));
        }
        for slice in &entry.slices {
            if !slices.contains(slice) {
                return fail(format!(
                    "path {:?} refers to missing slice {slice}",
                    entry.path
                ));
            }
        }
        if entry.inode != 0 {
            groups.entry(entry.inode).or_default().push(entry);
        }
    }

    // Hard-link group ids are dense from 1, have at least two members,
    // and members agree on every content field.
    for id in 1..=groups.len() as u64 {
        let Some(entries) = groups.get(&id) else {
            return fail(format!("cannot find hard link id {id}"));
        };
        if entries.len() == 1 {
            return fail(format!(
                "hard link group {id} has only one path: {}",
                entries[0].path
            ));
        }
        let first = entries[0];
        for entry in &entries[1..] {
            if entry.link != first.link
                || entry.mode != first.mode
                || entry.sha256 != first.sha256
                || entry.size != first.size
                || entry.final_sha256 != first.final_sha256
            {
                return fail(format!(
                    "hard linked paths {:?} and {:?} have diverging contents",
                    first.path, entry.path
                ));
            }
        }
    }
    Ok(())
}

fn validate_report_entry(entry: &ReportEntry) -> std::result::Result<(), String> {
    match entry.kind {
        EntryKind::File => {}
        EntryKind::Dir => {
            if !entry.link.is_empty() {
                return Err("link set for directory".to_string());
            }
            if !entry.sha256.is_empty() {
                return Err("sha256 set for directory".to_string());
            }
            if !entry.final_sha256.is_empty() {
                return Err("final_sha256 set for directory".to_string());
            }
            if entry.size != 0 {
                return Err("size set for directory".to_string());
            }
        }
        EntryKind::Symlink => {
            if entry.link.is_empty() {
                return Err("link not set for symlink".to_string());
            }
            if !entry.sha256.is_empty() {
                return Err("sha256 set for symlink".to_string());
            }
            if entry.size != 0 {
                return Err("size set for symlink".to_string());
            }
        }
    }
    if entry.slices.is_empty() {
        return Err("slices is empty".to_string());
    }
    Ok(())
}
