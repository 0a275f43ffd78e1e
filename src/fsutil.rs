// src/fsutil.rs

//! Filesystem materialization primitives
//!
//! Everything the slicer writes into the target tree goes through here:
//! regular files (hashed while streaming), directories with their upstream
//! modes, symlinks and hard links. [`Entry`] is the record handed to the
//! report for each created path.

use crate::hash::HashingReader;
use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// File type of a created path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    #[default]
    File,
    Dir,
    Symlink,
}

/// Record of one materialized path
///
/// Directory paths carry a trailing slash. For regular files created as hard
/// links, `link` holds the absolute path of the link target and the digest
/// fields are left for the report to resolve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    /// Permission bits with the sticky bit folded in as 0o1000
    pub mode: u32,
    pub sha256: String,
    pub size: u64,
    pub link: String,
}

/// Lexically clean an absolute path
///
/// Collapses repeated separators and `.` segments and resolves `..`
/// without touching the filesystem. The result always starts with `/`
/// and never ends with one, except for the root itself.
pub fn clean_abs(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Create a directory with the given mode
///
/// An existing directory is left in place; its mode is not rewritten, the
/// first creator wins. The mode may carry the sticky bit.
pub fn create_dir(path: &Path, mode: u32) -> io::Result<()> {
    match fs::create_dir(path) {
        Ok(()) => fs::set_permissions(path, fs::Permissions::from_mode(mode)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Create a regular file from a reader, returning its digest and size
pub fn create_file<R: Read>(path: &Path, mode: u32, reader: R) -> io::Result<(String, u64)> {
    let mut reader = HashingReader::new(reader);
    let mut file = fs::File::create(path)?;
    io::copy(&mut reader, &mut file)?;
    file.flush()?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(reader.finish())
}

/// Create a symbolic link, replacing a previous identical one
pub fn create_symlink(path: &Path, target: &str) -> io::Result<()> {
    match std::os::unix::fs::symlink(target, path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if fs::read_link(path).map(|t| t.to_str() == Some(target)).unwrap_or(false) {
                return Ok(());
            }
            fs::remove_file(path)?;
            std::os::unix::fs::symlink(target, path)
        }
        Err(e) => Err(e),
    }
}

/// Create a POSIX hard link to an already materialized file
pub fn create_hard_link(path: &Path, target: &Path) -> io::Result<()> {
    fs::hard_link(target, path)
}
