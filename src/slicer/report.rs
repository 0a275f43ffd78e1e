// src/slicer/report.rs

//! Path registry for one slicer run
//!
//! Every path the slicer materializes is recorded here, keyed by its path
//! relative to the target root. A second sighting of a path must agree on
//! every field, hard links join dense 1-based inode groups, and the mutate
//! phase records the final digest of files a script rewrote.

use crate::error::{Error, Result};
use crate::fsutil::{Entry, EntryKind};
use crate::setup::SliceKey;
use std::collections::{BTreeMap, BTreeSet};

/// One materialized path
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportEntry {
    /// Rooted path relative to the report root; directories end with `/`
    pub path: String,
    pub kind: EntryKind,
    /// Permission bits with the sticky bit folded in as 0o1000
    pub mode: u32,
    pub sha256: String,
    /// Digest after the mutate phase, set only when the bytes changed
    pub final_sha256: String,
    pub size: u64,
    /// Symlink target
    pub link: String,
    /// Slices that caused this path to exist
    pub slices: BTreeSet<SliceKey>,
    /// Hard-link group, 1-based; 0 means not hard linked
    pub inode: u64,
}

/// The record of everything one slicer run created
#[derive(Debug, Clone, Default)]
pub struct Report {
    /// Absolute root in directory form (trailing slash)
    pub root: String,
    /// Entries keyed by rooted relative path
    pub entries: BTreeMap<String, ReportEntry>,
    last_inode: u64,
}

impl Report {
    /// Create an empty report rooted at an absolute path
    pub fn new(root: &str) -> Result<Report> {
        if !root.starts_with('/') {
            return Err(Error::RelativeReportRoot(root.to_string()));
        }
        let root = if root.ends_with('/') {
            root.to_string()
        } else {
            format!("{root}/")
        };
        Ok(Report {
            root,
            entries: BTreeMap::new(),
            last_inode: 0,
        })
    }

    fn rel_path(&self, path: &str) -> Option<String> {
        if self.root == "/" {
            return path.starts_with('/').then(|| path.to_string());
        }
        path.strip_prefix(&self.root)
            .map(|stripped| format!("/{stripped}"))
    }

    /// Record a path on behalf of one slice
    pub fn add(&mut self, slice: &SliceKey, entry: &Entry) -> Result<()> {
        let Some(rel) = self.rel_path(&entry.path) else {
            return Err(Error::AddOutsideRoot {
                path: entry.path.clone(),
                root: self.root.clone(),
            });
        };

        // A regular file carrying a link is a hard link: it joins the
        // group of its target and inherits the target's content fields.
        let mut entry_sha256 = entry.sha256.clone();
        let mut entry_size = entry.size;
        let mut entry_link = entry.link.clone();
        let mut inode = 0;
        if entry.kind == EntryKind::File && !entry.link.is_empty() {
            let Some(link_rel) = self.rel_path(&entry.link) else {
                return Err(Error::AddOutsideRoot {
                    path: entry.link.clone(),
                    root: self.root.clone(),
                });
            };
            let next_inode = self.last_inode + 1;
            {
                let Some(target) = self.entries.get_mut(&link_rel) else {
                    return Err(Error::HardLinkTarget {
                        path: rel,
                        target: link_rel,
                    });
                };
                if target.inode == 0 {
                    target.inode = next_inode;
                }
                entry_sha256 = target.sha256.clone();
                entry_size = target.size;
                entry_link = String::new();
                inode = target.inode;
            }
            if inode == next_inode {
                self.last_inode = next_inode;
            }
        }

        if let Some(existing) = self.entries.get_mut(&rel) {
            let conflict = |field: &'static str, new: String, old: String| {
                Err(Error::ReportConflict {
                    path: rel.clone(),
                    field,
                    new,
                    old,
                })
            };
            if existing.kind != entry.kind || existing.mode != entry.mode {
                return conflict(
                    "mode",
                    format!("{:04o}", entry.mode),
                    format!("{:04o}", existing.mode),
                );
            }
            if existing.link != entry_link {
                return conflict(
                    "link",
                    format!("{entry_link:?}"),
                    format!("{:?}", existing.link),
                );
            }
            if existing.size != entry_size {
                return conflict("size", entry_size.to_string(), existing.size.to_string());
            }
            if existing.sha256 != entry_sha256 {
                return conflict(
                    "hash",
                    format!("{entry_sha256:?}"),
                    format!("{:?}", existing.sha256),
                );
            }
            existing.slices.insert(slice.clone());
        } else {
            let mut slices = BTreeSet::new();
            slices.insert(slice.clone());
            self.entries.insert(
                rel.clone(),
                ReportEntry {
                    path: rel,
                    kind: entry.kind,
                    mode: entry.mode,
                    sha256: entry_sha256,
                    final_sha256: String::new(),
                    size: entry_size,
                    link: entry_link,
                    slices,
                    inode,
                },
            );
        }
        Ok(())
    }

    /// Record the post-mutate content of a previously added file
    ///
    /// `final_sha256` is set when and only when the digest differs from the
    /// one recorded at extraction time.
    pub fn mutate(&mut self, entry: &Entry) -> Result<()> {
        let Some(rel) = self.rel_path(&entry.path) else {
            return Err(Error::MutateOutsideRoot {
                path: entry.path.clone(),
                root: self.root.clone(),
            });
        };
        let Some(existing) = self.entries.get_mut(&rel) else {
            return Err(Error::MutateUnknownPath(rel));
        };
        if existing.kind == EntryKind::Dir {
            return Err(Error::MutateDirectory(rel));
        }
        if entry.sha256 != existing.sha256 {
            existing.final_sha256 = entry.sha256.clone();
            existing.size = entry.size;
        }
        Ok(())
    }
}
