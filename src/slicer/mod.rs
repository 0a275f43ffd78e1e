// src/slicer/mod.rs

//! The extraction pipeline
//!
//! Given a closed selection of slices, open archives and a target
//! directory, [`run`] assigns each package to an archive, fetches and
//! extracts the claimed content, synthesizes the declared files, runs the
//! mutate scripts, applies `until: mutate` cleanup and writes the manifest
//! wherever a slice asked for one. The returned [`Report`] records every
//! path the run created.

pub mod report;
pub mod scripts;

pub use report::{Report, ReportEntry};

use crate::archive::{Archive, PackageInfo};
use crate::deb;
use crate::error::{Error, Result};
use crate::fsutil::{self, Entry, EntryKind};
use crate::manifest;
use crate::pathmatch;
use crate::setup::{PathInfo, PathKind, PathUntil, Selection, Slice, SliceKey};
use scripts::RunScriptOptions;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Options for [`run`]
pub struct RunOptions<'a> {
    pub selection: &'a Selection,
    /// Open archives indexed by their release name
    pub archives: HashMap<String, Box<dyn Archive>>,
    pub target_dir: PathBuf,
}

struct Claim {
    slice: SliceKey,
}

/// Materialize the selection into the target directory
pub fn run(options: &RunOptions) -> Result<Report> {
    let target_dir = absolute(&options.target_dir)?;
    fs::create_dir_all(&target_dir)?;
    let root = format!("{}/", target_dir.to_string_lossy().trim_end_matches('/'));
    let mut report = Report::new(&root)?;

    let pkg_archives = select_pkg_archives(options)?;

    let mut packages: Vec<String> = Vec::new();
    for slice in &options.selection.slices {
        if !packages.contains(&slice.package) {
            packages.push(slice.package.clone());
        }
    }

    let mut package_info = Vec::new();
    for package in &packages {
        let archive = pkg_archives[package.as_str()];
        let info = extract_package(
            options.selection,
            package,
            archive,
            &target_dir,
            &mut report,
        )?;
        package_info.push(info);
    }

    run_mutate_scripts(options, &pkg_archives, &target_dir, &mut report)?;
    apply_until_mutate(options, &pkg_archives, &target_dir, &report)?;
    write_manifests(options, &package_info, &target_dir, &report)?;

    info!(
        "Created {} paths under {}",
        report.entries.len(),
        target_dir.display()
    );
    Ok(report)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Assign each selected package to an archive
///
/// A package pinning an archive by name must find it open and carrying the
/// package. Otherwise the highest-priority archive containing the package
/// wins; the release keeps archives in a name-ordered map, so a priority
/// tie goes to the alphabetically first archive. Negative-priority archives
/// only serve pinned packages.
fn select_pkg_archives<'a>(
    options: &'a RunOptions<'a>,
) -> Result<HashMap<&'a str, &'a dyn Archive>> {
    let release = &options.selection.release;
    let mut pkg_archives: HashMap<&str, &dyn Archive> = HashMap::new();
    for slice in &options.selection.slices {
        if pkg_archives.contains_key(slice.package.as_str()) {
            continue;
        }
        let package = release.packages.get(&slice.package).ok_or_else(|| {
            Error::Setup(format!("slices of package {:?} not found", slice.package))
        })?;

        if let Some(pin) = &package.archive {
            let archive = options
                .archives
                .get(pin)
                .ok_or_else(|| Error::Setup(format!("archive {pin:?} not defined")))?;
            if !archive.exists(&package.name) {
                return Err(Error::Setup(format!(
                    "slice package {:?} missing from archive",
                    package.name
                )));
            }
            pkg_archives.insert(&package.name, archive.as_ref());
            continue;
        }

        let mut chosen: Option<(&dyn Archive, i32)> = None;
        for release_archive in release.archives.values() {
            if release_archive.priority < 0 {
                continue;
            }
            let Some(archive) = options.archives.get(&release_archive.name) else {
                continue;
            };
            if !archive.exists(&package.name) {
                continue;
            }
            match chosen {
                Some((_, priority)) if priority >= release_archive.priority => {}
                _ => chosen = Some((archive.as_ref(), release_archive.priority)),
            }
        }
        let Some((archive, _)) = chosen else {
            return Err(Error::Setup(format!(
                "slice package {:?} missing from archive(s)",
                package.name
            )));
        };
        pkg_archives.insert(&package.name, archive);
    }
    Ok(pkg_archives)
}

/// Whether a content entry applies to the target architecture
fn arch_applies(info: &PathInfo, arch: &str) -> bool {
    info.arch.is_empty() || info.arch.iter().any(|a| a == arch)
}

/// Fetch one package and materialize everything its slices claim
fn extract_package(
    selection: &Selection,
    package: &str,
    archive: &dyn Archive,
    target_dir: &Path,
    report: &mut Report,
) -> Result<PackageInfo> {
    let arch = archive.options().arch.clone();

    let mut claims: Vec<Claim> = Vec::new();
    let mut extract: HashMap<String, Vec<deb::ExtractInfo>> = HashMap::new();
    let mut synthesized: Vec<(SliceKey, String, PathInfo)> = Vec::new();

    for slice in selection.slices.iter().filter(|s| s.package == package) {
        for (path, path_info) in &slice.contents {
            if !arch_applies(path_info, &arch) {
                continue;
            }
            let context = claims.len();
            match path_info.kind {
                PathKind::Extract | PathKind::Glob => {
                    claims.push(Claim { slice: slice.key() });
                    extract.entry(path.clone()).or_default().push(deb::ExtractInfo {
                        path: path.clone(),
                        mode: path_info.mode,
                        optional: false,
                        context: Some(context),
                    });
                }
                PathKind::Copy => {
                    claims.push(Claim { slice: slice.key() });
                    extract
                        .entry(path_info.info.clone())
                        .or_default()
                        .push(deb::ExtractInfo {
                            path: path.clone(),
                            mode: path_info.mode,
                            optional: false,
                            context: Some(context),
                        });
                }
                PathKind::Text | PathKind::Symlink | PathKind::Dir => {
                    // Ask the extractor for the parent directory so its
                    // package mode is preserved when the package has it.
                    if let Some(parent) = parent_dir(path) {
                        extract.entry(parent.clone()).or_default().push(deb::ExtractInfo {
                            path: parent,
                            mode: 0,
                            optional: true,
                            context: None,
                        });
                    }
                    synthesized.push((slice.key(), path.clone(), path_info.clone()));
                }
                PathKind::GenerateManifest => {}
            }
        }
    }

    let (reader, info) = archive.fetch(package)?;
    debug!(
        "Extracting package {} {} for {} slices...",
        info.name,
        info.version,
        claims.len()
    );

    let mut create = |context: Option<usize>, entry: &Entry| -> Result<()> {
        if let Some(id) = context {
            report.add(&claims[id].slice, entry)?;
        }
        Ok(())
    };
    let mut extract_options = deb::ExtractOptions {
        package: package.to_string(),
        target_dir: target_dir.to_path_buf(),
        extract,
        create: &mut create,
    };
    deb::extract(reader, &mut extract_options)?;
    drop(extract_options);

    for (slice, path, path_info) in &synthesized {
        synthesize(slice, path, path_info, target_dir, report)?;
    }

    Ok(info)
}

/// Parent directory of a rooted path, in directory form
fn parent_dir(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    let (parent, _) = trimmed.rsplit_once('/')?;
    if parent.is_empty() {
        return None;
    }
    Some(format!("{parent}/"))
}

fn abs_target(target_dir: &Path, rooted: &str) -> PathBuf {
    target_dir.join(rooted.trim_start_matches('/'))
}

/// Create missing ancestors with the default directory mode
fn ensure_parents(target_dir: &Path, rooted: &str) -> Result<()> {
    let trimmed = rooted.trim_end_matches('/');
    let parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return Ok(());
    }
    let mut current = target_dir.to_path_buf();
    for part in &parts[..parts.len() - 1] {
        current = current.join(part);
        if !current.is_dir() {
            fsutil::create_dir(&current, 0o755)?;
        }
    }
    Ok(())
}

/// Create one `text`, `symlink` or `make` content entry
fn synthesize(
    slice: &SliceKey,
    path: &str,
    info: &PathInfo,
    target_dir: &Path,
    report: &mut Report,
) -> Result<()> {
    ensure_parents(target_dir, path)?;
    let abs = abs_target(target_dir, path);
    let entry = match info.kind {
        PathKind::Text => {
            let mode = if info.mode != 0 { info.mode } else { 0o644 };
            let (sha256, size) = fsutil::create_file(&abs, mode, info.info.as_bytes())?;
            Entry {
                path: abs.to_string_lossy().to_string(),
                kind: EntryKind::File,
                mode,
                sha256,
                size,
                link: String::new(),
            }
        }
        PathKind::Symlink => {
            fsutil::create_symlink(&abs, &info.info)?;
            Entry {
                path: abs.to_string_lossy().to_string(),
                kind: EntryKind::Symlink,
                mode: 0o777,
                link: info.info.clone(),
                ..Default::default()
            }
        }
        PathKind::Dir => {
            let mode = if info.mode != 0 { info.mode } else { 0o755 };
            fsutil::create_dir(&abs, mode)?;
            Entry {
                path: format!("{}/", abs.to_string_lossy().trim_end_matches('/')),
                kind: EntryKind::Dir,
                mode,
                ..Default::default()
            }
        }
        _ => return Ok(()),
    };
    report.add(slice, &entry)
}

/// Run mutate scripts in selection order
fn run_mutate_scripts(
    options: &RunOptions,
    pkg_archives: &HashMap<&str, &dyn Archive>,
    target_dir: &Path,
    report: &mut Report,
) -> Result<()> {
    let selected: BTreeSet<String> = report.entries.keys().cloned().collect();
    for slice in &options.selection.slices {
        let Some(script) = &slice.scripts.mutate else {
            continue;
        };
        let arch = &pkg_archives[slice.package.as_str()].options().arch;
        let mutable: BTreeSet<String> = slice
            .contents
            .iter()
            .filter(|(_, info)| info.mutable && arch_applies(info, arch))
            .map(|(path, _)| fsutil::clean_abs(path))
            .collect();

        debug!("Running mutation script for slice {}...", slice);
        let writes = scripts::run_script(RunScriptOptions {
            slice: slice.to_string(),
            script,
            root: target_dir,
            selected: &selected,
            mutable,
        })?;
        for write in writes {
            report.mutate(&Entry {
                path: abs_target(target_dir, &write.path)
                    .to_string_lossy()
                    .to_string(),
                kind: EntryKind::File,
                sha256: write.sha256,
                size: write.size,
                ..Default::default()
            })?;
        }
    }
    Ok(())
}

/// Remove `until: mutate` content once the scripts have run
///
/// Files go unconditionally; directories only when empty. The report keeps
/// the removed paths, recording what the packages supplied.
fn apply_until_mutate(
    options: &RunOptions,
    pkg_archives: &HashMap<&str, &dyn Archive>,
    target_dir: &Path,
    report: &Report,
) -> Result<()> {
    for slice in &options.selection.slices {
        let arch = &pkg_archives[slice.package.as_str()].options().arch;
        for (path, info) in &slice.contents {
            if info.until != PathUntil::Mutate || !arch_applies(info, arch) {
                continue;
            }
            match info.kind {
                PathKind::Glob => {
                    let mut matched: Vec<&String> = report
                        .entries
                        .keys()
                        .filter(|p| pathmatch::match_path(path, p))
                        .collect();
                    // Deepest first, so files vacate their directories.
                    matched.sort_by(|a, b| b.cmp(a));
                    for rel in matched {
                        remove_path(target_dir, rel);
                    }
                }
                PathKind::Dir => remove_path(target_dir, path),
                PathKind::GenerateManifest => {}
                _ => remove_path(target_dir, path),
            }
        }
    }
    Ok(())
}

fn remove_path(target_dir: &Path, rooted: &str) {
    let abs = abs_target(target_dir, rooted);
    let removed = if rooted.ends_with('/') {
        // Only empty directories are removed.
        fs::remove_dir(&abs).is_ok()
    } else {
        fs::remove_file(&abs).is_ok()
    };
    if removed {
        debug!("Removed until-mutate path {}", rooted);
    }
}

/// Write `manifest.wall` for every directory a slice tagged with
/// `generate: manifest`
fn write_manifests(
    options: &RunOptions,
    package_info: &[PackageInfo],
    target_dir: &Path,
    report: &Report,
) -> Result<()> {
    let manifest_paths = manifest::locate_manifest_paths(&options.selection.slices);
    if manifest_paths.is_empty() {
        return Ok(());
    }
    let selection: Vec<SliceKey> = options.selection.slices.iter().map(Slice::key).collect();
    let write_options = manifest::WriteOptions {
        package_info,
        selection: &selection,
        report,
        manifest_paths: &manifest_paths,
    };
    for rel in manifest_paths.keys() {
        ensure_parents(target_dir, rel)?;
        let abs = abs_target(target_dir, rel);
        manifest::write_file(&write_options, &abs)?;
        info!("Generated manifest at {}", rel);
    }
    Ok(())
}
