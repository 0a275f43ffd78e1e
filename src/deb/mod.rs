// src/deb/mod.rs

//! Package payload extraction
//!
//! A `.deb` is an `ar` container holding `debian-binary`, `control.tar.*`
//! and `data.tar.*`. Extraction opens the outer container, picks the
//! decompressor for the data member by suffix, and walks the tar once,
//! materializing every path the extract rules claim while preserving the
//! modes of parent directories found in the package.

use crate::compression::{create_decoder, CompressionFormat};
use crate::error::{Error, Result};
use crate::fsutil::{self, Entry, EntryKind};
use crate::pathmatch;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Architectures packages are built for
pub const VALID_ARCHES: &[&str] = &[
    "amd64", "arm64", "armhf", "i386", "ppc64el", "riscv64", "s390x",
];

pub fn valid_arch(arch: &str) -> bool {
    VALID_ARCHES.contains(&arch)
}

/// Map the running machine to its package architecture
pub fn infer_arch() -> String {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "i386",
        "aarch64" => "arm64",
        "arm" => "armhf",
        "powerpc64" => "ppc64el",
        "riscv64" => "riscv64",
        "s390x" => "s390x",
        other => other,
    }
    .to_string()
}

/// One materialization rule for a claimed source path
#[derive(Debug, Clone)]
pub struct ExtractInfo {
    /// Rooted target path; for wildcard rules this equals the pattern and
    /// the matched source path is materialized in place
    pub path: String,
    /// Mode override; 0 keeps the mode found in the package
    pub mode: u32,
    /// Optional rules do not fail the extraction when nothing matches
    pub optional: bool,
    /// Opaque rule tag handed back through the create callback
    pub context: Option<usize>,
}

/// Options for [`extract`]
pub struct ExtractOptions<'a> {
    pub package: String,
    pub target_dir: PathBuf,
    /// Source path (or wildcard pattern) to its materialization rules
    pub extract: HashMap<String, Vec<ExtractInfo>>,
    /// Called once per (rule, materialized entry); ancestor directories
    /// created implicitly do not reach the callback
    pub create: &'a mut dyn FnMut(Option<usize>, &Entry) -> Result<()>,
}

/// Extract the claimed slices of a package payload into the target tree
pub fn extract<R: Read>(deb: R, options: &mut ExtractOptions) -> Result<()> {
    debug!("Extracting files from package {:?}...", options.package);
    let data_tar = data_reader(&options.package, deb)?;
    let mut extractor = Extractor::new(options);
    extractor.walk(data_tar)?;
    extractor.finish()
}

fn bad_package(package: &str, message: impl Into<String>) -> Error {
    Error::Extract {
        package: package.to_string(),
        message: message.into(),
    }
}

/// Locate `data.tar.*` in the outer container and wrap it in a decoder
fn data_reader<R: Read>(package: &str, deb: R) -> Result<Vec<u8>> {
    let mut container = ar::Archive::new(deb);
    while let Some(entry) = container.next_entry() {
        let mut entry = entry.map_err(|e| bad_package(package, e.to_string()))?;
        let name = String::from_utf8_lossy(entry.header().identifier()).to_string();
        if !name.starts_with("data.tar") {
            continue;
        }
        let format = CompressionFormat::from_extension(&name);
        let mut decoder = create_decoder(&mut entry, format)
            .map_err(|e| bad_package(package, e.to_string()))?;
        let mut data = Vec::new();
        decoder
            .read_to_end(&mut data)
            .map_err(|e| bad_package(package, e.to_string()))?;
        return Ok(data);
    }
    Err(bad_package(package, "no data.tar member".to_string()))
}

/// Sanitize a tar member name into its rooted form
///
/// Source paths must begin with `./`; the prefix is stripped. Parent
/// references and empty paths are rejected.
fn sanitize_tar_path(package: &str, name: &str) -> Result<Option<String>> {
    if name == "./" {
        return Ok(None);
    }
    let Some(stripped) = name.strip_prefix("./") else {
        return Err(bad_package(package, format!("invalid tar path {name:?}")));
    };
    if stripped.is_empty() {
        return Ok(None);
    }
    if stripped.split('/').any(|part| part == "..") {
        return Err(bad_package(package, format!("invalid tar path {name:?}")));
    }
    Ok(Some(format!("/{stripped}")))
}

struct Extractor<'a, 'b> {
    options: &'a mut ExtractOptions<'b>,
    globs: Vec<String>,
    /// Modes of directories seen in the package, sticky bit included
    tar_dir_modes: HashMap<String, u32>,
    /// Rooted paths materialized so far, mapped to their on-disk location
    created: HashMap<String, PathBuf>,
    /// Non-optional literal rules that still await their tar entry
    pending: HashSet<String>,
}

impl<'a, 'b> Extractor<'a, 'b> {
    fn new(options: &'a mut ExtractOptions<'b>) -> Self {
        let mut globs = Vec::new();
        let mut pending = HashSet::new();
        for (source, rules) in &options.extract {
            if pathmatch::is_glob(source) {
                globs.push(source.clone());
            } else if rules.iter().any(|rule| !rule.optional) {
                pending.insert(source.clone());
            }
        }
        Self {
            options,
            globs,
            tar_dir_modes: HashMap::new(),
            created: HashMap::new(),
            pending,
        }
    }

    fn walk(&mut self, data: Vec<u8>) -> Result<()> {
        let copyright = format!("/usr/share/doc/{}/copyright", self.options.package);
        let mut archive = tar::Archive::new(&data[..]);
        let entries = archive
            .entries()
            .map_err(|e| bad_package(&self.options.package, e.to_string()))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| bad_package(&self.options.package, e.to_string()))?;
            let name = entry
                .path()
                .map_err(|e| bad_package(&self.options.package, e.to_string()))?
                .to_string_lossy()
                .to_string();
            let name = if entry.header().entry_type().is_dir() && !name.ends_with('/') {
                format!("{name}/")
            } else {
                name
            };
            // The tar crate strips "./" while iterating; put it back so the
            // sanitizer sees the on-wire form.
            let raw = if name.starts_with("./") || name.starts_with('/') {
                name
            } else {
                format!("./{name}")
            };
            let Some(rooted) = sanitize_tar_path(&self.options.package, &raw)? else {
                continue;
            };

            let header = entry.header();
            let mode = header
                .mode()
                .map_err(|e| bad_package(&self.options.package, e.to_string()))?
                & 0o7777;
            let entry_type = header.entry_type();

            if entry_type.is_dir() {
                self.stage_dir_mode(&rooted, mode)?;
            }

            let mut rules = self.matching_rules(&rooted);
            if rooted == copyright && !self.options.extract.contains_key(&copyright) {
                // Installed for provenance even when no slice asks for it.
                rules.push(ExtractInfo {
                    path: rooted.clone(),
                    mode: 0,
                    optional: true,
                    context: None,
                });
            }
            if rules.is_empty() {
                continue;
            }
            self.pending.remove(&rooted);

            match entry_type {
                tar::EntryType::Directory => self.create_targets(&rooted, &rules, mode, None, "")?,
                tar::EntryType::Regular => {
                    let mut content = Vec::with_capacity(header.size().unwrap_or(0) as usize);
                    entry
                        .read_to_end(&mut content)
                        .map_err(|e| bad_package(&self.options.package, e.to_string()))?;
                    self.create_targets(&rooted, &rules, mode, Some(&content), "")?;
                }
                tar::EntryType::Symlink => {
                    let target = entry
                        .link_name()
                        .map_err(|e| bad_package(&self.options.package, e.to_string()))?
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_default();
                    self.create_targets(&rooted, &rules, mode, None, &target)?;
                }
                tar::EntryType::Link => {
                    let target = entry
                        .link_name()
                        .map_err(|e| bad_package(&self.options.package, e.to_string()))?
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_default();
                    self.create_hard_links(&rooted, &rules, mode, &target)?;
                }
                other => {
                    warn!(
                        "Skipping unsupported tar entry type {:?} at {}",
                        other, rooted
                    );
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(path) = self.pending.iter().next() {
            return Err(bad_package(
                &self.options.package,
                format!("no content at {path}"),
            ));
        }
        Ok(())
    }

    /// Remember a package directory mode, fixing it up when the directory
    /// was already created with the default mode before its tar entry came.
    fn stage_dir_mode(&mut self, rooted: &str, mode: u32) -> Result<()> {
        self.tar_dir_modes.insert(rooted.to_string(), mode);
        if let Some(existing) = self.created.get(rooted) {
            std::fs::set_permissions(
                existing,
                std::os::unix::fs::PermissionsExt::from_mode(mode),
            )?;
        }
        Ok(())
    }

    fn matching_rules(&self, rooted: &str) -> Vec<ExtractInfo> {
        let mut rules = Vec::new();
        if let Some(found) = self.options.extract.get(rooted) {
            rules.extend(found.iter().cloned());
        }
        for glob in &self.globs {
            if pathmatch::match_path(glob, rooted) {
                if let Some(found) = self.options.extract.get(glob) {
                    rules.extend(found.iter().cloned());
                }
            }
        }
        rules
    }

    fn abs_target(&self, rooted: &str) -> PathBuf {
        self.options
            .target_dir
            .join(rooted.trim_start_matches('/'))
    }

    /// Create every missing ancestor of a rooted path, using the package
    /// mode when the directory appeared in the tar and 0755 otherwise.
    fn create_parents(&mut self, rooted: &str) -> Result<()> {
        let mut ancestor = String::new();
        let trimmed = rooted.trim_end_matches('/');
        let parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Ok(());
        }
        for part in &parts[..parts.len() - 1] {
            ancestor.push('/');
            ancestor.push_str(part);
            let dir_rooted = format!("{ancestor}/");
            if self.created.contains_key(&dir_rooted) {
                continue;
            }
            let mode = self.tar_dir_modes.get(&dir_rooted).copied().unwrap_or(0o755);
            let abs = self.abs_target(&dir_rooted);
            fsutil::create_dir(&abs, mode)?;
            self.created.insert(dir_rooted, abs);
        }
        Ok(())
    }

    fn create_targets(
        &mut self,
        rooted: &str,
        rules: &[ExtractInfo],
        tar_mode: u32,
        content: Option<&[u8]>,
        link: &str,
    ) -> Result<()> {
        let mut done: HashMap<String, Entry> = HashMap::new();
        for rule in rules {
            // Wildcard rules materialize the matched source in place.
            let target = if pathmatch::is_glob(&rule.path) {
                rooted.to_string()
            } else {
                rule.path.clone()
            };
            if let Some(entry) = done.get(&target) {
                let entry = entry.clone();
                (self.options.create)(rule.context, &entry)?;
                continue;
            }
            let mode = if rule.mode != 0 { rule.mode } else { tar_mode };
            self.create_parents(&target)?;
            let abs = self.abs_target(&target);
            let entry = match content {
                Some(content) => {
                    let (digest, size) = fsutil::create_file(&abs, mode, content)?;
                    Entry {
                        path: abs.to_string_lossy().to_string(),
                        kind: EntryKind::File,
                        mode,
                        sha256: digest,
                        size,
                        link: String::new(),
                    }
                }
                None if target.ends_with('/') => {
                    fsutil::create_dir(&abs, mode)?;
                    Entry {
                        path: format!("{}/", abs.to_string_lossy().trim_end_matches('/')),
                        kind: EntryKind::Dir,
                        mode,
                        ..Default::default()
                    }
                }
                None => {
                    fsutil::create_symlink(&abs, link)?;
                    Entry {
                        path: abs.to_string_lossy().to_string(),
                        kind: EntryKind::Symlink,
                        mode: 0o777,
                        link: link.to_string(),
                        ..Default::default()
                    }
                }
            };
            self.created.insert(target.clone(), abs);
            (self.options.create)(rule.context, &entry)?;
            done.insert(target, entry);
        }
        Ok(())
    }

    /// A hard link joins the group of its target, which must have been
    /// materialized by this package or a previous one.
    fn create_hard_links(
        &mut self,
        rooted: &str,
        rules: &[ExtractInfo],
        tar_mode: u32,
        link: &str,
    ) -> Result<()> {
        let link_rooted = if let Some(stripped) = link.strip_prefix("./") {
            format!("/{stripped}")
        } else if link.starts_with('/') {
            link.to_string()
        } else {
            format!("/{link}")
        };
        let link_abs = self
            .created
            .get(&link_rooted)
            .cloned()
            .unwrap_or_else(|| self.abs_target(&link_rooted));
        if !link_abs.exists() {
            return Err(Error::HardLinkTarget {
                path: rooted.to_string(),
                target: link_rooted,
            });
        }
        for rule in rules {
            let target = if pathmatch::is_glob(&rule.path) {
                rooted.to_string()
            } else {
                rule.path.clone()
            };
            self.create_parents(&target)?;
            let abs = self.abs_target(&target);
            fsutil::create_hard_link(&abs, &link_abs)?;
            self.created.insert(target, abs.clone());
            let entry = Entry {
                path: abs.to_string_lossy().to_string(),
                kind: EntryKind::File,
                mode: tar_mode,
                link: link_rooted.clone(),
                ..Default::default()
            };
            (self.options.create)(rule.context, &entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    enum TarEntry<'a> {
        Dir(&'a str, u32),
        File(&'a str, &'a [u8], u32),
        Symlink(&'a str, &'a str),
        HardLink(&'a str, &'a str),
    }

    fn make_deb(entries: &[TarEntry]) -> Vec<u8> {
        let mut tar = tar::Builder::new(Vec::new());
        for entry in entries {
            let mut header = tar::Header::new_gnu();
            match entry {
                TarEntry::Dir(path, mode) => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_path(path).unwrap();
                    header.set_mode(*mode);
                    header.set_size(0);
                    header.set_cksum();
                    tar.append(&header, std::io::empty()).unwrap();
                }
                TarEntry::File(path, content, mode) => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_path(path).unwrap();
                    header.set_mode(*mode);
                    header.set_size(content.len() as u64);
                    header.set_cksum();
                    tar.append(&header, &content[..]).unwrap();
                }
                TarEntry::Symlink(path, target) => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_path(path).unwrap();
                    header.set_link_name(target).unwrap();
                    header.set_mode(0o777);
                    header.set_size(0);
                    header.set_cksum();
                    tar.append(&header, std::io::empty()).unwrap();
                }
                TarEntry::HardLink(path, target) => {
                    header.set_entry_type(tar::EntryType::Link);
                    header.set_path(path).unwrap();
                    header.set_link_name(target).unwrap();
                    header.set_mode(0o644);
                    header.set_size(0);
                    header.set_cksum();
                    tar.append(&header, std::io::empty()).unwrap();
                }
            }
        }
        let tar_data = tar.into_inner().unwrap();

        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar_data).unwrap();
        let data_tar_gz = gz.finish().unwrap();

        let mut control_tar = tar::Builder::new(Vec::new());
        control_tar.finish().unwrap();
        let control = control_tar.into_inner().unwrap();
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&control).unwrap();
        let control_tar_gz = gz.finish().unwrap();

        let mut deb = ar::Builder::new(Vec::new());
        deb.append(
            &ar::Header::new(b"debian-binary".to_vec(), 4),
            &b"2.0\n"[..],
        )
        .unwrap();
        deb.append(
            &ar::Header::new(b"control.tar.gz".to_vec(), control_tar_gz.len() as u64),
            &control_tar_gz[..],
        )
        .unwrap();
        deb.append(
            &ar::Header::new(b"data.tar.gz".to_vec(), data_tar_gz.len() as u64),
            &data_tar_gz[..],
        )
        .unwrap();
        deb.into_inner().unwrap()
    }

    fn basic_deb() -> Vec<u8> {
        make_deb(&[
            TarEntry::Dir("./", 0o755),
            TarEntry::Dir("./parent/", 0o1777),
            TarEntry::Dir("./parent/permissions/", 0o764),
            TarEntry::Dir("./dir/", 0o755),
            TarEntry::File("./dir/file", b"data", 0o644),
            TarEntry::Dir("./dir/nested/", 0o755),
            TarEntry::File("./dir/nested/other-file", b"nested", 0o644),
            TarEntry::Symlink("./dir/link", "../dir/file"),
        ])
    }

    fn run_extract(
        deb: &[u8],
        extract: HashMap<String, Vec<ExtractInfo>>,
    ) -> (TempDir, Vec<(Option<usize>, Entry)>) {
        let tmp = TempDir::new().unwrap();
        let mut seen = Vec::new();
        let mut create = |context: Option<usize>, entry: &Entry| {
            seen.push((context, entry.clone()));
            Ok(())
        };
        let mut options = ExtractOptions {
            package: "test-package".to_string(),
            target_dir: tmp.path().to_path_buf(),
            extract,
            create: &mut create,
        };
        super::extract(deb, &mut options).unwrap();
        drop(options);
        (tmp, seen)
    }

    fn rule(path: &str, context: usize) -> ExtractInfo {
        ExtractInfo {
            path: path.to_string(),
            mode: 0,
            optional: false,
            context: Some(context),
        }
    }

    #[test]
    fn test_extract_literal_file() {
        let deb = basic_deb();
        let mut extract = HashMap::new();
        extract.insert("/dir/file".to_string(), vec![rule("/dir/file", 1)]);
        let (tmp, seen) = run_extract(&deb, extract);

        assert_eq!(fs::read(tmp.path().join("dir/file")).unwrap(), b"data");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Some(1));
        assert_eq!(seen[0].1.kind, EntryKind::File);
        assert_eq!(seen[0].1.mode, 0o644);
        assert_eq!(seen[0].1.size, 4);
    }

    #[test]
    fn test_extract_copy_rule() {
        let deb = basic_deb();
        let mut extract = HashMap::new();
        extract.insert(
            "/dir/file".to_string(),
            vec![rule("/dir/file", 1), rule("/dir/file-copy", 2)],
        );
        let (tmp, seen) = run_extract(&deb, extract);

        assert_eq!(fs::read(tmp.path().join("dir/file")).unwrap(), b"data");
        assert_eq!(fs::read(tmp.path().join("dir/file-copy")).unwrap(), b"data");
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_extract_glob() {
        let deb = basic_deb();
        let mut extract = HashMap::new();
        extract.insert("/dir/nested**".to_string(), vec![rule("/dir/nested**", 7)]);
        let (tmp, seen) = run_extract(&deb, extract);

        assert!(tmp.path().join("dir/nested").is_dir());
        assert_eq!(
            fs::read(tmp.path().join("dir/nested/other-file")).unwrap(),
            b"nested"
        );
        let paths: Vec<&str> = seen
            .iter()
            .map(|(_, e)| e.path.rsplit_once("/dir/").unwrap().1)
            .collect();
        assert_eq!(paths, vec!["nested/", "nested/other-file"]);
    }

    #[test]
    fn test_parent_modes_preserved() {
        let deb = basic_deb();
        let mut extract = HashMap::new();
        extract.insert(
            "/parent/permissions/".to_string(),
            vec![ExtractInfo {
                path: "/parent/permissions/".to_string(),
                mode: 0,
                optional: true,
                context: None,
            }],
        );
        let (tmp, _) = run_extract(&deb, extract);

        let parent = fs::metadata(tmp.path().join("parent")).unwrap();
        assert_eq!(parent.permissions().mode() & 0o7777, 0o1777);
        let nested = fs::metadata(tmp.path().join("parent/permissions")).unwrap();
        assert_eq!(nested.permissions().mode() & 0o7777, 0o764);
    }

    #[test]
    fn test_symlink_extraction() {
        let deb = basic_deb();
        let mut extract = HashMap::new();
        extract.insert("/dir/link".to_string(), vec![rule("/dir/link", 3)]);
        let (tmp, seen) = run_extract(&deb, extract);

        assert_eq!(
            fs::read_link(tmp.path().join("dir/link"))
                .unwrap()
                .to_str()
                .unwrap(),
            "../dir/file"
        );
        assert_eq!(seen[0].1.kind, EntryKind::Symlink);
        assert_eq!(seen[0].1.link, "../dir/file");
    }

    #[test]
    fn test_hard_link_groups() {
        use std::os::unix::fs::MetadataExt;
        let deb = make_deb(&[
            TarEntry::Dir("./", 0o755),
            TarEntry::Dir("./dir/", 0o755),
            TarEntry::File("./dir/file", b"data", 0o644),
            TarEntry::HardLink("./dir/hard-link", "./dir/file"),
        ]);
        let mut extract = HashMap::new();
        extract.insert("/dir/file".to_string(), vec![rule("/dir/file", 1)]);
        extract.insert("/dir/hard-link".to_string(), vec![rule("/dir/hard-link", 1)]);
        let (tmp, seen) = run_extract(&deb, extract);

        assert_eq!(
            fs::metadata(tmp.path().join("dir/file")).unwrap().ino(),
            fs::metadata(tmp.path().join("dir/hard-link")).unwrap().ino()
        );
        let link_entry = &seen.iter().find(|(_, e)| e.path.ends_with("hard-link")).unwrap().1;
        assert_eq!(link_entry.link, "/dir/file");
        assert_eq!(link_entry.kind, EntryKind::File);
    }

    #[test]
    fn test_hard_link_without_target_fails() {
        let deb = make_deb(&[
            TarEntry::Dir("./", 0o755),
            TarEntry::Dir("./dir/", 0o755),
            TarEntry::File("./dir/file", b"data", 0o644),
            TarEntry::HardLink("./dir/hard-link", "./dir/file"),
        ]);
        let tmp = TempDir::new().unwrap();
        let mut create = |_: Option<usize>, _: &Entry| Ok(());
        let mut extract = HashMap::new();
        extract.insert(
            "/dir/hard-link".to_string(),
            vec![rule("/dir/hard-link", 1)],
        );
        let mut options = ExtractOptions {
            package: "test-package".to_string(),
            target_dir: tmp.path().to_path_buf(),
            extract,
            create: &mut create,
        };
        let err = super::extract(&deb[..], &mut options).unwrap_err();
        assert!(err
            .to_string()
            .contains("no target /dir/file previously extracted"));
    }

    #[test]
    fn test_copyright_injected() {
        let deb = make_deb(&[
            TarEntry::Dir("./", 0o755),
            TarEntry::Dir("./usr/", 0o755),
            TarEntry::Dir("./usr/share/", 0o755),
            TarEntry::Dir("./usr/share/doc/", 0o755),
            TarEntry::Dir("./usr/share/doc/test-package/", 0o755),
            TarEntry::File(
                "./usr/share/doc/test-package/copyright",
                b"(c) nobody",
                0o644,
            ),
            TarEntry::Dir("./dir/", 0o755),
            TarEntry::File("./dir/file", b"data", 0o644),
        ]);
        let mut extract = HashMap::new();
        extract.insert("/dir/file".to_string(), vec![rule("/dir/file", 1)]);
        let (tmp, seen) = run_extract(&deb, extract);

        assert_eq!(
            fs::read(tmp.path().join("usr/share/doc/test-package/copyright")).unwrap(),
            b"(c) nobody"
        );
        // Copyright is installed without a rule context.
        let copyright = seen
            .iter()
            .find(|(_, e)| e.path.ends_with("copyright"))
            .unwrap();
        assert_eq!(copyright.0, None);
    }

    #[test]
    fn test_missing_content_fails() {
        let deb = basic_deb();
        let tmp = TempDir::new().unwrap();
        let mut create = |_: Option<usize>, _: &Entry| Ok(());
        let mut extract = HashMap::new();
        extract.insert("/no/such/file".to_string(), vec![rule("/no/such/file", 1)]);
        let mut options = ExtractOptions {
            package: "test-package".to_string(),
            target_dir: tmp.path().to_path_buf(),
            extract,
            create: &mut create,
        };
        let err = super::extract(&deb[..], &mut options).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"cannot extract from package "test-package": no content at /no/such/file"#
        );
    }

    #[test]
    fn test_optional_missing_content_is_fine() {
        let deb = basic_deb();
        let mut extract = HashMap::new();
        extract.insert(
            "/no/such/dir/".to_string(),
            vec![ExtractInfo {
                path: "/no/such/dir/".to_string(),
                mode: 0,
                optional: true,
                context: None,
            }],
        );
        extract.insert("/dir/file".to_string(), vec![rule("/dir/file", 1)]);
        let (_tmp, seen) = run_extract(&deb, extract);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_arch_helpers() {
        assert!(valid_arch("amd64"));
        assert!(valid_arch("riscv64"));
        assert!(!valid_arch("foo"));
        assert!(!valid_arch(""));
        assert!(valid_arch(&infer_arch()));
    }
}
