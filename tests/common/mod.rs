// tests/common/mod.rs

//! Shared helpers for the integration tests
//!
//! Builds throwaway packages, releases and signed archive fixtures, plus
//! the tree-dump helpers the scenario tests compare against.

#![allow(dead_code)]

use scalpel::archive::client::Transport;
use scalpel::archive::{Archive, Options, PackageInfo};
use scalpel::hash::sha256;
use scalpel::Result;
use sequoia_openpgp as openpgp;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Package building

pub enum TarEntry {
    Dir(&'static str, u32),
    File(&'static str, &'static [u8], u32),
    Symlink(&'static str, &'static str),
    HardLink(&'static str, &'static str),
}

/// Build a `.deb` from the given data tar entries
pub fn make_deb(entries: &[TarEntry]) -> Vec<u8> {
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
    let data_tar_gz = gzip(&tar_data);

    let mut control_tar = tar::Builder::new(Vec::new());
    control_tar.finish().unwrap();
    let control_tar_gz = gzip(&control_tar.into_inner().unwrap());

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

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// The standing test package most scenarios slice
pub fn test_package() -> Vec<u8> {
    make_deb(&[
        TarEntry::Dir("./", 0o755),
        TarEntry::Dir("./dir/", 0o755),
        TarEntry::File("./dir/file", b"data", 0o644),
        TarEntry::Dir("./dir/nested/", 0o755),
        TarEntry::File("./dir/nested/file", b"nested-data", 0o644),
        TarEntry::File("./dir/nested/other-file", b"nested-other", 0o644),
        TarEntry::File("./dir/other-file", b"other-data", 0o644),
        TarEntry::Dir("./parent/", 0o1777),
        TarEntry::Dir("./parent/permissions/", 0o764),
        TarEntry::Dir("./usr/", 0o755),
        TarEntry::Dir("./usr/share/", 0o755),
        TarEntry::Dir("./usr/share/doc/", 0o755),
        TarEntry::Dir("./usr/share/doc/test-package/", 0o755),
        TarEntry::File(
            "./usr/share/doc/test-package/copyright",
            b"test-package copyright",
            0o644,
        ),
    ])
}

/// Filesystem entries the copyright injection adds for [`test_package`]
pub fn copyright_entries() -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    entries.insert("/usr/".to_string(), "dir 0755".to_string());
    entries.insert("/usr/share/".to_string(), "dir 0755".to_string());
    entries.insert("/usr/share/doc/".to_string(), "dir 0755".to_string());
    entries.insert(
        "/usr/share/doc/test-package/".to_string(),
        "dir 0755".to_string(),
    );
    entries.insert(
        "/usr/share/doc/test-package/copyright".to_string(),
        format!("file 0644 {}", &sha256(b"test-package copyright")[..8]),
    );
    entries
}

// ---------------------------------------------------------------------------
// In-memory archive

/// Test double for [`Archive`] serving packages from memory
pub struct FakeArchive {
    pub options: Options,
    pub pkgs: HashMap<String, Vec<u8>>,
}

impl Archive for FakeArchive {
    fn options(&self) -> &Options {
        &self.options
    }

    fn exists(&self, name: &str) -> bool {
        self.pkgs.contains_key(name)
    }

    fn info(&self, name: &str) -> Result<PackageInfo> {
        let data = self
            .pkgs
            .get(name)
            .ok_or_else(|| scalpel::Error::PackageNotFound(name.to_string()))?;
        Ok(PackageInfo {
            name: name.to_string(),
            version: "1.0".to_string(),
            arch: self.options.arch.clone(),
            sha256: sha256(data),
        })
    }

    fn fetch(&self, name: &str) -> Result<(Box<dyn Read>, PackageInfo)> {
        let info = self.info(name)?;
        let data = self.pkgs[name].clone();
        Ok((Box::new(std::io::Cursor::new(data)), info))
    }
}

// ---------------------------------------------------------------------------
// Tree dumps

/// Dump a directory tree in the `"file 0644 <hash8>"` shape tests compare
pub fn tree_dump(root: &Path) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.unwrap();
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap()
            .to_string_lossy()
            .to_string();
        let metadata = fs::symlink_metadata(entry.path()).unwrap();
        let perm = metadata.permissions().mode() & 0o7777;
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(entry.path()).unwrap();
            result.insert(
                format!("/{rel}"),
                format!("symlink {}", target.to_string_lossy()),
            );
        } else if metadata.is_dir() {
            result.insert(format!("/{rel}/"), format!("dir 0{perm:o}"));
        } else {
            let content = fs::read(entry.path()).unwrap();
            let dump = if content.is_empty() {
                format!("file 0{perm:o} empty")
            } else {
                format!("file 0{perm:o} {}", &sha256(&content)[..8])
            };
            result.insert(format!("/{rel}"), dump);
        }
    }
    result
}

/// Dump a report in the tree-dump shape with the owning slices appended
pub fn report_dump(report: &scalpel::slicer::Report) -> BTreeMap<String, String> {
    use scalpel::fsutil::EntryKind;
    let mut result = BTreeMap::new();
    for entry in report.entries.values() {
        let dump = match entry.kind {
            EntryKind::Dir => format!("dir 0{:o}", entry.mode),
            EntryKind::Symlink => format!("symlink {}", entry.link),
            EntryKind::File => {
                if entry.size == 0 {
                    format!("file 0{:o} empty", entry.mode)
                } else {
                    format!("file 0{:o} {}", entry.mode, &entry.sha256[..8])
                }
            }
        };
        let slices: Vec<String> = entry.slices.iter().map(|s| s.to_string()).collect();
        result.insert(
            entry.path.clone(),
            format!("{dump} {{{}}}", slices.join(",")),
        );
    }
    result
}

// ---------------------------------------------------------------------------
// Signed archive fixtures

/// Generate a fresh signing key pair
pub fn gen_key() -> openpgp::Cert {
    use openpgp::cert::CertBuilder;
    let (cert, _revocation) = CertBuilder::new()
        .add_userid("Test Archive Signer")
        .add_signing_subkey()
        .generate()
        .unwrap();
    cert
}

/// Sign text with the OpenPGP cleartext signature framework
pub fn sign_cleartext(text: &[u8], cert: &openpgp::Cert) -> Vec<u8> {
    use openpgp::policy::StandardPolicy;
    use openpgp::serialize::stream::{Message, Signer};

    let policy = StandardPolicy::new();
    let keypair = cert
        .keys()
        .unencrypted_secret()
        .with_policy(&policy, None)
        .supported()
        .for_signing()
        .next()
        .unwrap()
        .key()
        .clone()
        .into_keypair()
        .unwrap();

    let mut sink = Vec::new();
    let message = Message::new(&mut sink);
    let mut signer = Signer::new(message, keypair).cleartext().build().unwrap();
    signer.write_all(text).unwrap();
    signer.finalize().unwrap();
    sink
}

/// One package listed by a [`ReleaseFixture`]
pub struct FixturePackage {
    pub name: String,
    pub version: String,
    pub component: String,
    pub data: Vec<u8>,
}

/// A rendered archive suite served through [`MapTransport`]
pub struct ReleaseFixture {
    pub suite: String,
    pub version: String,
    pub label: String,
    pub arch: String,
    pub components: Vec<String>,
    pub packages: Vec<FixturePackage>,
}

impl ReleaseFixture {
    /// Render InRelease, Packages.gz and pool files into the transport map
    pub fn render(&self, cert: &openpgp::Cert, responses: &mut HashMap<String, Vec<u8>>) {
        let mut sha256_lines = String::new();
        for component in &self.components {
            let mut index = String::new();
            for package in self.packages.iter().filter(|p| &p.component == component) {
                let filename = format!(
                    "pool/{}/{}_{}_{}.deb",
                    component, package.name, package.version, self.arch
                );
                index.push_str(&format!(
                    "Package: {}\nArchitecture: {}\nVersion: {}\nFilename: {}\nSize: {}\nSHA256: {}\n\n",
                    package.name,
                    self.arch,
                    package.version,
                    filename,
                    package.data.len(),
                    sha256(&package.data),
                ));
                responses.insert(filename, package.data.clone());
            }
            let compressed = gzip(index.as_bytes());
            let dir = format!("{}/binary-{}", component, self.arch);
            sha256_lines.push_str(&format!(
                " {} {} {}/Packages\n",
                sha256(index.as_bytes()),
                index.len(),
                dir
            ));
            sha256_lines.push_str(&format!(
                " {} {} {}/Packages.gz\n",
                sha256(&compressed),
                compressed.len(),
                dir
            ));
            responses.insert(
                format!("dists/{}/{}/Packages.gz", self.suite, dir),
                compressed,
            );
        }

        let body = format!(
            "Origin: Ubuntu\nLabel: {}\nSuite: {}\nVersion: {}\nArchitectures: {}\nComponents: {}\nSHA256:\n{}",
            self.label,
            self.suite,
            self.version,
            self.arch,
            self.components.join(" "),
            sha256_lines,
        );
        responses.insert(
            format!("dists/{}/InRelease", self.suite),
            sign_cleartext(body.as_bytes(), cert),
        );
    }
}

/// Transport serving a path-keyed response map
pub struct MapTransport {
    pub base: String,
    pub responses: HashMap<String, Vec<u8>>,
}

impl Transport for MapTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let path = url.strip_prefix(&self.base).unwrap_or(url);
        self.responses
            .get(path)
            .cloned()
            .ok_or_else(|| scalpel::Error::Network(format!("unexpected url {url}")))
    }
}
