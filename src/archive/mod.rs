// src/archive/mod.rs

//! Signed-index archive client
//!
//! An archive is a distribution mirror serving `dists/<suite>/InRelease`
//! plus per-(component, arch) `Packages` indices. Opening an archive
//! downloads and verifies the signed index of every requested suite, checks
//! the label, architecture and components, then loads the package indices
//! whose digests the signature covers. After that, package lookup and fetch
//! never trust the mirror again: every payload is verified against the
//! signed digests.

pub mod client;
pub mod release;
pub mod signature;

use crate::cache::Cache;
use crate::compression::{decompress, CompressionFormat};
use crate::deb;
use crate::error::{Error, Result};
use crate::hash::sha256;
use client::{HttpTransport, Transport};
use release::{parse_packages, parse_release_file, PackageStanza};
use sequoia_openpgp::Cert;
use std::collections::HashMap;
use std::env;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info};

/// Options for opening an archive
#[derive(Default)]
pub struct Options {
    pub label: String,
    pub version: String,
    pub arch: String,
    /// Ordered suite list; security and updates pockets outrank the base
    pub suites: Vec<String>,
    /// Ordered component list; earlier components win ties
    pub components: Vec<String>,
    pub priority: i32,
    /// Pro entitlement name, when the archive needs credentials
    pub pro: Option<String>,
    pub cache_dir: PathBuf,
    pub pub_keys: Vec<Cert>,
}

/// Identity of one fetched package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub sha256: String,
}

/// Read access to one archive
///
/// Two shapes exist: the HTTP-backed [`UbuntuArchive`] and the in-memory
/// test archive the integration suite injects.
pub trait Archive {
    fn options(&self) -> &Options;
    fn exists(&self, name: &str) -> bool;
    fn info(&self, name: &str) -> Result<PackageInfo>;
    fn fetch(&self, name: &str) -> Result<(Box<dyn Read>, PackageInfo)>;
}

/// Labels accepted as originating from Ubuntu infrastructure
const UBUNTU_LABELS: &[&str] = &["Ubuntu", "UbuntuProFIPS"];

/// Environment variable carrying `user:password` for entitled archives
const AUTH_ENV: &str = "SCALPEL_ARCHIVE_AUTH";

/// Pro entitlement to mirror location
fn pro_base_url(pro: &str) -> Result<String> {
    let base = match pro {
        "fips" => "https://esm.ubuntu.com/fips/ubuntu/",
        "fips-updates" => "https://esm.ubuntu.com/fips-updates/ubuntu/",
        "esm-apps" => "https://esm.ubuntu.com/apps/ubuntu/",
        "esm-infra" => "https://esm.ubuntu.com/infra/ubuntu/",
        _ => {
            return Err(Error::Setup(format!(
                "invalid pro value: {pro:?}"
            )))
        }
    };
    Ok(base.to_string())
}

fn base_url(arch: &str, pro: Option<&str>) -> Result<String> {
    if let Some(pro) = pro {
        return pro_base_url(pro);
    }
    Ok(if matches!(arch, "amd64" | "i386") {
        "http://archive.ubuntu.com/ubuntu/".to_string()
    } else {
        "http://ports.ubuntu.com/ubuntu-ports/".to_string()
    })
}

/// Rank of a suite when the same package exists in several pockets
fn suite_rank(suite: &str) -> u32 {
    if suite.ends_with("-security") {
        3
    } else if suite.ends_with("-updates") {
        2
    } else {
        1
    }
}

struct Candidate {
    stanza: PackageStanza,
    suite_rank: u32,
    component_idx: usize,
}

/// HTTP-backed archive with verified indices loaded at open time
pub struct UbuntuArchive {
    options: Options,
    base_url: String,
    transport: Box<dyn Transport>,
    cache: Cache,
    packages: HashMap<String, Candidate>,
}

impl std::fmt::Debug for UbuntuArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UbuntuArchive")
            .field("base_url", &self.base_url)
            .field("packages", &self.packages.len())
            .finish()
    }
}

impl UbuntuArchive {
    /// Open an archive over real HTTP transport
    pub fn open(options: Options) -> Result<UbuntuArchive> {
        let mut transport = HttpTransport::new()?;
        if options.pro.is_some() {
            let auth = env::var(AUTH_ENV).map_err(|_| Error::CredentialsNotFound)?;
            let (user, password) = auth
                .split_once(':')
                .ok_or(Error::CredentialsNotFound)?;
            transport = transport.with_credentials(user.to_string(), password.to_string());
        }
        Self::open_with_transport(options, Box::new(transport))
    }

    /// Open an archive over an injected transport (used by tests)
    pub fn open_with_transport(
        options: Options,
        transport: Box<dyn Transport>,
    ) -> Result<UbuntuArchive> {
        if options.suites.is_empty() {
            return Err(Error::MissingOption("suites"));
        }
        if options.components.is_empty() {
            return Err(Error::MissingOption("components"));
        }
        let arch = if options.arch.is_empty() {
            deb::infer_arch()
        } else {
            options.arch.clone()
        };
        if !deb::valid_arch(&arch) {
            return Err(Error::InvalidArch(arch));
        }
        let mut options = options;
        options.arch = arch;

        let base_url = base_url(&options.arch, options.pro.as_deref())?;
        let cache = Cache::new(options.cache_dir.clone());
        let mut archive = UbuntuArchive {
            options,
            base_url,
            transport,
            cache,
            packages: HashMap::new(),
        };
        for suite_idx in 0..archive.options.suites.len() {
            archive.load_suite(suite_idx)?;
        }
        info!(
            "Opened archive {} with {} packages",
            archive.options.label,
            archive.packages.len()
        );
        Ok(archive)
    }

    fn load_suite(&mut self, suite_idx: usize) -> Result<()> {
        let suite = self.options.suites[suite_idx].clone();
        let url = format!("{}dists/{}/InRelease", self.base_url, suite);
        let data = self.transport.get(&url)?;
        let body = signature::verify_cleartext(&data, &self.options.pub_keys)?;
        let body = String::from_utf8(body)
            .map_err(|_| Error::Network(format!("invalid InRelease text for suite {suite}")))?;
        let release = parse_release_file(&body)?;

        if !UBUNTU_LABELS.contains(&release.label.as_str()) {
            debug!("Rejecting InRelease label {:?}", release.label);
            return Err(Error::NoUbuntuSection);
        }
        for component in &self.options.components {
            if !release.components.contains(component) {
                return Err(Error::MissingComponent(component.clone()));
            }
        }
        if !release.architectures.iter().any(|a| a == &self.options.arch) {
            return Err(Error::InvalidArch(self.options.arch.clone()));
        }

        let rank = suite_rank(&suite);
        let components = self.options.components.clone();
        for (component_idx, component) in components.iter().enumerate() {
            let dir = format!("{}/binary-{}", component, self.options.arch);
            let plain = format!("{dir}/Packages");
            let compressed = [format!("{dir}/Packages.gz"), format!("{dir}/Packages.xz")]
                .into_iter()
                .find(|path| release.sha256.contains_key(path))
                .ok_or_else(|| Error::IndexMissing(plain.clone()))?;
            let expected = release
                .sha256
                .get(&plain)
                .ok_or_else(|| Error::IndexMissing(plain.clone()))?
                .clone();

            let url = format!("{}dists/{}/{}", self.base_url, suite, compressed);
            let data = self.transport.get(&url)?;
            let format = CompressionFormat::from_extension(&compressed);
            let data = decompress(&data, format)
                .map_err(|e| Error::Network(format!("cannot read {url}: {e}")))?;
            let actual = sha256(&data);
            if actual != expected.sha256 {
                return Err(Error::DigestMismatch {
                    url,
                    expected: expected.sha256,
                    actual,
                });
            }
            let text = String::from_utf8_lossy(&data);
            for stanza in parse_packages(&text) {
                self.add_candidate(stanza, rank, component_idx);
            }
        }
        Ok(())
    }

    /// Keep the best candidate per package: highest suite rank first,
    /// earliest component on ties. Equal rank from a second suite never
    /// displaces the first sighting.
    fn add_candidate(&mut self, stanza: PackageStanza, suite_rank: u32, component_idx: usize) {
        let candidate = Candidate {
            suite_rank,
            component_idx,
            stanza,
        };
        let replace = match self.packages.get(&candidate.stanza.name) {
            Some(best) => {
                candidate.suite_rank > best.suite_rank
                    || (candidate.suite_rank == best.suite_rank
                        && candidate.component_idx < best.component_idx)
            }
            None => true,
        };
        if replace {
            self.packages
                .insert(candidate.stanza.name.clone(), candidate);
        }
    }

    fn candidate(&self, name: &str) -> Result<&Candidate> {
        self.packages
            .get(name)
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))
    }

    fn package_info(candidate: &Candidate) -> PackageInfo {
        PackageInfo {
            name: candidate.stanza.name.clone(),
            version: candidate.stanza.version.clone(),
            arch: candidate.stanza.arch.clone(),
            sha256: candidate.stanza.sha256.clone(),
        }
    }
}

impl Archive for UbuntuArchive {
    fn options(&self) -> &Options {
        &self.options
    }

    fn exists(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    fn info(&self, name: &str) -> Result<PackageInfo> {
        Ok(Self::package_info(self.candidate(name)?))
    }

    fn fetch(&self, name: &str) -> Result<(Box<dyn Read>, PackageInfo)> {
        let candidate = self.candidate(name)?;
        let info = Self::package_info(candidate);
        debug!("Fetching package {} {}...", info.name, info.version);

        if let Some(file) = self.cache.open(&info.sha256) {
            return Ok((Box::new(file), info));
        }

        let url = format!("{}{}", self.base_url, candidate.stanza.filename);
        let data = self.transport.get(&url)?;
        let actual = sha256(&data);
        if actual != info.sha256 {
            return Err(Error::DigestMismatch {
                url,
                expected: info.sha256,
                actual,
            });
        }
        self.cache.write(&actual, &data)?;
        Ok((Box::new(std::io::Cursor::new(data)), info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_rank_ordering() {
        assert!(suite_rank("jammy-security") > suite_rank("jammy-updates"));
        assert!(suite_rank("jammy-updates") > suite_rank("jammy"));
        assert_eq!(suite_rank("noble"), suite_rank("jammy"));
    }

    #[test]
    fn test_base_url_by_arch() {
        assert_eq!(
            base_url("amd64", None).unwrap(),
            "http://archive.ubuntu.com/ubuntu/"
        );
        assert_eq!(
            base_url("i386", None).unwrap(),
            "http://archive.ubuntu.com/ubuntu/"
        );
        assert_eq!(
            base_url("arm64", None).unwrap(),
            "http://ports.ubuntu.com/ubuntu-ports/"
        );
    }

    #[test]
    fn test_pro_base_url() {
        assert_eq!(
            base_url("amd64", Some("fips")).unwrap(),
            "https://esm.ubuntu.com/fips/ubuntu/"
        );
        assert!(base_url("amd64", Some("unknown")).is_err());
    }

    #[test]
    fn test_candidate_preference() {
        let mut archive = UbuntuArchive {
            options: Options::default(),
            base_url: String::new(),
            transport: Box::new(NullTransport),
            cache: Cache::new("/nonexistent"),
            packages: HashMap::new(),
        };
        let stanza = |version: &str| PackageStanza {
            name: "pkg".to_string(),
            version: version.to_string(),
            ..Default::default()
        };

        // Base suite, main component.
        archive.add_candidate(stanza("1.0"), 1, 0);
        // Same suite, later component must not displace it.
        archive.add_candidate(stanza("1.0u"), 1, 1);
        assert_eq!(archive.packages["pkg"].stanza.version, "1.0");

        // Updates pocket wins over base.
        archive.add_candidate(stanza("1.1"), 2, 0);
        assert_eq!(archive.packages["pkg"].stanza.version, "1.1");

        // Security pocket wins over updates, even from a later component.
        archive.add_candidate(stanza("1.2"), 3, 1);
        assert_eq!(archive.packages["pkg"].stanza.version, "1.2");

        // Equal rank keeps the first sighting.
        archive.add_candidate(stanza("1.3"), 3, 1);
        assert_eq!(archive.packages["pkg"].stanza.version, "1.2");
    }

    struct NullTransport;

    impl Transport for NullTransport {
        fn get(&self, _url: &str) -> Result<Vec<u8>> {
            Err(Error::Network("no transport".to_string()))
        }
    }
}
