// src/setup/mod.rs

//! Release definitions and slice selection
//!
//! A release is a directory of YAML documents: `scalpel.yaml` declares the
//! archives and their public keys, and `slices/**/<package>.yaml` declares
//! the slices of each package. [`select`] computes the transitive closure of
//! a set of seed slices over their `essential` edges.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;
use walkdir::WalkDir;

/// Identifier of a slice: `<package>_<slice>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SliceKey {
    pub package: String,
    pub slice: String,
}

impl SliceKey {
    pub fn new(package: &str, slice: &str) -> Self {
        Self {
            package: package.to_string(),
            slice: slice.to_string(),
        }
    }

    /// Parse a `<package>_<slice>` reference
    pub fn parse(reference: &str) -> Result<SliceKey> {
        static EXP: OnceLock<Regex> = OnceLock::new();
        let exp = EXP.get_or_init(|| {
            Regex::new(r"^([a-z0-9][a-z0-9+.-]*)_([a-z](?:-?[a-z0-9])*)$").unwrap()
        });
        let caps = exp
            .captures(reference)
            .ok_or_else(|| Error::Setup(format!("invalid slice reference: {reference:?}")))?;
        Ok(SliceKey {
            package: caps[1].to_string(),
            slice: caps[2].to_string(),
        })
    }
}

impl fmt::Display for SliceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.package, self.slice)
    }
}

/// What a content path entry asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathKind {
    /// Extract the path exactly as found in the package
    #[default]
    Extract,
    /// Extract every package path matching the wildcard pattern
    Glob,
    /// Extract a different package path and materialize it here
    Copy,
    /// Create a file with literal content
    Text,
    /// Create a directory
    Dir,
    /// Create a symbolic link
    Symlink,
    /// Emit the manifest document under this directory
    GenerateManifest,
}

/// When a materialized path is removed again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathUntil {
    #[default]
    None,
    /// Removed from the output tree once the mutate phase has finished
    Mutate,
}

/// One entry of a slice's content map
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathInfo {
    pub kind: PathKind,
    /// Copy source, symlink target or literal text, depending on kind
    pub info: String,
    /// Mode override; 0 keeps the package (or default) mode
    pub mode: u32,
    /// Mutate scripts may overwrite this path
    pub mutable: bool,
    pub until: PathUntil,
    /// Restrict the entry to these architectures; empty means all
    pub arch: Vec<String>,
}

/// Mutate script attached to a slice
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceScripts {
    pub mutate: Option<String>,
}

/// A named subset of one package's content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slice {
    pub package: String,
    pub name: String,
    pub essential: Vec<SliceKey>,
    pub contents: BTreeMap<String, PathInfo>,
    pub scripts: SliceScripts,
}

impl Slice {
    pub fn key(&self) -> SliceKey {
        SliceKey::new(&self.package, &self.name)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.package, self.name)
    }
}

/// A package declared by the release, with its slices
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub name: String,
    /// Release-relative path of the defining YAML document
    pub path: String,
    /// Optional pin to a named archive
    pub archive: Option<String>,
    pub slices: BTreeMap<String, Slice>,
}

/// Public key declared by the release
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKey {
    pub id: String,
    pub armor: String,
}

/// Archive declared by the release
#[derive(Debug, Clone, Default)]
pub struct ReleaseArchive {
    pub name: String,
    pub version: String,
    pub suites: Vec<String>,
    pub components: Vec<String>,
    /// Higher priority archives supply packages first; negative priority
    /// archives are only used when a package pins them
    pub priority: i32,
    /// Pro entitlement name, when the archive needs credentials
    pub pro: Option<String>,
    pub pub_keys: Vec<PublicKey>,
}

/// A parsed release directory
#[derive(Debug, Clone, Default)]
pub struct Release {
    pub archives: BTreeMap<String, ReleaseArchive>,
    pub packages: BTreeMap<String, Package>,
}

/// The closed set of slices implied by the seed keys
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub release: Release,
    /// Closure in deterministic order: essentials precede their dependents
    pub slices: Vec<Slice>,
}

// ---------------------------------------------------------------------------
// YAML documents

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlRelease {
    format: String,
    #[serde(default)]
    archives: BTreeMap<String, YamlArchive>,
    #[serde(default, rename = "public-keys")]
    public_keys: BTreeMap<String, YamlPublicKey>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlArchive {
    version: String,
    #[serde(default)]
    suites: Vec<String>,
    #[serde(default)]
    components: Vec<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    pro: Option<String>,
    #[serde(default, rename = "public-keys")]
    public_keys: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlPublicKey {
    id: String,
    armor: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlPackage {
    package: String,
    #[serde(default)]
    archive: Option<String>,
    #[serde(default)]
    slices: BTreeMap<String, YamlSlice>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlSlice {
    #[serde(default)]
    essential: Vec<String>,
    #[serde(default)]
    contents: BTreeMap<String, Option<YamlPath>>,
    #[serde(default)]
    mutate: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct YamlPath {
    #[serde(default)]
    copy: Option<String>,
    #[serde(default)]
    make: Option<bool>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    symlink: Option<String>,
    #[serde(default, deserialize_with = "deserialize_mode")]
    mode: Option<u32>,
    #[serde(default)]
    mutable: Option<bool>,
    #[serde(default)]
    until: Option<String>,
    #[serde(default)]
    arch: Option<YamlArch>,
    #[serde(default)]
    generate: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum YamlArch {
    One(String),
    Many(Vec<String>),
}

impl YamlArch {
    fn into_vec(self) -> Vec<String> {
        match self {
            YamlArch::One(arch) => vec![arch],
            YamlArch::Many(arches) => arches,
        }
    }
}

/// Modes are written in octal notation (`0644`, `01777`). YAML resolves
/// those scalars as decimal integers, so the decimal rendering is re-read
/// as octal digits. Quoted string modes are accepted too.
fn deserialize_mode<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Str(String),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    let Some(raw) = raw else { return Ok(None) };
    let digits = match raw {
        Raw::Int(v) => v.to_string(),
        Raw::Str(s) => s.trim_start_matches("0o").to_string(),
    };
    let mode = u32::from_str_radix(&digits, 8)
        .map_err(|_| D::Error::custom(format!("invalid mode: {digits:?}")))?;
    if mode > 0o7777 {
        return Err(D::Error::custom(format!("invalid mode: 0{mode:o}")));
    }
    Ok(Some(mode))
}

// ---------------------------------------------------------------------------
// Release loading

const RELEASE_FILE: &str = "scalpel.yaml";

/// Read a release directory
pub fn read_release(dir: &Path) -> Result<Release> {
    debug!("Processing release directory {}...", dir.display());
    let release_path = dir.join(RELEASE_FILE);
    let data = fs::read_to_string(&release_path).map_err(|e| {
        Error::Setup(format!(
            "cannot read release definition {}: {e}",
            release_path.display()
        ))
    })?;
    let mut release = parse_release(&data)?;

    let slices_dir = dir.join("slices");
    if slices_dir.is_dir() {
        for entry in WalkDir::new(&slices_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Setup(format!("cannot walk release: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let rel = path.strip_prefix(dir).unwrap_or(path).to_string_lossy();
            let data = fs::read_to_string(path)
                .map_err(|e| Error::Setup(format!("cannot read slice definition {rel}: {e}")))?;
            let package = parse_package(&rel, &data)?;
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            if stem != package.name {
                return Err(Error::Setup(format!(
                    "package {:?} in {rel} does not match filename",
                    package.name
                )));
            }
            if release.packages.contains_key(&package.name) {
                return Err(Error::Setup(format!(
                    "package {:?} defined more than once",
                    package.name
                )));
            }
            release.packages.insert(package.name.clone(), package);
        }
    }

    check_path_conflicts(&release)?;
    Ok(release)
}

fn parse_release(data: &str) -> Result<Release> {
    let yaml: YamlRelease = serde_yaml::from_str(data)
        .map_err(|e| Error::Setup(format!("cannot parse release definition: {e}")))?;
    if yaml.format != "v1" {
        return Err(Error::Setup(format!(
            "unknown release format {:?}",
            yaml.format
        )));
    }
    if yaml.archives.is_empty() {
        return Err(Error::Setup("release defines no archives".to_string()));
    }

    let keys: HashMap<&String, PublicKey> = yaml
        .public_keys
        .iter()
        .map(|(name, key)| {
            (
                name,
                PublicKey {
                    id: key.id.clone(),
                    armor: key.armor.clone(),
                },
            )
        })
        .collect();

    let mut archives = BTreeMap::new();
    for (name, archive) in yaml.archives {
        let mut pub_keys = Vec::new();
        for key_name in &archive.public_keys {
            let key = keys.get(key_name).ok_or_else(|| {
                Error::Setup(format!(
                    "archive {name:?} refers to undefined public key {key_name:?}"
                ))
            })?;
            pub_keys.push(key.clone());
        }
        archives.insert(
            name.clone(),
            ReleaseArchive {
                name,
                version: archive.version,
                suites: archive.suites,
                components: archive.components,
                priority: archive.priority,
                pro: archive.pro,
                pub_keys,
            },
        );
    }

    Ok(Release {
        archives,
        packages: BTreeMap::new(),
    })
}

fn parse_package(rel_path: &str, data: &str) -> Result<Package> {
    let yaml: YamlPackage = serde_yaml::from_str(data)
        .map_err(|e| Error::Setup(format!("cannot parse slice definition {rel_path}: {e}")))?;

    let mut package = Package {
        name: yaml.package.clone(),
        path: rel_path.to_string(),
        archive: yaml.archive,
        slices: BTreeMap::new(),
    };

    for (slice_name, yaml_slice) in yaml.slices {
        let key = SliceKey::new(&yaml.package, &slice_name);
        let mut essential = Vec::new();
        for reference in &yaml_slice.essential {
            let essential_key = SliceKey::parse(reference)?;
            if essential.contains(&essential_key) {
                return Err(Error::Setup(format!(
                    "slice {key} defined with redundant essential slice: {essential_key}"
                )));
            }
            essential.push(essential_key);
        }

        let mut contents = BTreeMap::new();
        for (path, yaml_path) in yaml_slice.contents {
            let info = parse_path_info(&key, &path, yaml_path.unwrap_or_default())?;
            contents.insert(path, info);
        }

        package.slices.insert(
            slice_name.clone(),
            Slice {
                package: yaml.package.clone(),
                name: slice_name,
                essential,
                contents,
                scripts: SliceScripts {
                    mutate: yaml_slice.mutate,
                },
            },
        );
    }

    Ok(package)
}

fn parse_path_info(key: &SliceKey, path: &str, yaml: YamlPath) -> Result<PathInfo> {
    let invalid = |reason: &str| {
        Error::Setup(format!("slice {key} has invalid content {path:?}: {reason}"))
    };

    if !path.starts_with('/') {
        return Err(invalid("path must be absolute"));
    }

    let mut info = PathInfo {
        mode: yaml.mode.unwrap_or(0),
        mutable: yaml.mutable.unwrap_or(false),
        until: match yaml.until.as_deref() {
            None => PathUntil::None,
            Some("mutate") => PathUntil::Mutate,
            Some(other) => return Err(invalid(&format!("invalid until value: {other:?}"))),
        },
        arch: yaml.arch.map(YamlArch::into_vec).unwrap_or_default(),
        ..Default::default()
    };

    let shapes = [
        yaml.copy.is_some(),
        yaml.make.is_some(),
        yaml.text.is_some(),
        yaml.symlink.is_some(),
        yaml.generate.is_some(),
    ];
    if shapes.iter().filter(|&&s| s).count() > 1 {
        return Err(invalid("conflicting content types"));
    }

    if let Some(generate) = yaml.generate {
        if generate != "manifest" {
            return Err(invalid(&format!("invalid generate value: {generate:?}")));
        }
        if !path.ends_with("/**") || crate::pathmatch::is_glob(&path[..path.len() - 3]) {
            return Err(invalid("generate path must be a directory glob ending in /**"));
        }
        if info.mode != 0 || info.mutable || info.until != PathUntil::None {
            return Err(invalid("generate entries take no other attributes"));
        }
        info.kind = PathKind::GenerateManifest;
    } else if let Some(source) = yaml.copy {
        if !source.starts_with('/') {
            return Err(invalid("copy source must be absolute"));
        }
        info.kind = PathKind::Copy;
        info.info = source;
    } else if yaml.make.is_some() {
        if !path.ends_with('/') {
            return Err(invalid("directory path must end with /"));
        }
        info.kind = PathKind::Dir;
    } else if let Some(text) = yaml.text {
        info.kind = PathKind::Text;
        info.info = text;
    } else if let Some(target) = yaml.symlink {
        info.kind = PathKind::Symlink;
        info.info = target;
    } else if crate::pathmatch::is_glob(path) {
        if info.mode != 0 || info.mutable {
            return Err(invalid("wildcard entries take no mode or mutable attributes"));
        }
        info.kind = PathKind::Glob;
    } else {
        info.kind = PathKind::Extract;
    }

    Ok(info)
}

/// Reject literal paths declared inconsistently across slices
///
/// Two slices of the same package may declare the same path when the
/// declarations are identical; slices of different packages never share a
/// declared path.
fn check_path_conflicts(release: &Release) -> Result<()> {
    let mut seen: HashMap<&str, (&Slice, &PathInfo)> = HashMap::new();
    for package in release.packages.values() {
        for slice in package.slices.values() {
            for (path, info) in &slice.contents {
                if info.kind == PathKind::Glob || info.kind == PathKind::GenerateManifest {
                    continue;
                }
                let existing = seen.get(path.as_str()).copied();
                match existing {
                    None => {
                        seen.insert(path, (slice, info));
                    }
                    Some((other, other_info)) => {
                        if other.package != slice.package || other_info != info {
                            return Err(Error::Setup(format!(
                                "slices {other} and {slice} conflict on {path}"
                            )));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Selection

/// Compute the transitive closure of the seed keys over `essential` edges
///
/// Essentials are pushed before the slice that requires them, so extraction
/// and mutate order honors the declared prerequisites. Cycles terminate via
/// the visited set.
pub fn select(release: &Release, keys: &[SliceKey]) -> Result<Selection> {
    let mut selection = Selection {
        release: release.clone(),
        slices: Vec::new(),
    };
    let mut visited: HashSet<SliceKey> = HashSet::new();
    for key in keys {
        visit(release, key, &mut visited, &mut selection.slices)?;
    }
    Ok(selection)
}

fn visit(
    release: &Release,
    key: &SliceKey,
    visited: &mut HashSet<SliceKey>,
    out: &mut Vec<Slice>,
) -> Result<()> {
    if !visited.insert(key.clone()) {
        return Ok(());
    }
    let package = release
        .packages
        .get(&key.package)
        .ok_or_else(|| Error::Setup(format!("slices of package {:?} not found", key.package)))?;
    let slice = package
        .slices
        .get(&key.slice)
        .ok_or_else(|| Error::Setup(format!("slice {key} not found")))?;
    for essential in &slice.essential {
        visit(release, essential, visited, out)?;
    }
    out.push(slice.clone());
    Ok(())
}
