// src/error.rs

//! Crate-wide error type
//!
//! One enum covers every failure surfaced by the library. The user-visible
//! phrasings are part of the contract: the CLI prints them verbatim and the
//! test suite pins them.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure talking to an archive mirror
    #[error("cannot talk to archive: {0}")]
    Network(String),

    /// No supplied public key validates the InRelease signature
    #[error("cannot verify signature of the InRelease file")]
    Signature,

    /// Requested architecture is not served by the archive
    #[error("invalid package architecture: {0}")]
    InvalidArch(String),

    /// Requested component is not listed in the signed index
    #[error("archive has no component {0:?}")]
    MissingComponent(String),

    /// Mandatory archive option left empty
    #[error("archive options missing {0}")]
    MissingOption(&'static str),

    /// The InRelease label does not originate from Ubuntu infrastructure
    #[error("archive has no Ubuntu section")]
    NoUbuntuSection,

    /// Package absent from every index of the archive
    #[error("cannot find package {0:?} in archive")]
    PackageNotFound(String),

    /// No `Packages` index for a component is covered by the signed digests
    #[error("cannot find package index {0:?} in release file")]
    IndexMissing(String),

    /// Fetched bytes do not match the digest recorded in the signed index
    #[error("cannot fetch {url}: expected sha256 {expected}, got {actual}")]
    DigestMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    /// Pro archive configured but no credentials are available
    #[error("credentials not found for archive")]
    CredentialsNotFound,

    /// Release definition or selection problem, reported before any I/O
    #[error("{0}")]
    Setup(String),

    /// Package payload cannot be decoded
    #[error("cannot extract from package {package:?}: {message}")]
    Extract { package: String, message: String },

    /// Mutate script violated the sandbox contract
    #[error("slice {slice}: {message}")]
    Script { slice: String, message: String },

    #[error("cannot use relative path for report root: {0:?}")]
    RelativeReportRoot(String),

    #[error("cannot add path to report: {path} outside of root {root}")]
    AddOutsideRoot { path: String, root: String },

    #[error("path {path} reported twice with diverging {field}: {new} != {old}")]
    ReportConflict {
        path: String,
        field: &'static str,
        new: String,
        old: String,
    },

    #[error("cannot mutate path in report: {path} outside of root {root}")]
    MutateOutsideRoot { path: String, root: String },

    #[error("cannot mutate path in report: {0} not previously added")]
    MutateUnknownPath(String),

    #[error("cannot mutate path in report: {0} is a directory")]
    MutateDirectory(String),

    #[error("cannot create hard link {path}: no target {target} previously extracted")]
    HardLinkTarget { path: String, target: String },

    /// Manifest failed validation while being read back
    #[error("cannot read manifest: {0}")]
    ManifestRead(String),

    /// Structures handed to the manifest writer are inconsistent
    #[error("internal error: invalid manifest: {0}")]
    ManifestWrite(String),

    #[error("{0}")]
    Jsonwall(String),

    #[error("{0}")]
    Io(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Jsonwall(format!("invalid json record: {err}"))
    }
}
