// src/main.rs
//! Scalpel - CLI entry point

use clap::{Parser, Subcommand};
use regex::Regex;
use scalpel::cache::Cache;
use scalpel::{archive, setup, slicer, Error};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

// =============================================================================
// CLI Definitions
// =============================================================================

#[derive(Parser)]
#[command(name = "scalpel")]
#[command(version)]
#[command(about = "Cut minimal root filesystems out of package slices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cut a tree with the selected slices
    Cut {
        /// Release directory or <label>-<version> reference
        #[arg(long, value_name = "dir|ref")]
        release: Option<String>,

        /// Root for generated content
        #[arg(long, value_name = "dir")]
        root: PathBuf,

        /// Package architecture
        #[arg(long, value_name = "arch")]
        arch: Option<String>,

        /// Slices to install, as <package>_<slice>
        #[arg(value_name = "slice", required = true)]
        slices: Vec<String>,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Cut {
            release,
            root,
            arch,
            slices,
        } => cmd_cut(release.as_deref(), &root, arch.as_deref(), &slices),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn cmd_cut(
    release: Option<&str>,
    root: &PathBuf,
    arch: Option<&str>,
    slice_refs: &[String],
) -> scalpel::Result<()> {
    let mut keys = Vec::with_capacity(slice_refs.len());
    for reference in slice_refs {
        keys.push(setup::SliceKey::parse(reference)?);
    }

    let release_dir = resolve_release_dir(release)?;
    let release = setup::read_release(&release_dir)?;
    let selection = setup::select(&release, &keys)?;

    let cache_dir = Cache::default_dir("scalpel");
    let mut archives: HashMap<String, Box<dyn archive::Archive>> = HashMap::new();
    for info in release.archives.values() {
        let mut pub_keys = Vec::with_capacity(info.pub_keys.len());
        for key in &info.pub_keys {
            pub_keys.push(archive::signature::parse_pub_key(&key.armor)?);
        }
        let options = archive::Options {
            label: info.name.clone(),
            version: info.version.clone(),
            arch: arch.unwrap_or_default().to_string(),
            suites: info.suites.clone(),
            components: info.components.clone(),
            priority: info.priority,
            pro: info.pro.clone(),
            cache_dir: cache_dir.clone(),
            pub_keys,
        };
        match archive::UbuntuArchive::open(options) {
            Ok(open) => {
                archives.insert(info.name.clone(), Box::new(open));
            }
            Err(Error::CredentialsNotFound) => {
                warn!("Ignoring archive {:?} (credentials not found)...", info.name);
            }
            Err(err) => return Err(err),
        }
    }

    slicer::run(&slicer::RunOptions {
        selection: &selection,
        archives,
        target_dir: root.clone(),
    })?;
    Ok(())
}

/// Resolve the `--release` argument to a release directory
///
/// Anything containing a slash is a path. A bare `<label>-<version>`
/// reference resolves under the cache; the release content must have been
/// placed there beforehand. With no argument the running system's release
/// is inferred from /etc/lsb-release.
fn resolve_release_dir(release: Option<&str>) -> scalpel::Result<PathBuf> {
    let (label, version) = match release {
        Some(value) if value.contains('/') => return Ok(PathBuf::from(value)),
        Some(value) => parse_release_info(value)?,
        None => read_release_info()?,
    };
    let dir = Cache::default_dir("scalpel")
        .join("releases")
        .join(format!("{label}-{version}"));
    if !dir.is_dir() {
        return Err(Error::Setup(format!(
            "release {label}-{version} not found at {}, pass --release <dir>",
            dir.display()
        )));
    }
    Ok(dir)
}

fn parse_release_info(release: &str) -> scalpel::Result<(String, String)> {
    let exp = Regex::new(r"^([a-z](?:-?[a-z0-9]){2,})-([0-9]+(?:\.?[0-9])+)$")
        .expect("static regex must parse");
    let caps = exp
        .captures(release)
        .ok_or_else(|| Error::Setup(format!("invalid release reference: {release:?}")))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

fn read_release_info() -> scalpel::Result<(String, String)> {
    if let Ok(data) = fs::read_to_string("/etc/lsb-release") {
        let mut label = String::new();
        let mut version = String::new();
        for line in data.lines() {
            if let Some(value) = line.strip_prefix("DISTRIB_ID=") {
                label = value.to_lowercase();
            } else if let Some(value) = line.strip_prefix("DISTRIB_RELEASE=") {
                version = value.to_string();
            }
            if !label.is_empty() && !version.is_empty() {
                return Ok((label, version));
            }
        }
    }
    Err(Error::Setup(
        "cannot infer release via /etc/lsb-release, see the --release option".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_release_info() {
        assert_eq!(
            parse_release_info("ubuntu-22.04").unwrap(),
            ("ubuntu".to_string(), "22.04".to_string())
        );
        assert_eq!(
            parse_release_info("some-distro-1.2.3").unwrap(),
            ("some-distro".to_string(), "1.2.3".to_string())
        );

        // The dot is optional per digit, so a dot-less version parses.
        assert_eq!(
            parse_release_info("ubuntu-22").unwrap(),
            ("ubuntu".to_string(), "22".to_string())
        );

        assert!(parse_release_info("ubuntu").is_err());
        assert!(parse_release_info("ubuntu-2").is_err());
        assert!(parse_release_info("Ubuntu-22.04").is_err());
        assert!(parse_release_info("ab-1.0").is_err());
    }
}
