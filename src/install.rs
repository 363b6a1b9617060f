// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installation sequence.
//!
//! Procedural steps that turn a bare virtual machine into a configured
//! Nextcloud host: OS packages, the application release archive, the web
//! server site, and the PHP module configuration. Each step is run at most
//! once per unit, gated by the persisted milestones; none of them roll back
//! on failure. A failed step aborts the triggering event and the host
//! runtime redelivers it later.
//!
//! # Archive Verification
//!
//! The release archive is downloaded fully into memory and its sha256
//! digest checked against the operator-configured value before a single
//! byte is unpacked. An empty configured digest skips verification, which
//! lets operators point at snapshot builds that have no published digest.

use crate::{
    exec::{syscall_non_interactive, ExecError},
    path::Layout,
    render::{self, PhpModuleContext, RenderError},
};

use sha2::{Digest, Sha256};
use std::{fs, io::Cursor, path::Path};
use tracing::{info, instrument};

/// OS packages required to serve the application.
pub const PACKAGES: [&str; 15] = [
    "apache2",
    "libapache2-mod-php7.2",
    "php7.2-gd",
    "php7.2-json",
    "php7.2-mysql",
    "php7.2-pgsql",
    "php7.2-curl",
    "php7.2-mbstring",
    "php7.2-intl",
    "php-imagick",
    "php7.2-zip",
    "php7.2-xml",
    "php-apcu",
    "php-redis",
    "php-smbclient",
];

/// Web server modules the application depends on.
pub const APACHE_MODULES: [&str; 5] = ["rewrite", "headers", "env", "dir", "mime"];

/// Install the fixed OS package list.
///
/// # Errors
///
/// - Return [`InstallError::Exec`] if the package manager fails.
#[instrument(level = "debug")]
pub fn install_packages() -> Result<()> {
    info!("installing {} packages", PACKAGES.len());
    let args = ["install", "-y"].into_iter().chain(PACKAGES);
    syscall_non_interactive("apt", args)?;

    Ok(())
}

/// Fetch, verify, and unpack the application release archive.
///
/// Downloads the archive fully into memory, checks its digest, then unpacks
/// the bzip2 compressed tarball under the web root. The archive's own
/// top-level `nextcloud/` directory becomes the application root.
///
/// # Errors
///
/// - Return [`InstallError::Download`] if the fetch fails.
/// - Return [`InstallError::ChecksumMismatch`] if the digest differs from
///   the configured value.
/// - Return [`InstallError::Unpack`] if extraction fails.
#[instrument(skip(expected_sha256), level = "debug")]
pub fn fetch_archive(source: &str, expected_sha256: &str, web_root: &Path) -> Result<()> {
    info!("fetching application sources from {source}");
    let bytes = reqwest::blocking::get(source)?.error_for_status()?.bytes()?;

    verify_archive(&bytes, expected_sha256)?;
    unpack_archive(&bytes, web_root)?;
    info!("application sources unpacked under {:?}", web_root.display());

    Ok(())
}

/// Check downloaded bytes against the configured digest.
///
/// An empty expected digest skips verification.
///
/// # Errors
///
/// - Return [`InstallError::ChecksumMismatch`] on digest mismatch.
pub fn verify_archive(bytes: &[u8], expected_sha256: &str) -> Result<()> {
    if expected_sha256.is_empty() {
        info!("no archive digest configured, skipping verification");
        return Ok(());
    }

    let actual = sha256_hex(bytes);
    if actual != expected_sha256 {
        return Err(InstallError::ChecksumMismatch {
            expected: expected_sha256.into(),
            actual,
        });
    }

    Ok(())
}

/// Unpack a bzip2 compressed tarball under target directory.
///
/// # Errors
///
/// - Return [`InstallError::Unpack`] if decompression or extraction fails.
pub fn unpack_archive(bytes: &[u8], dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).map_err(InstallError::Unpack)?;
    let decoder = bzip2::read::BzDecoder::new(Cursor::new(bytes));
    tar::Archive::new(decoder)
        .unpack(dest)
        .map_err(InstallError::Unpack)?;

    Ok(())
}

/// Configure the web server site.
///
/// Renders the site definition, installs it under `sites-available`,
/// enables the required modules, and enables the site.
///
/// # Errors
///
/// - Return [`InstallError::Render`] if template rendering fails.
/// - Return [`InstallError::Io`] if the rendered file cannot be written.
/// - Return [`InstallError::Exec`] if module or site enabling fails.
#[instrument(skip(layout), level = "debug")]
pub fn configure_apache(layout: &Layout) -> Result<()> {
    let rendered = render::render_apache_site(&layout.app_root)?;
    write_rendered(&layout.apache_site, &rendered)?;

    for module in APACHE_MODULES {
        syscall_non_interactive("a2enmod", [module])?;
    }
    syscall_non_interactive("a2ensite", ["nextcloud"])?;

    Ok(())
}

/// Configure the PHP module.
///
/// Renders the tuning values into their own module file under
/// `mods-available` and enables it. A service restart is required after the
/// module set changes; the web server picks it up on the next reload.
///
/// # Errors
///
/// - Return [`InstallError::Render`] if template rendering fails.
/// - Return [`InstallError::Io`] if the rendered file cannot be written.
/// - Return [`InstallError::Exec`] if enabling the module fails.
#[instrument(skip(ctx, layout), level = "debug")]
pub fn configure_php(ctx: &PhpModuleContext, layout: &Layout) -> Result<()> {
    let rendered = render::render_php_module(ctx)?;
    write_rendered(&layout.php_module, &rendered)?;

    syscall_non_interactive("phpenmod", ["nextcloud"])?;

    Ok(())
}

fn write_rendered(target: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, contents)?;

    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Installation error types.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// External command failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Archive download failed.
    #[error(transparent)]
    Download(#[from] reqwest::Error),

    /// Downloaded archive does not match the configured digest.
    #[error("archive digest mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Archive decompression or extraction failed.
    #[error("failed to unpack archive: {0}")]
    Unpack(#[source] std::io::Error),

    /// Template rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Rendered file cannot be written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
type Result<T, E = InstallError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn bzip2_tarball(path: &str, contents: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, contents)?;
        let tarball = builder.into_inner()?;

        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(&tarball)?;
        Ok(encoder.finish()?)
    }

    #[test]
    fn verify_archive_accepts_matching_digest() -> anyhow::Result<()> {
        let bytes = b"release bytes";
        verify_archive(bytes, &sha256_hex(bytes))?;
        Ok(())
    }

    #[test]
    fn verify_archive_rejects_mismatched_digest() {
        let result = verify_archive(b"release bytes", "deadbeef");
        match result {
            Err(InstallError::ChecksumMismatch { expected, actual }) => {
                assert_eq!(expected, "deadbeef");
                assert_eq!(actual, sha256_hex(b"release bytes"));
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[test]
    fn verify_archive_skips_when_unconfigured() -> anyhow::Result<()> {
        verify_archive(b"anything at all", "")?;
        Ok(())
    }

    #[test]
    fn unpack_archive_extracts_under_dest() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let archive = bzip2_tarball("nextcloud/occ", b"#!/usr/bin/env php\n")?;

        unpack_archive(&archive, dir.path())?;

        let unpacked = fs::read(dir.path().join("nextcloud/occ"))?;
        assert_eq!(unpacked, b"#!/usr/bin/env php\n");

        Ok(())
    }

    #[test]
    fn package_list_covers_web_stack() {
        assert!(PACKAGES.contains(&"apache2"));
        assert!(PACKAGES.contains(&"php7.2-pgsql"));
        assert!(PACKAGES.contains(&"php-redis"));
    }
}
