// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Operator-supplied configuration layout.
//!
//! Specify the layout of the configuration payload the host runtime hands to
//! the charm. The payload arrives as a JSON document from the `config-get`
//! hook tool. File and tool I/O is left to the caller to figure out.
//!
//! Every field carries a default mirroring the charm's published
//! configuration defaults, so a partial payload from an older model still
//! deserializes cleanly.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Upstream release archive fetched when the operator does not override
/// `source`.
pub const DEFAULT_SOURCE: &str =
    "https://download.nextcloud.com/server/releases/nextcloud-18.0.3.tar.bz2";

/// Publisher digest of [`DEFAULT_SOURCE`], enforced before unpacking.
pub const DEFAULT_SOURCE_SHA256: &str =
    "7b67e709006230f90f95727f9fa92e8c73a9e93458b22103293120f9cb50fd72";

/// Operator-supplied charm settings.
///
/// Tuning values for the rendered PHP module configuration, credentials for
/// the application's admin account, the external hostname to serve under,
/// and the release archive to deploy.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CharmConfig {
    /// URL of the application release archive (bzip2 compressed tarball).
    pub source: String,

    /// Expected sha256 digest of the release archive. Empty disables
    /// verification.
    pub source_sha256: String,

    /// External hostname the application is served under. Falls back to the
    /// unit's own address when unset.
    pub fqdn: Option<String>,

    /// Name of the application admin account created at initialization.
    #[serde(rename = "admin-user")]
    pub admin_user: String,

    /// Password of the application admin account.
    #[serde(rename = "admin-password")]
    pub admin_password: String,

    /// Maximum number of files per upload request.
    pub php_max_file_uploads: u32,

    /// Maximum size of one uploaded file.
    pub php_upload_max_filesize: String,

    /// Maximum size of one POST body.
    pub php_post_max_size: String,

    /// PHP memory limit for the application.
    pub php_memory_limit: String,
}

impl Default for CharmConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.into(),
            source_sha256: DEFAULT_SOURCE_SHA256.into(),
            fqdn: None,
            admin_user: "admin".into(),
            admin_password: "mynextcloudpwd".into(),
            php_max_file_uploads: 50,
            php_upload_max_filesize: "512M".into(),
            php_post_max_size: "512M".into(),
            php_memory_limit: "512M".into(),
        }
    }
}

impl FromStr for CharmConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let config: CharmConfig = serde_json::from_str(data)?;
        Ok(config)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration payload.
    #[error(transparent)]
    Deserialize(#[from] serde_json::Error),
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserialize_charm_config() -> anyhow::Result<()> {
        let result: CharmConfig = indoc! {r#"
            {
                "source": "https://blah.org/nextcloud-19.0.0.tar.bz2",
                "source_sha256": "",
                "fqdn": "cloud.blah.org",
                "admin-user": "root",
                "admin-password": "hunter2",
                "php_max_file_uploads": 100,
                "php_upload_max_filesize": "1G",
                "php_post_max_size": "1G",
                "php_memory_limit": "1G"
            }
        "#}
        .parse()?;

        let expect = CharmConfig {
            source: "https://blah.org/nextcloud-19.0.0.tar.bz2".into(),
            source_sha256: String::new(),
            fqdn: Some("cloud.blah.org".into()),
            admin_user: "root".into(),
            admin_password: "hunter2".into(),
            php_max_file_uploads: 100,
            php_upload_max_filesize: "1G".into(),
            php_post_max_size: "1G".into(),
            php_memory_limit: "1G".into(),
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn partial_payload_fills_defaults() -> anyhow::Result<()> {
        let result: CharmConfig = r#"{"fqdn": "cloud.blah.org"}"#.parse()?;

        assert_eq!(result.fqdn.as_deref(), Some("cloud.blah.org"));
        assert_eq!(result.source, DEFAULT_SOURCE);
        assert_eq!(result.source_sha256, DEFAULT_SOURCE_SHA256);
        assert_eq!(result.admin_user, "admin");
        assert_eq!(result.php_max_file_uploads, 50);

        Ok(())
    }
}
