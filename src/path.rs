// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevant path information for the files the charm installs,
//! renders, or watches on the unit. The platform layout is fixed by the
//! distribution packaging; tests override individual entries to point into
//! a scratch directory.

use std::path::{Path, PathBuf};

/// Filesystem layout of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Root the release archive is unpacked under.
    pub web_root: PathBuf,

    /// Application installation directory.
    pub app_root: PathBuf,

    /// Application configuration file.
    pub config_php: PathBuf,

    /// Application data directory.
    pub data_dir: PathBuf,

    /// Rendered PHP module configuration target.
    pub php_module: PathBuf,

    /// Rendered web server site definition target.
    pub apache_site: PathBuf,

    /// Persisted unit state file.
    pub state_file: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            web_root: PathBuf::from("/var/www"),
            app_root: PathBuf::from("/var/www/nextcloud"),
            config_php: PathBuf::from("/var/www/nextcloud/config/config.php"),
            data_dir: PathBuf::from("/var/www/nextcloud/data"),
            php_module: PathBuf::from("/etc/php/7.2/mods-available/nextcloud.ini"),
            apache_site: PathBuf::from("/etc/apache2/sites-available/nextcloud.conf"),
            state_file: PathBuf::from("/var/lib/nextcloud-charm/state.toml"),
        }
    }
}

impl Layout {
    /// Marker file whose presence tells the application its data directory
    /// is real and writable.
    pub fn data_marker(&self) -> PathBuf {
        self.data_dir.join(".ocdata")
    }

    /// Layout with every entry placed under one root. Test scaffolding.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            web_root: root.join("www"),
            app_root: root.join("www/nextcloud"),
            config_php: root.join("www/nextcloud/config/config.php"),
            data_dir: root.join("www/nextcloud/data"),
            php_module: root.join("php/mods-available/nextcloud.ini"),
            apache_site: root.join("apache2/sites-available/nextcloud.conf"),
            state_file: root.join("lib/state.toml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn data_marker_lives_in_data_dir() {
        let layout = Layout::default();
        assert_eq!(
            layout.data_marker(),
            PathBuf::from("/var/www/nextcloud/data/.ocdata")
        );
    }

    #[test]
    fn rooted_layout_stays_under_root() {
        let layout = Layout::rooted_at("/tmp/scratch");
        assert!(layout.config_php.starts_with("/tmp/scratch"));
        assert!(layout.state_file.starts_with("/tmp/scratch"));
    }
}
