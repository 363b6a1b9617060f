// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Administration CLI wrapper.
//!
//! Nextcloud ships its own command-line administration tool (`occ`) for
//! schema initialization, status reporting, and maintenance chores. The
//! charm never touches the application's database or configuration file
//! structure directly; every such change goes through `occ` so the
//! application rewrites the affected configuration key itself.
//!
//! All invocations run as the web user from the application root, since
//! `occ` refuses to run as root and resolves its own paths relative to the
//! installation.
//!
//! # Trusted Domains
//!
//! The trusted-domain list in the application configuration is maintained
//! through `config:system:set trusted_domains <index> --value=<domain>`.
//! Indices can end up with holes after removals, so every rewrite deletes
//! the whole list first and re-adds the surviving entries with indices in
//! order starting from 0.

use crate::exec::{syscall_captured, ExecError};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Handle on the installed application's administration CLI.
#[derive(Debug, Clone)]
pub struct Occ {
    app_root: PathBuf,
    web_user: String,
}

/// Parameters for one-time application initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallContext {
    pub db_kind: String,
    pub db_name: String,
    pub db_host: String,
    pub db_user: String,
    pub db_password: String,
    pub admin_user: String,
    pub admin_password: String,
    pub data_dir: String,
}

/// Application status as reported by `occ status --output=json`.
#[derive(Debug, Default, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OccStatus {
    pub installed: bool,
    pub version: String,
    pub versionstring: String,
    pub edition: String,
}

impl Occ {
    /// Construct CLI handle rooted at the application installation.
    pub fn new(app_root: impl Into<PathBuf>, web_user: impl Into<String>) -> Self {
        Self {
            app_root: app_root.into(),
            web_user: web_user.into(),
        }
    }

    /// Initialize application schema and admin account.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if the CLI invocation fails.
    #[instrument(skip(self, ctx), level = "debug")]
    pub fn maintenance_install(&self, ctx: &InstallContext) -> Result<()> {
        self.call(install_args(ctx))?;
        Ok(())
    }

    /// Query application status.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if the CLI invocation fails.
    /// - Return [`OccError::EmptyStatus`] if the CLI produced no output.
    /// - Return [`OccError::Parse`] if the status payload is not valid JSON.
    #[instrument(skip(self), level = "debug")]
    pub fn status(&self) -> Result<OccStatus> {
        let output = self.call(vec![
            "status".into(),
            "--output=json".into(),
            "--no-warnings".into(),
        ])?;
        parse_status_output(&output)
    }

    /// List current trusted domains in index order.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if the CLI invocation fails.
    pub fn trusted_domains(&self) -> Result<Vec<String>> {
        let output = self.call(vec![
            "config:system:get".into(),
            "trusted_domains".into(),
        ])?;
        Ok(output.split_whitespace().map(ToString::to_string).collect())
    }

    /// Set one trusted domain at target index.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if the CLI invocation fails.
    pub fn set_trusted_domain(&self, domain: &str, index: usize) -> Result<()> {
        self.call(vec![
            "config:system:set".into(),
            "trusted_domains".into(),
            index.to_string(),
            format!("--value={domain}"),
        ])?;
        Ok(())
    }

    /// Delete the entire trusted-domain list.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if the CLI invocation fails.
    pub fn delete_trusted_domains(&self) -> Result<()> {
        self.call(vec![
            "config:system:delete".into(),
            "trusted_domains".into(),
        ])?;
        Ok(())
    }

    /// Append a trusted domain after the current last index.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if any CLI invocation fails.
    pub fn add_trusted_domain(&self, domain: &str) -> Result<()> {
        let current = self.trusted_domains()?;
        if current.iter().any(|entry| entry == domain) {
            debug!("trusted domain {domain} already present");
            return Ok(());
        }
        self.set_trusted_domain(domain, current.len())
    }

    /// Remove one trusted domain, reindexing the remainder from 0.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if any CLI invocation fails.
    pub fn remove_trusted_domain(&self, domain: &str) -> Result<()> {
        let mut current = self.trusted_domains()?;
        let Some(position) = current.iter().position(|entry| entry == domain) else {
            return Ok(());
        };
        current.remove(position);

        // INVARIANT: Delete the whole list first; surviving indices may have
        // holes otherwise.
        self.delete_trusted_domains()?;
        for (index, domain) in current.iter().enumerate() {
            self.set_trusted_domain(domain, index)?;
        }

        Ok(())
    }

    /// Replace all peer entries of the trusted-domain list.
    ///
    /// The first two entries (localhost and the external hostname) are kept;
    /// everything after them is replaced with the peer addresses currently
    /// advertised on the cluster relation.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if any CLI invocation fails.
    #[instrument(skip(self), level = "debug")]
    pub fn update_trusted_domains_peer_ips(&self, peers: &[String]) -> Result<()> {
        let current = self.trusted_domains()?;
        let kept = current.len().min(2);
        let domains = current[..kept]
            .iter()
            .cloned()
            .chain(peers.iter().cloned())
            .collect::<Vec<_>>();

        self.delete_trusted_domains()?;
        for (index, domain) in domains.iter().enumerate() {
            self.set_trusted_domain(domain, index)?;
        }

        Ok(())
    }

    /// Rebuild missing database indices, returning CLI output verbatim.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if the CLI invocation fails.
    pub fn add_missing_indices(&self) -> Result<String> {
        self.call(vec!["db:add-missing-indices".into()])
    }

    /// Convert the filecache id columns to bigint, returning CLI output
    /// verbatim.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if the CLI invocation fails.
    pub fn convert_filecache_bigint(&self) -> Result<String> {
        self.call(vec![
            "db:convert-filecache-bigint".into(),
            "--no-interaction".into(),
        ])
    }

    /// Toggle maintenance mode, returning CLI output verbatim.
    ///
    /// # Errors
    ///
    /// - Return [`OccError::Exec`] if the CLI invocation fails.
    pub fn maintenance_mode(&self, enable: bool) -> Result<String> {
        let mode = if enable { "--on" } else { "--off" };
        self.call(vec!["maintenance:mode".into(), mode.into()])
    }

    fn call(&self, tail: Vec<String>) -> Result<String> {
        let args = occ_args(&self.web_user, tail);
        Ok(syscall_captured("sudo", args, Some(self.app_root.as_path()))?)
    }
}

/// Assemble the full argument vector of one CLI invocation.
///
/// Every call is `sudo -u <web_user> php occ <subcommand...>` so the
/// application code runs under its own user, never root.
fn occ_args(web_user: &str, tail: Vec<String>) -> Vec<String> {
    let mut args: Vec<String> = vec!["-u".into(), web_user.into(), "php".into(), "occ".into()];
    args.extend(tail);
    args
}

fn install_args(ctx: &InstallContext) -> Vec<String> {
    vec![
        "maintenance:install".into(),
        "--database".into(),
        ctx.db_kind.clone(),
        "--database-name".into(),
        ctx.db_name.clone(),
        "--database-host".into(),
        ctx.db_host.clone(),
        "--database-pass".into(),
        ctx.db_password.clone(),
        "--database-user".into(),
        ctx.db_user.clone(),
        "--admin-user".into(),
        ctx.admin_user.clone(),
        "--admin-pass".into(),
        ctx.admin_password.clone(),
        "--data-dir".into(),
        ctx.data_dir.clone(),
    ]
}

/// Parse CLI status output into [`OccStatus`].
///
/// The CLI may print warning lines before the JSON document, so only the
/// last whitespace-delimited token of the output is treated as the payload.
pub fn parse_status_output(output: &str) -> Result<OccStatus> {
    let payload = output
        .split_whitespace()
        .last()
        .ok_or(OccError::EmptyStatus)?;
    let status: OccStatus = serde_json::from_str(payload)?;
    Ok(status)
}

/// Administration CLI error types.
#[derive(Debug, thiserror::Error)]
pub enum OccError {
    /// CLI invocation failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Status query produced no output at all.
    #[error("administration CLI status produced no output")]
    EmptyStatus,

    /// Status payload is not valid JSON.
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}

/// Friendly result alias :3
type Result<T, E = OccError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn occ_args_run_as_web_user() {
        let args = occ_args("www-data", vec!["status".into()]);
        assert_eq!(args, ["-u", "www-data", "php", "occ", "status"]);
    }

    #[test]
    fn install_args_carry_full_context() {
        let args = install_args(&InstallContext {
            db_kind: "pgsql".into(),
            db_name: "nextcloud".into(),
            db_host: "10.0.0.2".into(),
            db_user: "nc".into(),
            db_password: "secret".into(),
            admin_user: "admin".into(),
            admin_password: "hunter2".into(),
            data_dir: "/var/www/nextcloud/data".into(),
        });

        let expect: Vec<String> = [
            "maintenance:install",
            "--database",
            "pgsql",
            "--database-name",
            "nextcloud",
            "--database-host",
            "10.0.0.2",
            "--database-pass",
            "secret",
            "--database-user",
            "nc",
            "--admin-user",
            "admin",
            "--admin-pass",
            "hunter2",
            "--data-dir",
            "/var/www/nextcloud/data",
        ]
        .into_iter()
        .map(ToString::to_string)
        .collect();

        assert_eq!(args, expect);
    }

    #[test]
    fn parse_status_takes_last_token() -> anyhow::Result<()> {
        let output = concat!(
            "PHP Warning: something harmless\n",
            "Cannot load Xdebug\n",
            r#"{"installed":true,"version":"18.0.3.0","versionstring":"18.0.3","edition":""}"#,
        );

        let status = parse_status_output(output)?;

        let expect = OccStatus {
            installed: true,
            version: "18.0.3.0".into(),
            versionstring: "18.0.3".into(),
            edition: String::new(),
        };
        assert_eq!(status, expect);

        Ok(())
    }

    #[test]
    fn parse_status_round_trips_known_good_payload() -> anyhow::Result<()> {
        let expect = OccStatus {
            installed: true,
            version: "18.0.3.0".into(),
            versionstring: "18.0.3".into(),
            edition: String::new(),
        };

        let payload = serde_json::to_string(&expect)?;
        let status = parse_status_output(&payload)?;

        assert_eq!(status, expect);

        Ok(())
    }

    #[test]
    fn parse_status_rejects_empty_output() {
        assert!(matches!(
            parse_status_output("  \n"),
            Err(OccError::EmptyStatus)
        ));
    }
}
