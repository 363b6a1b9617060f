// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host runtime capability interface.
//!
//! The charm never talks to the orchestration runtime directly. Everything
//! it needs from the outside world (leadership, operator configuration,
//! relation data, status reporting) is expressed as one capability trait,
//! so event handlers can be driven by an in-memory double in tests and by
//! the real hook tools in production.
//!
//! # Relation Data Ownership
//!
//! Each unit owns and writes only its own side of a relation's data;
//! reads are of the remote side, or of the leader-published application
//! data both sides can observe. The trait mirrors that split: publishing
//! methods write the local side, reading methods never do.
//!
//! # Deferral
//!
//! Handlers signal an unmet precondition by returning
//! [`Disposition::Defer`] instead of calling back into the runtime. The
//! dispatcher maps it to the exit status the host runtime redelivers on.
//! Deferral is cooperative yield-and-retry, not an error.

use crate::{
    config::{CharmConfig, ConfigError},
    exec::{syscall_non_interactive, ExecError},
};

use tracing::{debug, instrument};

/// Coarse unit status reported to the host runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Unit is busy executing an installation or configuration step.
    Maintenance(String),

    /// Unit cannot proceed until an external condition is met.
    Blocked(String),

    /// Unit is waiting on another unit to act first.
    Waiting(String),

    /// Unit is serving.
    Active(String),
}

impl Status {
    /// Status kind keyword understood by the host runtime.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Maintenance(_) => "maintenance",
            Self::Blocked(_) => "blocked",
            Self::Waiting(_) => "waiting",
            Self::Active(_) => "active",
        }
    }

    /// Human-readable status message.
    pub fn message(&self) -> &str {
        match self {
            Self::Maintenance(msg) | Self::Blocked(msg) | Self::Waiting(msg) | Self::Active(msg) => {
                msg.as_str()
            }
        }
    }
}

/// Outcome of one event delivery.
///
/// `Defer` re-queues the current event for a later delivery attempt once
/// its precondition is met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Disposition {
    /// Event fully handled.
    Complete,

    /// Precondition unmet; ask the host runtime to redeliver.
    Defer,
}

/// Capability set the host runtime exposes to event handlers.
pub trait Runtime {
    /// Check whether this unit is the elected leader among its peers.
    fn is_leader(&self) -> Result<bool>;

    /// Fetch the operator-supplied charm configuration.
    fn config(&self) -> Result<CharmConfig>;

    /// Determine this unit's own network address.
    fn unit_address(&self) -> Result<String>;

    /// Read a key from the remote side of a relation.
    fn remote_get(&self, relation: &str, key: &str) -> Result<Option<String>>;

    /// Read a leader-published key from a relation's application data.
    fn leader_get(&self, relation: &str, key: &str) -> Result<Option<String>>;

    /// Publish a key into a relation's application data. Leader only.
    fn leader_set(&self, relation: &str, key: &str, value: &str) -> Result<()>;

    /// Publish a key into this unit's own side of a relation.
    fn unit_set(&self, relation: &str, key: &str, value: &str) -> Result<()>;

    /// Collect a key's value from every peer unit on a relation.
    fn peer_values(&self, relation: &str, key: &str) -> Result<Vec<String>>;

    /// Report unit status to the host runtime.
    fn set_status(&self, status: &Status) -> Result<()>;

    /// Open a network port for external traffic.
    fn open_port(&self, port: u16) -> Result<()>;

    /// Report the installed application version for display.
    fn set_application_version(&self, version: &str) -> Result<()>;

    /// Emit one key of the current action's result payload.
    fn action_set(&self, key: &str, value: &str) -> Result<()>;
}

/// Production runtime backed by the host runtime's hook tools.
///
/// Every capability shells out to the corresponding hook tool binary
/// (`is-leader`, `config-get`, `relation-get`, ...), asking for JSON output
/// wherever the result is consumed rather than displayed. Relation names
/// are resolved to the first matching relation id on each call.
#[derive(Debug, Default, Clone)]
pub struct HookRuntime;

impl HookRuntime {
    pub fn new() -> Self {
        Self
    }

    fn relation_id(&self, relation: &str) -> Result<Option<String>> {
        let output = syscall_non_interactive("relation-ids", [relation, "--format=json"])?;
        let ids: Vec<String> = serde_json::from_str(&output)?;
        Ok(ids.into_iter().next())
    }

    fn relation_units(&self, relation_id: &str) -> Result<Vec<String>> {
        let output =
            syscall_non_interactive("relation-list", ["-r", relation_id, "--format=json"])?;
        let units: Vec<String> = serde_json::from_str(&output)?;
        Ok(units)
    }

    fn relation_get(&self, relation_id: &str, unit: &str, key: &str, app: bool) -> Result<Option<String>> {
        let mut args = vec!["-r", relation_id, key, unit, "--format=json"];
        if app {
            args.push("--app");
        }
        let output = syscall_non_interactive("relation-get", args)?;
        let value: Option<String> = serde_json::from_str(&output)?;
        Ok(value.filter(|value| !value.is_empty()))
    }
}

impl Runtime for HookRuntime {
    fn is_leader(&self) -> Result<bool> {
        let output = syscall_non_interactive("is-leader", ["--format=json"])?;
        Ok(serde_json::from_str(&output)?)
    }

    fn config(&self) -> Result<CharmConfig> {
        let output = syscall_non_interactive("config-get", ["--format=json"])?;
        Ok(output.parse()?)
    }

    fn unit_address(&self) -> Result<String> {
        let output = syscall_non_interactive("unit-get", ["private-address", "--format=json"])?;
        let address: String = serde_json::from_str(&output)?;
        Ok(address)
    }

    fn remote_get(&self, relation: &str, key: &str) -> Result<Option<String>> {
        let Some(relation_id) = self.relation_id(relation)? else {
            return Ok(None);
        };
        let Some(unit) = self.relation_units(&relation_id)?.into_iter().next() else {
            return Ok(None);
        };
        self.relation_get(&relation_id, &unit, key, false)
    }

    fn leader_get(&self, relation: &str, key: &str) -> Result<Option<String>> {
        let Some(relation_id) = self.relation_id(relation)? else {
            return Ok(None);
        };
        let unit = std::env::var("JUJU_UNIT_NAME").unwrap_or_default();
        self.relation_get(&relation_id, &unit, key, true)
    }

    #[instrument(skip(self, value), level = "debug")]
    fn leader_set(&self, relation: &str, key: &str, value: &str) -> Result<()> {
        let Some(relation_id) = self.relation_id(relation)? else {
            return Ok(());
        };
        let pair = format!("{key}={value}");
        syscall_non_interactive(
            "relation-set",
            ["-r", relation_id.as_str(), "--app", pair.as_str()],
        )?;
        Ok(())
    }

    #[instrument(skip(self, value), level = "debug")]
    fn unit_set(&self, relation: &str, key: &str, value: &str) -> Result<()> {
        let Some(relation_id) = self.relation_id(relation)? else {
            return Ok(());
        };
        let pair = format!("{key}={value}");
        syscall_non_interactive("relation-set", ["-r", relation_id.as_str(), pair.as_str()])?;
        Ok(())
    }

    fn peer_values(&self, relation: &str, key: &str) -> Result<Vec<String>> {
        let Some(relation_id) = self.relation_id(relation)? else {
            return Ok(Vec::new());
        };

        let mut values = Vec::new();
        for unit in self.relation_units(&relation_id)? {
            if let Some(value) = self.relation_get(&relation_id, &unit, key, false)? {
                values.push(value);
            }
        }

        Ok(values)
    }

    fn set_status(&self, status: &Status) -> Result<()> {
        debug!("status-set {}: {}", status.kind(), status.message());
        syscall_non_interactive("status-set", [status.kind(), status.message()])?;
        Ok(())
    }

    fn open_port(&self, port: u16) -> Result<()> {
        syscall_non_interactive("open-port", [format!("{port}/tcp")])?;
        Ok(())
    }

    fn set_application_version(&self, version: &str) -> Result<()> {
        syscall_non_interactive("application-version-set", [version])?;
        Ok(())
    }

    fn action_set(&self, key: &str, value: &str) -> Result<()> {
        syscall_non_interactive("action-set", [format!("{key}={value}")])?;
        Ok(())
    }
}

/// Host runtime interaction error types.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Hook tool invocation failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Hook tool produced an unparseable payload.
    #[error(transparent)]
    Parse(#[from] serde_json::Error),

    /// Configuration payload failed to deserialize.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Friendly result alias :3
pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case(Status::Maintenance("installing".into()), "maintenance"; "maintenance kind")]
    #[test_case(Status::Blocked("no database".into()), "blocked"; "blocked kind")]
    #[test_case(Status::Waiting("leader first".into()), "waiting"; "waiting kind")]
    #[test_case(Status::Active("serving".into()), "active"; "active kind")]
    #[test]
    fn status_kind_keywords(status: Status, expect: &str) {
        assert_eq!(status.kind(), expect);
    }

    #[test]
    fn status_message_passthrough() {
        let status = Status::Blocked("Missing postgresql relation data.".into());
        assert_eq!(status.message(), "Missing postgresql relation data.");
    }
}
