// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Event handlers.
//!
//! The host runtime delivers named lifecycle, relation, and action events
//! one at a time; each handler runs to completion before the next delivery.
//! Handlers inspect and update the persisted unit state, perform their side
//! effects synchronously, and either complete or ask for redelivery by
//! returning [`Disposition::Defer`] when a precondition is not met yet.
//!
//! # Roles
//!
//! The elected leader performs every cluster-wide side effect: requesting
//! the database, initializing the application, and publishing the canonical
//! configuration file content for its peers. Secondary units mirror the
//! leader's configuration verbatim instead of re-running initialization,
//! so a secondary reaches the database-available milestone without ever
//! talking to the database itself.

use crate::{
    config::CharmConfig,
    exec::{syscall_non_interactive, ExecError},
    install::{self, InstallError},
    occ::{InstallContext, Occ, OccError},
    path::Layout,
    render::PhpModuleContext,
    runtime::{Disposition, Runtime, RuntimeError, Status},
    state::{DatabaseParams, StateError, StateFile, UnitState},
};

use std::{fs, str::FromStr};
use tracing::{debug, info, instrument, warn};

/// Name of the database relation.
pub const DB_RELATION: &str = "db";

/// Name of the peer cluster relation.
pub const CLUSTER_RELATION: &str = "cluster";

/// Database name requested from the database application.
pub const DB_NAME: &str = "nextcloud";

/// Database extensions requested alongside the database.
pub const DB_EXTENSIONS: &str = "citext";

/// Cluster relation key carrying the leader's rendered configuration file.
pub const CONFIG_PAYLOAD_KEY: &str = "nextcloud_config";

/// Cluster relation key carrying each unit's advertised address.
pub const ADDRESS_KEY: &str = "ingress-address";

/// System user the application runs as.
pub const WEB_USER: &str = "www-data";

/// Lifecycle and relation events delivered by the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Install,
    ConfigChanged,
    DatabaseRelationJoined,
    MasterChanged,
    ClusterRelationChanged,
    ClusterRelationDeparted,
    UpdateStatus,
}

impl FromStr for Event {
    type Err = CharmError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "install" => Ok(Self::Install),
            "config-changed" => Ok(Self::ConfigChanged),
            "database-relation-joined" => Ok(Self::DatabaseRelationJoined),
            "master-changed" => Ok(Self::MasterChanged),
            // A peer joining is observed as relation data changing.
            "cluster-relation-joined" | "cluster-relation-changed" => {
                Ok(Self::ClusterRelationChanged)
            }
            "cluster-relation-departed" => Ok(Self::ClusterRelationDeparted),
            "update-status" => Ok(Self::UpdateStatus),
            _ => Err(CharmError::UnknownEvent(name.into())),
        }
    }
}

/// One-shot administrative operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Rebuild missing database indices.
    AddMissingIndices,

    /// Convert the filecache id columns to bigint.
    ConvertFilecacheBigint,

    /// Take the site in or out of maintenance mode.
    Maintenance { enable: bool },
}

/// The deployed unit.
///
/// Owns the persisted state, the filesystem layout, and a handle on the
/// host runtime's capabilities. Generic over [`Runtime`] so handlers can be
/// unit-tested without a real orchestration runtime.
#[derive(Debug)]
pub struct Charm<R>
where
    R: Runtime,
{
    runtime: R,
    layout: Layout,
    occ: Occ,
    state_file: StateFile,
    state: UnitState,
}

impl<R> Charm<R>
where
    R: Runtime,
{
    /// Construct charm, loading persisted state from the layout's state
    /// file.
    ///
    /// # Errors
    ///
    /// - Return [`CharmError::State`] if the state file exists but cannot
    ///   be read or parsed.
    pub fn new(runtime: R, layout: Layout) -> Result<Self> {
        let occ = Occ::new(&layout.app_root, WEB_USER);
        let state_file = StateFile::new(&layout.state_file);
        let state = state_file.load()?;

        Ok(Self {
            runtime,
            layout,
            occ,
            state_file,
            state,
        })
    }

    pub fn state(&self) -> &UnitState {
        &self.state
    }

    /// Handle one event delivery.
    ///
    /// Persists the unit state after the handler completes or defers; a
    /// handler error leaves the state file untouched so the redelivered
    /// event starts from the last recorded milestones.
    ///
    /// # Errors
    ///
    /// - Return the handler's error verbatim; every handler error is fatal
    ///   to this delivery and surfaces as a non-zero process exit.
    #[instrument(skip(self), level = "debug")]
    pub fn handle(&mut self, event: Event) -> Result<Disposition> {
        let disposition = match event {
            Event::Install => self.on_install()?,
            Event::ConfigChanged => self.on_config_changed()?,
            Event::DatabaseRelationJoined => self.on_database_relation_joined()?,
            Event::MasterChanged => self.on_master_changed()?,
            Event::ClusterRelationChanged => self.on_cluster_relation_changed()?,
            Event::ClusterRelationDeparted => self.on_cluster_relation_departed()?,
            Event::UpdateStatus => self.on_update_status()?,
        };

        self.state_file.store(&self.state)?;

        Ok(disposition)
    }

    /// Run one administrative action.
    ///
    /// The captured CLI output is emitted verbatim as the action's result
    /// payload.
    ///
    /// # Errors
    ///
    /// - Return [`CharmError::Occ`] if the administration CLI fails.
    #[instrument(skip(self), level = "debug")]
    pub fn run_action(&mut self, action: Action) -> Result<()> {
        let output = match action {
            Action::AddMissingIndices => self.occ.add_missing_indices()?,
            Action::ConvertFilecacheBigint => self.occ.convert_filecache_bigint()?,
            Action::Maintenance { enable } => self.occ.maintenance_mode(enable)?,
        };

        self.runtime.action_set("result", &output)?;

        Ok(())
    }

    fn on_install(&mut self) -> Result<Disposition> {
        self.set_status(Status::Maintenance("Begin installing dependencies...".into()))?;
        install::install_packages()?;
        self.set_status(Status::Maintenance("Dependencies installed.".into()))?;

        let config = self.runtime.config()?;

        if !self.state.fetched() {
            self.set_status(Status::Maintenance("Begin fetching nextcloud sources.".into()))?;
            install::fetch_archive(&config.source, &config.source_sha256, &self.layout.web_root)?;
            self.state.mark_fetched();
            self.set_status(Status::Maintenance("Nextcloud sources installed.".into()))?;
        }

        self.set_status(Status::Maintenance("Begin config apache2.".into()))?;
        install::configure_apache(&self.layout)?;
        self.state.mark_apache_configured();

        self.set_status(Status::Maintenance("Begin config php.".into()))?;
        install::configure_php(&php_context(&config), &self.layout)?;
        self.state.mark_php_configured();

        if !self.state.database_available() {
            self.set_status(Status::Blocked("Missing postgresql relation data.".into()))?;
            return Ok(Disposition::Defer);
        }
        self.set_status(Status::Maintenance("Database available.".into()))?;

        if !self.state.initialized() {
            self.init_nextcloud(&config)?;
        }

        Ok(Disposition::Complete)
    }

    fn on_config_changed(&mut self) -> Result<Disposition> {
        debug!("config changed, first unmet milestone: {:?}", self.state.first_unmet());
        Ok(Disposition::Complete)
    }

    fn on_database_relation_joined(&mut self) -> Result<Disposition> {
        if self.runtime.is_leader()? {
            // Provide requirements to the database application.
            self.runtime.leader_set(DB_RELATION, "database", DB_NAME)?;
            self.runtime
                .leader_set(DB_RELATION, "extensions", DB_EXTENSIONS)?;
            return Ok(Disposition::Complete);
        }

        let requested = self.runtime.leader_get(DB_RELATION, "database")?;
        if requested.as_deref() != Some(DB_NAME) {
            // Leader has not set requirements yet. Defer, in case this unit
            // becomes leader and needs to perform that operation.
            debug!("requested database is {requested:?}, awaiting leader");
            return Ok(Disposition::Defer);
        }

        Ok(Disposition::Complete)
    }

    fn on_master_changed(&mut self) -> Result<Disposition> {
        let requested = self.runtime.leader_get(DB_RELATION, "database")?;
        if requested.as_deref() != Some(DB_NAME) {
            // Leader has not set requirements yet. Wait until the next
            // event, or risk connecting to an incorrect database.
            return Ok(Disposition::Complete);
        }

        if !self.runtime.is_leader()? {
            return Ok(Disposition::Complete);
        }

        match self.runtime.remote_get(DB_RELATION, "master")? {
            None => {
                warn!("database master gone, withdrawing connection parameters");
                self.state.clear_database();
            }
            Some(conn_str) => {
                let params = DatabaseParams::from_conn_str(conn_str);
                info!("database master at {}:{}", params.host, params.port);
                self.state.record_database(params);

                if !self.state.initialized() {
                    let config = self.runtime.config()?;
                    self.init_nextcloud(&config)?;
                }
            }
        }

        Ok(Disposition::Complete)
    }

    fn on_cluster_relation_changed(&mut self) -> Result<Disposition> {
        let address = self.runtime.unit_address()?;
        self.runtime.unit_set(CLUSTER_RELATION, ADDRESS_KEY, &address)?;

        if self.runtime.is_leader()? {
            return self.publish_cluster_config();
        }

        let Some(payload) = self.runtime.leader_get(CLUSTER_RELATION, CONFIG_PAYLOAD_KEY)? else {
            // Leader has not published its configuration yet.
            debug!("no configuration payload on the cluster relation, deferring");
            return Ok(Disposition::Defer);
        };

        self.adopt_cluster_config(&payload)?;

        Ok(Disposition::Complete)
    }

    fn on_cluster_relation_departed(&mut self) -> Result<Disposition> {
        if !self.runtime.is_leader()? {
            return Ok(Disposition::Complete);
        }

        self.publish_cluster_config()
    }

    fn on_update_status(&mut self) -> Result<Disposition> {
        if let Some(unmet) = self.state.first_unmet() {
            self.set_status(Status::Blocked(unmet.blocked_label().into()))?;
            return Ok(Disposition::Complete);
        }

        if self.runtime.is_leader()? {
            let status = self.occ.status()?;
            self.runtime.set_application_version(&status.versionstring)?;
        }
        self.set_status(Status::Active(String::new()))?;

        Ok(Disposition::Complete)
    }

    /// Leader side of peer propagation.
    ///
    /// Recomputes the trusted-domain list from all peers' advertised
    /// addresses and republishes the full local configuration file content
    /// into shared relation data.
    fn publish_cluster_config(&mut self) -> Result<Disposition> {
        if !self.state.initialized() {
            // Nothing canonical to publish until initialization has run.
            debug!("leader not initialized yet, deferring cluster publication");
            return Ok(Disposition::Defer);
        }

        let peers = self.runtime.peer_values(CLUSTER_RELATION, ADDRESS_KEY)?;
        self.occ.update_trusted_domains_peer_ips(&peers)?;

        let payload = fs::read_to_string(&self.layout.config_php)?;
        self.runtime
            .leader_set(CLUSTER_RELATION, CONFIG_PAYLOAD_KEY, &payload)?;
        info!("published configuration for {} peer(s)", peers.len());

        Ok(Disposition::Complete)
    }

    /// Secondary side of peer propagation.
    ///
    /// Copies the leader's configuration file verbatim and ensures the data
    /// directory marker exists. The payload fully encodes the state needed
    /// to serve traffic, so the secondary skips database initialization.
    fn adopt_cluster_config(&mut self, payload: &str) -> Result<Disposition> {
        if let Some(parent) = self.layout.config_php.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.layout.config_php, payload)?;

        let marker = self.layout.data_marker();
        if !marker.exists() {
            fs::create_dir_all(&self.layout.data_dir)?;
            fs::write(&marker, "")?;
        }

        self.state.mark_initialized();
        self.state.mark_database_available();
        info!("adopted leader configuration");

        Ok(Disposition::Complete)
    }

    /// One-time application initialization. Leader only.
    fn init_nextcloud(&mut self, config: &CharmConfig) -> Result<Disposition> {
        self.set_status(Status::Maintenance("Begin initializing nextcloud...".into()))?;

        let params = self
            .state
            .database
            .clone()
            .ok_or(CharmError::MissingDatabaseParams)?;

        let owner = format!("{WEB_USER}:{WEB_USER}");
        let app_root = self.layout.app_root.to_string_lossy().into_owned();
        syscall_non_interactive("chown", ["-R", owner.as_str(), app_root.as_str()])?;

        self.occ.maintenance_install(&InstallContext {
            db_kind: params.kind,
            db_name: params.name,
            db_host: params.host,
            db_user: params.user,
            db_password: params.password,
            admin_user: config.admin_user.clone(),
            admin_password: config.admin_password.clone(),
            data_dir: self.layout.data_dir.to_string_lossy().into_owned(),
        })?;

        // The external hostname goes in as a trusted domain through the
        // CLI so the application rewrites the affected key structurally.
        let fqdn = match &config.fqdn {
            Some(fqdn) => fqdn.clone(),
            None => self.runtime.unit_address()?,
        };
        self.occ.add_trusted_domain(&fqdn)?;

        self.runtime.open_port(80)?;
        self.state.mark_initialized();
        self.set_status(Status::Maintenance("Nextcloud init complete.".into()))?;

        Ok(Disposition::Complete)
    }

    fn set_status(&self, status: Status) -> Result<()> {
        info!("{}: {}", status.kind(), status.message());
        self.runtime.set_status(&status)?;
        Ok(())
    }
}

fn php_context(config: &CharmConfig) -> PhpModuleContext {
    PhpModuleContext {
        max_file_uploads: config.php_max_file_uploads,
        upload_max_filesize: config.php_upload_max_filesize.clone(),
        post_max_size: config.php_post_max_size.clone(),
        memory_limit: config.php_memory_limit.clone(),
    }
}

/// Charm error types.
#[derive(Debug, thiserror::Error)]
pub enum CharmError {
    /// Event name not recognized by this charm.
    #[error("unknown event {0:?}")]
    UnknownEvent(String),

    /// Initialization requested without recorded database parameters.
    #[error("no database connection parameters recorded")]
    MissingDatabaseParams,

    /// Host runtime interaction failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Persisted state handling failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// Installation step failed.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// Administration CLI failed.
    #[error(transparent)]
    Occ(#[from] OccError),

    /// External command failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Local file manipulation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
type Result<T, E = CharmError> = std::result::Result<T, E>;
