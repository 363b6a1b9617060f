// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment automation for self-hosted Nextcloud.
//!
//! This crate implements a charm: a small unit of deployment automation the
//! host orchestration runtime drives by delivering named lifecycle and
//! relation events. The charm installs the OS package stack, fetches and
//! verifies the application release archive, renders the web server and PHP
//! configuration, initializes the application through its own administration
//! CLI, and keeps a cluster of units in sync by propagating the leader's
//! configuration to its peers.
//!
//! # Architecture
//!
//! Event handlers live in [`charm`] and are generic over the [`runtime`]
//! capability trait, which is the only door to the outside world the
//! handlers get. Deployment progress is tracked as forward-only milestones
//! in [`state`]; the reported unit status is always derived from them in
//! one fixed order.

pub mod charm;
pub mod config;
pub mod exec;
pub mod install;
pub mod occ;
pub mod path;
pub mod render;
pub mod runtime;
pub mod state;

pub use charm::{Action, Charm, Event};
pub use config::CharmConfig;
pub use path::Layout;
pub use runtime::{Disposition, HookRuntime, Runtime, Status};
pub use state::{Milestone, UnitState};
