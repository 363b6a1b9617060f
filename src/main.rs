// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use nextcloud_charm::{Action, Charm, Disposition, Event, HookRuntime, Layout};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit status the host runtime treats as "redeliver this event later".
const DEFER_EXIT_CODE: i32 = 42;

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  nextcloud-charm hook <event_name>\n  nextcloud-charm action <action_name>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<i32> {
        match self.command {
            Command::Hook(opts) => run_hook(opts),
            Command::Action(opts) => run_action(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Handle one lifecycle or relation event delivery.
    #[command(override_usage = "nextcloud-charm hook <event_name>")]
    Hook(HookOptions),

    /// Run one administrative action.
    #[command(subcommand)]
    Action(ActionCommand),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct HookOptions {
    /// Name of the delivered event, e.g. "install" or "master-changed".
    #[arg(value_name = "event_name")]
    pub event_name: String,
}

#[derive(Debug, Clone, Subcommand)]
enum ActionCommand {
    /// Rebuild missing database indices.
    AddMissingIndices,

    /// Convert the filecache id columns to bigint.
    ConvertFilecacheBigint,

    /// Take the site in or out of maintenance mode.
    Maintenance {
        /// Enable maintenance mode instead of disabling it.
        #[arg(long)]
        enable: bool,
    },
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run() {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

fn run() -> Result<i32> {
    Cli::parse().run()
}

fn run_hook(opts: HookOptions) -> Result<i32> {
    let event: Event = opts.event_name.parse()?;
    let mut charm = Charm::new(HookRuntime::new(), Layout::default())?;

    match charm.handle(event)? {
        Disposition::Complete => Ok(0),
        Disposition::Defer => {
            info!("event {:?} deferred, awaiting redelivery", opts.event_name);
            Ok(DEFER_EXIT_CODE)
        }
    }
}

fn run_action(command: ActionCommand) -> Result<i32> {
    let action = match command {
        ActionCommand::AddMissingIndices => Action::AddMissingIndices,
        ActionCommand::ConvertFilecacheBigint => Action::ConvertFilecacheBigint,
        ActionCommand::Maintenance { enable } => Action::Maintenance { enable },
    };

    let mut charm = Charm::new(HookRuntime::new(), Layout::default())?;
    charm.run_action(action)?;

    Ok(0)
}
