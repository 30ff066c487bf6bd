// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line surface (spec §6). A thin control layer over the
//! engine in `lib.rs`: each subcommand loads configuration, resolves
//! the version database backend, and drives the coordinator.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "release-tracker", version, about = "Stateful release-tracking daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase logging verbosity; may be repeated (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover latest releases only; writes the monitor-output document.
    Check {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value = "monitor_output.json")]
        output: PathBuf,
    },

    /// Discover, download, and upload in a single run.
    Sync {
        #[arg(long)]
        config: PathBuf,
    },

    /// Print the version database contents for configured repositories.
    Status {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        repo: Option<String>,
    },
}
