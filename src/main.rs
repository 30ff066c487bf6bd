// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use release_tracker::config::Config;
use release_tracker::error::{CoreError, EXIT_OTHER_FAILURE, EXIT_SUCCESS};
use release_tracker::model::MonitorOutput;
use release_tracker::version_db::{self, VersionDatabase};
use release_tracker::Coordinator;

use cli::{Cli, Command};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    release_tracker::logging::init(cli.verbose);

    let exit_code = match run(cli.command).await {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            err.downcast_ref::<CoreError>()
                .map(CoreError::exit_code)
                .unwrap_or(EXIT_OTHER_FAILURE)
        }
    };

    std::process::exit(exit_code);
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Check { config, output } => run_check(config, output).await,
        Command::Sync { config } => run_sync(config).await,
        Command::Status { config, repo } => run_status(config, repo).await,
    }
}

fn bearer_token() -> Option<String> {
    std::env::var("RELEASE_TRACKER_TOKEN").ok()
}

async fn run_check(config_path: std::path::PathBuf, output_path: std::path::PathBuf) -> Result<()> {
    let config = Config::from_path(&config_path).context("loading configuration")?;
    let db: Arc<dyn VersionDatabase> = Arc::from(version_db::resolve_backend(&config)?);
    let coordinator = Coordinator::new(config.clone(), bearer_token(), db)?;

    let cancel = CancellationToken::new();
    let releases = coordinator.discover_live(cancel).await?;

    let monitor_output = MonitorOutput {
        timestamp: chrono::Utc::now(),
        total_repositories_checked: config.repositories.len() as u32,
        new_releases_found: releases.len() as u32,
        releases,
    };

    let serialized = serde_json::to_vec_pretty(&monitor_output).context("serializing monitor output")?;
    tokio::fs::write(&output_path, serialized)
        .await
        .with_context(|| format!("writing {:?}", output_path))?;

    println!(
        "checked {} repositories, {} new releases",
        monitor_output.total_repositories_checked, monitor_output.new_releases_found
    );

    Ok(())
}

async fn run_sync(config_path: std::path::PathBuf) -> Result<()> {
    let config = Config::from_path(&config_path).context("loading configuration")?;
    let db: Arc<dyn VersionDatabase> = Arc::from(version_db::resolve_backend(&config)?);
    let coordinator = Coordinator::new(config, bearer_token(), db)?;

    let cancel = CancellationToken::new();
    let report = coordinator.run_live(cancel).await?;

    for outcome in &report.outcomes {
        println!(
            "{}\t{:?}\t{}\t{}",
            outcome.repo,
            outcome.status,
            outcome.tag.as_deref().unwrap_or("-"),
            outcome.reason
        );
    }

    println!(
        "downloaded {}, failed {}, total {}",
        report.downloaded_count(),
        report.failed_count(),
        report.outcomes.len()
    );

    if report.failed_count() > 0 {
        anyhow::bail!("{} repositories failed", report.failed_count());
    }

    Ok(())
}

async fn run_status(config_path: std::path::PathBuf, repo_filter: Option<String>) -> Result<()> {
    let config = Config::from_path(&config_path).context("loading configuration")?;
    let db = version_db::resolve_backend(&config)?;
    let document = db.load().await?;

    for (key, record) in &document.repositories {
        if let Some(filter) = &repo_filter {
            if filter != key {
                continue;
            }
        }
        println!(
            "{}\t{}\tlast_updated={}\thistory={}",
            key,
            record.current_version,
            record.last_updated,
            record.download_history.len()
        );
    }

    Ok(())
}
