use mooring_core::sync::{BootstrapReport, PullReport, PushReport};
use serde_json::json;

use crate::commands::common::{print_json, require_remote, Core};
use crate::error::CliError;

pub async fn run_bootstrap(core: &Core) -> Result<(), CliError> {
    require_remote(core)?;
    let report = core.bootstrap().await?;
    print_bootstrap(&report);
    Ok(())
}

pub async fn run_pull(core: &Core, since: Option<&str>) -> Result<(), CliError> {
    require_remote(core)?;
    let report = match since {
        Some(since) => core.pull(since).await?,
        None => core.pull_latest().await?,
    };
    print_pull(&report);
    Ok(())
}

pub async fn run_push(core: &Core) -> Result<(), CliError> {
    require_remote(core)?;
    let report = core.push().await?;
    print_push(&report);
    Ok(())
}

pub async fn run_sync(core: &Core) -> Result<(), CliError> {
    require_remote(core)?;
    let report = core.sync().await?;
    if let Some(bootstrap) = report.bootstrap.as_ref() {
        print_bootstrap(bootstrap);
    }
    if let Some(pull) = report.pull.as_ref() {
        print_pull(pull);
    }
    print_push(&report.push);
    println!("Sync completed");
    Ok(())
}

pub async fn run_status(core: &Core, as_json: bool) -> Result<(), CliError> {
    let counts = core.queue_counts().await?;
    let last_sync = core.last_sync().await?;
    let remote = core.remote().as_ref().map(|remote| remote.base_url().to_string());

    if as_json {
        return print_json(&json!({
            "state": core.state(),
            "remote": remote,
            "lastSync": last_sync,
            "queue": counts,
        }));
    }

    println!("State:     {}", core.state());
    println!("Remote:    {}", remote.as_deref().unwrap_or("not configured"));
    println!("Last sync: {}", last_sync.as_deref().unwrap_or("never"));
    println!(
        "Queue:     {} pending, {} conflict, {} failed, {} synced",
        counts.pending, counts.conflict, counts.failed, counts.synced
    );
    Ok(())
}

pub fn print_bootstrap(report: &BootstrapReport) {
    println!(
        "Bootstrapped {} entities ({} rebased on local changes) at {}",
        report.applied, report.rebased, report.timestamp
    );
}

pub fn print_pull(report: &PullReport) {
    println!(
        "Pulled {} change(s), skipped {} with unresolved local work, watermark {}",
        report.applied,
        report.skipped.len(),
        report.timestamp
    );
}

pub fn print_push(report: &PushReport) {
    if report.submitted == 0 {
        println!("Nothing to push");
        return;
    }
    println!(
        "Pushed {}: {} synced, {} conflict, {} failed, {} unanswered",
        report.submitted, report.synced, report.conflicted, report.failed, report.unanswered
    );
}
