//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler (RESCHEDULE_SWEEP_CRON, default every 5 minutes)
//!     │
//!     └─► expire_overdue()
//!             └─► For each overdue `rescheduled` occurrence → cancel + refund
//! ```
//!
//! `respond` still checks the deadline itself, so a missed tick only delays
//! the refund and never lets a late answer through.

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::reschedule::expire_overdue;
use crate::kernel::ServerDeps;

/// Start all scheduled tasks
pub async fn start_scheduler(deps: ServerDeps, sweep_cron: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;

    let sweep_job = Job::new_async(sweep_cron, move |_uuid, _lock| {
        let deps = deps.clone();
        Box::pin(async move {
            run_reschedule_sweep(&deps).await;
        })
    })
    .with_context(|| format!("Invalid reschedule sweep schedule: {}", sweep_cron))?;

    scheduler.add(sweep_job).await?;
    scheduler.start().await?;

    tracing::info!(schedule = sweep_cron, "Scheduled tasks started (reschedule expiry sweep)");
    Ok(scheduler)
}

/// One pass of the expiry sweep; failures are logged and retried next tick.
pub async fn run_reschedule_sweep(deps: &ServerDeps) {
    match expire_overdue(deps).await {
        Ok(0) => tracing::debug!("No overdue reschedules"),
        Ok(expired) => tracing::info!(expired, "Reschedule sweep complete"),
        Err(e) => tracing::error!(error = %e, "Reschedule sweep failed"),
    }
}
