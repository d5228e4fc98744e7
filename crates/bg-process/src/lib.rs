use async_trait::async_trait;
use eyre::{Error, Result};
use ledger::Ledger;
use log::{error, info};
use process::{audit::CapacityAuditBg, cleanup::CleanupBg};
use storage::LedgerStore;
use tokio_cron_scheduler::{Job, JobScheduler};

pub mod process;

#[async_trait]
pub trait Task: Clone + Send + Sync + 'static {
    const NAME: &'static str;
    const CRON: &'static str;

    async fn process(&mut self) -> Result<(), Error>;
}

/// Registers the periodic jobs and starts the scheduler.
pub async fn start<S: LedgerStore>(ledger: Ledger<S>) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await?;
    add_task(&sched, CleanupBg::new(ledger.clone())).await?;
    add_task(&sched, CapacityAuditBg::new(ledger)).await?;
    sched.start().await?;
    Ok(sched)
}

async fn add_task<T: Task>(sched: &JobScheduler, task: T) -> Result<()> {
    let job = Job::new_async(T::CRON, move |_, _| {
        let mut task = task.clone();
        Box::pin(async move {
            info!("Running task: {}", T::NAME);
            if let Err(err) = task.process().await {
                error!("Task {} failed: {:#}", T::NAME, err);
            }
        })
    })?;
    sched.add(job).await?;
    info!("Scheduled task {} ({})", T::NAME, T::CRON);
    Ok(())
}
