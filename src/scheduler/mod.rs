pub mod broadcast;
pub mod tasks;

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

pub use broadcast::{BroadcastJob, BroadcastScheduler};

/// A housekeeping run. Errors are logged and the job stays scheduled.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Recurring housekeeping jobs (cron expressions with a seconds field)
pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner })
    }

    pub async fn add_cron_job<F>(&self, cron_expr: &str, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> TaskFuture + Send + Sync + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let name = job_name.clone();
            let run = task();
            Box::pin(async move {
                let started = Instant::now();
                match run.await {
                    Ok(()) => debug!("Job {} finished in {:?}", name, started.elapsed()),
                    Err(e) => error!("Job {} failed: {:#}", name, e),
                }
            })
        })
        .with_context(|| format!("Invalid cron expression for {}: {}", name, cron_expr))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;

        info!("Job '{}' registered ({})", name, cron_expr);
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shut down scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_invalid_cron_expression_rejected() {
        let scheduler = Scheduler::new().await.unwrap();
        let result = scheduler
            .add_cron_job("not a cron", "broken", || {
                Box::pin(async { Ok::<(), anyhow::Error>(()) })
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failing_job_keeps_firing() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new().await.unwrap();

        let counter = Arc::clone(&runs);
        scheduler
            .add_cron_job("* * * * * *", "always-fails", move || {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), anyhow::Error>(anyhow::anyhow!("disk full"))
                })
            })
            .await
            .unwrap();
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        scheduler.shutdown().await.unwrap();
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }
}
