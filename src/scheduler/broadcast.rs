use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::platform::{OutboundPayload, Transport};

/// One repeated-send request
#[derive(Debug, Clone)]
pub struct BroadcastJob {
    pub target: String,
    pub message: String,
    pub repeat_count: u32,
    pub interval: Duration,
}

/// Handle to the sends of a scheduled job. Dropping it does not cancel anything.
pub struct BroadcastHandle {
    pub job_id: Uuid,
    sends: Vec<JoinHandle<bool>>,
}

impl BroadcastHandle {
    pub fn len(&self) -> usize {
        self.sends.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.sends.is_empty()
    }

    /// Wait until every send of the job has been attempted. Returns how many
    /// were delivered.
    pub async fn join(self) -> usize {
        futures::future::join_all(self.sends)
            .await
            .into_iter()
            .filter(|sent| matches!(sent, Ok(true)))
            .count()
    }
}

/// Sends the same text to one target repeatedly at a fixed cadence.
///
/// Send `i` is due at `start + i * interval`. Each send is its own deferred
/// task: sends start in index order, but a slow send does not hold back the
/// next one. Pending sends are not persisted and cannot be cancelled.
#[derive(Clone)]
pub struct BroadcastScheduler {
    transport: Arc<dyn Transport>,
}

impl BroadcastScheduler {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn schedule(&self, job: BroadcastJob) -> BroadcastHandle {
        let job_id = Uuid::new_v4();
        let start = Instant::now();
        let message: Arc<str> = Arc::from(job.message.as_str());
        let target: Arc<str> = Arc::from(job.target.as_str());

        info!(
            "Broadcast {}: {} message(s) to {} every {:?}",
            job_id, job.repeat_count, job.target, job.interval
        );

        let mut sends = Vec::new();
        for index in 0..job.repeat_count {
            let Some(due) = job
                .interval
                .checked_mul(index)
                .and_then(|offset| start.checked_add(offset))
            else {
                warn!(
                    "Broadcast {}: send {} is too far in the future, dropping the rest",
                    job_id, index
                );
                break;
            };

            let transport = Arc::clone(&self.transport);
            let message = Arc::clone(&message);
            let target = Arc::clone(&target);
            sends.push(tokio::spawn(async move {
                sleep_until(due).await;
                match transport
                    .send(&target, OutboundPayload::text(message.to_string()))
                    .await
                {
                    Ok(()) => {
                        debug!("Broadcast {}: sent {} to {}", job_id, index, target);
                        true
                    }
                    Err(e) => {
                        error!(
                            "Broadcast {}: send {} to {} failed: {:#}",
                            job_id, index, target, e
                        );
                        false
                    }
                }
            }));
        }

        BroadcastHandle { job_id, sends }
    }
}
