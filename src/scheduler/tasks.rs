use tracing::info;

use crate::media::MediaStore;
use crate::scheduler::Scheduler;

/// Hourly, on the hour
const MEDIA_SWEEP_CRON: &str = "0 0 * * * *";

/// Register the bot's recurring housekeeping jobs
pub async fn register_builtin_tasks(scheduler: &Scheduler, media: MediaStore) -> anyhow::Result<()> {
    scheduler
        .add_cron_job(MEDIA_SWEEP_CRON, "media-sweep", move || {
            let media = media.clone();
            Box::pin(async move { sweep_media(&media).await })
        })
        .await?;

    Ok(())
}

async fn sweep_media(media: &MediaStore) -> anyhow::Result<()> {
    let removed = media.sweep_orphans().await?;
    let senders = media.count().await?;
    info!(
        "Media sweep: removed {} orphaned file(s), {} sender(s) cached",
        removed, senders
    );
    Ok(())
}
