//! Scheduled table work: the maintenance cycle and the backup cycle.
//!
//! Both run as their own tasks on their own intervals and stop when the
//! shutdown channel flips. The backup task writes one last store on the
//! way out, so awaiting its handle awaits the final save.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use seasky_core::liveness::LivenessRegistry;
use seasky_core::table::TrackTable;
use seasky_core::types::now_millis;

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub maintenance: Duration,
    pub backup: Duration,
    /// Render the whole table at `info` on every maintenance cycle.
    pub print_table: bool,
}

/// Cull, expire and summarize on every tick. Also re-checks source liveness.
pub fn spawn_maintenance(
    table: Arc<TrackTable>,
    registry: Arc<LivenessRegistry>,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(schedule.maintenance);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; startup already ran a pass
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    let now = now_millis();
                    let report = table.maintain(now);
                    let online = registry.check_all(now);
                    info!(
                        tracks = table.len(),
                        culled = report.points_culled,
                        dropped = report.tracks_dropped,
                        sources_online = online,
                        "{}",
                        table.summary()
                    );
                    if schedule.print_table {
                        info!("\n{}", table.render(now));
                    }
                }
            }
        }
        info!("maintenance stopped");
    })
}

/// Persist the table on every tick, and once more at shutdown.
pub fn spawn_backup(
    table: Arc<TrackTable>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => save(&table).await,
            }
        }
        save(&table).await;
        info!("backup stopped");
    })
}

/// Write the store off the async workers.
pub async fn save(table: &Arc<TrackTable>) {
    let table = Arc::clone(table);
    match tokio::task::spawn_blocking(move || table.save_to_store()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "failed to save track store"),
        Err(e) => error!(error = %e, "track store save task panicked"),
    }
}
