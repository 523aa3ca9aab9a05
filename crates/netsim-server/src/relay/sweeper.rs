use super::RelayHub;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Periodically reap rooms and seat reservations nobody ever connected to
pub fn spawn_sweeper(hub: Arc<RelayHub>, every: Duration, idle_timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let report = hub.sweep(idle_timeout).await;
            if report.dropped_seats > 0 || !report.destroyed_rooms.is_empty() {
                tracing::info!(
                    "Sweeper dropped {} stale seat(s) and {} idle room(s)",
                    report.dropped_seats,
                    report.destroyed_rooms.len()
                );
            }
        }
    })
}
