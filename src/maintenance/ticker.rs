//! Background ticker that fires the gated maintenance run on a cron schedule.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ConfigError;

use super::scheduler::{MaintenanceOutcome, MaintenanceScheduler};

/// Parse a seconds-resolution cron expression, e.g. `0 0 6 * * *`.
pub fn parse_schedule(expr: &str) -> Result<Schedule, ConfigError> {
    Schedule::from_str(expr).map_err(|e| ConfigError::InvalidValue {
        key: "OUTREACH_MAINTENANCE_CRON".to_string(),
        message: format!("invalid cron '{expr}': {e}"),
    })
}

/// The first fire strictly after `now`, evaluated in `offset` local time.
pub fn next_fire(
    schedule: &Schedule,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    schedule
        .after(&now.with_timezone(&offset))
        .next()
        .map(|at| at.with_timezone(&Utc))
}

/// Spawn the maintenance ticker.
///
/// Wakes every `tick`, and once the scheduler's clock passes the next cron
/// fire, calls `run_maintenance_if_not_run_today`. A failed run is retried
/// on every tick until it succeeds. Returns a `JoinHandle`
/// and a shutdown flag. Set the flag to stop the loop.
pub fn spawn_maintenance_ticker(
    scheduler: Arc<MaintenanceScheduler>,
    schedule: Schedule,
    offset: FixedOffset,
    tick: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        let mut next = next_fire(&schedule, scheduler.clock().now(), offset);
        info!(next_fire = ?next, "Maintenance ticker started");

        let mut ticker = tokio::time::interval(tick);
        loop {
            ticker.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Maintenance ticker shutting down");
                return;
            }

            let now = scheduler.clock().now();
            let Some(due) = next else {
                warn!("Maintenance schedule has no upcoming fire times, stopping ticker");
                return;
            };
            if now < due {
                continue;
            }

            match scheduler.run_maintenance_if_not_run_today().await {
                Ok(MaintenanceOutcome::Ran(report)) => {
                    info!(run_id = %report.run_id, errors = report.errors(), "Scheduled maintenance ran");
                }
                Ok(MaintenanceOutcome::Skipped { date }) => {
                    debug!(date = %date, "Scheduled maintenance skipped");
                }
                Err(e) => {
                    // The fire stays due, so the next tick retries.
                    error!(error = %e, "Scheduled maintenance failed");
                    continue;
                }
            }
            next = next_fire(&schedule, now, offset);
        }
    });

    (handle, shutdown_flag)
}
