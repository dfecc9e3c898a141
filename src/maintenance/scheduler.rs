//! Daily maintenance — paused-contact sweep, thread resolution, reply detection.
//!
//! The gated entry point runs at most once per calendar day in the
//! configured offset, tracked by a `last_run_date` marker in the
//! `maintenance` KV namespace. The marker is written only after every task
//! has run; individual contact failures do not prevent it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::ContactCache;
use crate::clock::{Clock, business_date};
use crate::config::SchedulerConfig;
use crate::error::EngineError;
use crate::replies::{ReplyDetector, ReplyScanReport};
use crate::sequence::{SequenceService, SweepReport};
use crate::store::KeyValueStore;
use crate::threads::{ThreadPassReport, ThreadResolver};

pub const MAINTENANCE_NAMESPACE: &str = "maintenance";
pub const LAST_RUN_KEY: &str = "last_run_date";
pub const THREAD_CURSOR_KEY: &str = "thread_cursor";
pub const REPLY_CURSOR_KEY: &str = "reply_cursor";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Summary of one maintenance run.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub run_id: Uuid,
    /// Calendar day of the run in the configured offset.
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub sweep: SweepReport,
    pub threads: ThreadPassReport,
    pub replies: ReplyScanReport,
}

impl MaintenanceReport {
    pub fn errors(&self) -> usize {
        self.sweep.errors + self.threads.errors + self.replies.errors
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MaintenanceOutcome {
    Ran(MaintenanceReport),
    /// Already ran on `date`.
    Skipped { date: NaiveDate },
}

pub struct MaintenanceScheduler {
    sequences: Arc<SequenceService>,
    resolver: Arc<ThreadResolver>,
    detector: ReplyDetector,
    cache: Arc<ContactCache>,
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    offset: FixedOffset,
}

impl MaintenanceScheduler {
    pub fn new(
        sequences: Arc<SequenceService>,
        resolver: Arc<ThreadResolver>,
        cache: Arc<ContactCache>,
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            sequences,
            detector: ReplyDetector::new(Arc::clone(&resolver)),
            resolver,
            cache,
            kv,
            clock,
            batch_size: config.batch_size.max(1),
            offset: config.utc_offset,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Today's calendar day in the configured offset.
    pub fn today(&self) -> NaiveDate {
        business_date(self.clock.now(), self.offset)
    }

    /// The day maintenance last completed through the gated entry point.
    pub async fn last_run_date(&self) -> Result<Option<NaiveDate>, EngineError> {
        let raw = self.kv.get(MAINTENANCE_NAMESPACE, LAST_RUN_KEY).await?;
        Ok(raw.and_then(|s| match NaiveDate::parse_from_str(&s, DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(value = %s, error = %e, "Ignoring unparseable last-run marker");
                None
            }
        }))
    }

    /// Run maintenance unless it already ran today.
    pub async fn run_maintenance_if_not_run_today(
        &self,
    ) -> Result<MaintenanceOutcome, EngineError> {
        let today = self.today();
        if self.last_run_date().await? == Some(today) {
            debug!(date = %today, "Maintenance already ran today");
            return Ok(MaintenanceOutcome::Skipped { date: today });
        }

        let report = self.run_maintenance().await?;
        self.kv
            .set(
                MAINTENANCE_NAMESPACE,
                LAST_RUN_KEY,
                &report.date.format(DATE_FORMAT).to_string(),
            )
            .await?;
        Ok(MaintenanceOutcome::Ran(report))
    }

    /// Run every maintenance task now. Does not read or write the daily marker.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, EngineError> {
        let store = Arc::clone(self.sequences.store()?);
        let started_at = self.clock.now();
        let run_id = Uuid::new_v4();
        let date = business_date(started_at, self.offset);
        info!(run_id = %run_id, date = %date, "Maintenance run starting");

        let mut contacts = store.read_all().await?;

        let (sweep, reactivated) = self.sequences.reactivate_paused(&contacts).await?;
        for updated in reactivated {
            if let Some(slot) = contacts.iter_mut().find(|c| c.position == updated.position) {
                *slot = updated;
            }
        }

        let cursor = self.load_cursor(THREAD_CURSOR_KEY).await;
        let threads = self
            .resolver
            .resolve_pending(store.as_ref(), &mut contacts, cursor.as_deref(), self.batch_size)
            .await;
        self.save_cursor(THREAD_CURSOR_KEY, threads.next_cursor.as_deref())
            .await;

        let cursor = self.load_cursor(REPLY_CURSOR_KEY).await;
        let replies = self
            .detector
            .scan(store.as_ref(), &mut contacts, cursor.as_deref(), self.batch_size)
            .await;
        self.save_cursor(REPLY_CURSOR_KEY, replies.next_cursor.as_deref())
            .await;

        let touched: BTreeSet<&str> = threads
            .touched
            .iter()
            .chain(replies.touched.iter())
            .map(String::as_str)
            .collect();
        for email in touched {
            if let Err(e) = self.cache.remove(email).await {
                warn!(email = %email, error = %e, "Failed to invalidate cache entry");
            }
        }

        let report = MaintenanceReport {
            run_id,
            date,
            started_at,
            sweep,
            threads,
            replies,
        };
        info!(
            run_id = %run_id,
            reactivated = report.sweep.reactivated,
            threads_found = report.threads.found,
            replies_found = report.replies.replies_found,
            errors = report.errors(),
            "Maintenance run complete"
        );
        Ok(report)
    }

    async fn load_cursor(&self, key: &str) -> Option<String> {
        match self.kv.get(MAINTENANCE_NAMESPACE, key).await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(key, error = %e, "Failed to read batch cursor, starting from the beginning");
                None
            }
        }
    }

    async fn save_cursor(&self, key: &str, cursor: Option<&str>) {
        let result = match cursor {
            Some(value) => self.kv.set(MAINTENANCE_NAMESPACE, key, value).await,
            None => self.kv.delete(MAINTENANCE_NAMESPACE, key).await,
        };
        if let Err(e) = result {
            warn!(key, error = %e, "Failed to persist batch cursor");
        }
    }
}
