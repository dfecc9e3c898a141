//! Wiring — builds the engine components from config and injected collaborators.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::ContactCache;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::mail::MailSearch;
use crate::maintenance::MaintenanceScheduler;
use crate::sequence::{SequenceCatalog, SequenceEngine, SequenceService};
use crate::store::{ContactStore, KeyValueStore};
use crate::threads::ThreadResolver;

/// External collaborators the engine runs against.
///
/// Bundles the shared components to reduce argument count.
pub struct OutreachDeps {
    /// `None` when no contact store is connected.
    pub store: Option<Arc<dyn ContactStore>>,
    pub kv: Arc<dyn KeyValueStore>,
    pub mail: Arc<dyn MailSearch>,
    pub clock: Arc<dyn Clock>,
    pub catalog: Arc<SequenceCatalog>,
}

/// The assembled engine.
pub struct Outreach {
    pub store: Option<Arc<dyn ContactStore>>,
    pub cache: Arc<ContactCache>,
    pub sequences: Arc<SequenceService>,
    pub resolver: Arc<ThreadResolver>,
    pub scheduler: Arc<MaintenanceScheduler>,
    prefetch: usize,
}

impl Outreach {
    pub fn new(config: &EngineConfig, deps: OutreachDeps) -> Self {
        let engine = SequenceEngine::new(config.scheduler.utc_offset);

        let cache = Arc::new(ContactCache::new(
            Arc::clone(&deps.kv),
            &config.user_id,
            &config.cache,
            engine,
            Arc::clone(&deps.clock),
        ));
        let sequences = Arc::new(SequenceService::new(
            deps.store.clone(),
            deps.catalog,
            Arc::clone(&cache),
            engine,
            Arc::clone(&deps.clock),
        ));
        let resolver = Arc::new(ThreadResolver::new(deps.mail, &config.self_address));
        let scheduler = Arc::new(MaintenanceScheduler::new(
            Arc::clone(&sequences),
            Arc::clone(&resolver),
            Arc::clone(&cache),
            deps.kv,
            deps.clock,
            &config.scheduler,
        ));

        Self {
            store: deps.store,
            cache,
            sequences,
            resolver,
            scheduler,
            prefetch: config.cache.prefetch,
        }
    }

    /// Prefetch recent contacts into the cache. Returns how many were loaded.
    pub async fn warm_cache(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        match self.cache.prefetch(store.as_ref(), self.prefetch).await {
            Ok(count) => {
                info!(count, "Contact cache warmed");
                count
            }
            Err(e) => {
                warn!(error = %e, "Contact cache prefetch failed");
                0
            }
        }
    }
}
