use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;

use outreach_engine::api::api_routes;
use outreach_engine::clock::{Clock, SystemClock};
use outreach_engine::config::EngineConfig;
use outreach_engine::mail::{EmlDirectoryMailbox, InMemoryMailbox, MailSearch};
use outreach_engine::maintenance::{parse_schedule, spawn_maintenance_ticker};
use outreach_engine::outreach::{Outreach, OutreachDeps};
use outreach_engine::sequence::SequenceCatalog;
use outreach_engine::store::{ContactStore, KeyValueStore, LibSqlBackend, MemoryKv};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = EngineConfig::from_env().context("Failed to load configuration")?;

    eprintln!("Outreach engine v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", config.api_port);
    eprintln!("   Maintenance cron: {}", config.scheduler.schedule);

    // ── Store ────────────────────────────────────────────────────────────
    let (store, kv): (Option<Arc<dyn ContactStore>>, Arc<dyn KeyValueStore>) =
        match &config.db_path {
            Some(path) => {
                let db = Arc::new(
                    LibSqlBackend::new_local(path)
                        .await
                        .with_context(|| format!("Failed to open database at {}", path.display()))?,
                );
                tracing::info!(path = %path.display(), "Contact store connected");
                (Some(db.clone() as Arc<dyn ContactStore>), db as Arc<dyn KeyValueStore>)
            }
            None => {
                tracing::warn!("OUTREACH_DB_PATH not set, running without a contact store");
                (None, Arc::new(MemoryKv::new()))
            }
        };

    // ── Sequences ────────────────────────────────────────────────────────
    let catalog = Arc::new(
        SequenceCatalog::load(&config.sequences_path).with_context(|| {
            format!(
                "Failed to load sequences from {}",
                config.sequences_path.display()
            )
        })?,
    );
    tracing::info!(count = catalog.len(), "Sequence catalog loaded");

    // ── Mailbox ──────────────────────────────────────────────────────────
    let mail: Arc<dyn MailSearch> = match &config.mailbox_dir {
        Some(dir) => Arc::new(
            EmlDirectoryMailbox::load(dir, &config.self_address)
                .with_context(|| format!("Failed to load mailbox from {}", dir.display()))?,
        ),
        None => {
            tracing::warn!("OUTREACH_MAILBOX_DIR not set, mail search will find nothing");
            Arc::new(InMemoryMailbox::new(&config.self_address))
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let outreach = Arc::new(Outreach::new(
        &config,
        OutreachDeps {
            store,
            kv,
            mail,
            clock,
            catalog,
        },
    ));
    outreach.warm_cache().await;

    // ── Maintenance ticker ───────────────────────────────────────────────
    let schedule = parse_schedule(&config.scheduler.schedule)?;
    let (_ticker_handle, ticker_shutdown) = spawn_maintenance_ticker(
        Arc::clone(&outreach.scheduler),
        schedule,
        config.scheduler.utc_offset,
        config.scheduler.tick_interval,
    );

    // ── HTTP API ─────────────────────────────────────────────────────────
    let app = api_routes(Arc::clone(&outreach)).layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.api_port))
        .await
        .with_context(|| format!("Failed to bind API port {}", config.api_port))?;
    tracing::info!(port = config.api_port, "API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await?;

    ticker_shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    Ok(())
}
