//! Integration tests for the REST API.
//!
//! Each test spins up an Axum server on a random port backed by an
//! in-memory libSQL store, a fixed clock and an in-memory mailbox, then
//! exercises the HTTP contract.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use outreach_engine::api::api_routes;
use outreach_engine::clock::FixedClock;
use outreach_engine::config::{CacheConfig, EngineConfig, SchedulerConfig};
use outreach_engine::contacts::{ContactField, ContactPatch, ContactStatus};
use outreach_engine::mail::{InMemoryMailbox, MailMessage};
use outreach_engine::outreach::{Outreach, OutreachDeps};
use outreach_engine::sequence::SequenceCatalog;
use outreach_engine::store::{ContactStore, LibSqlBackend, MemoryKv};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const ME: &str = "me@example.com";

struct TestServer {
    base: String,
    store: Arc<LibSqlBackend>,
    mailbox: Arc<InMemoryMailbox>,
    clock: Arc<FixedClock>,
}

fn config() -> EngineConfig {
    EngineConfig {
        db_path: None,
        sequences_path: "unused.json".into(),
        mailbox_dir: None,
        self_address: ME.into(),
        user_id: "tester".into(),
        api_port: 0,
        scheduler: SchedulerConfig::default(),
        cache: CacheConfig::default(),
    }
}

fn catalog() -> Arc<SequenceCatalog> {
    Arc::new(
        SequenceCatalog::from_json(
            r#"[{"name": "default", "steps": [
                {"subject": "Quick question", "delay_days": 3},
                {"delay_days": 4},
                {"delay_days": 4}
            ]}]"#,
        )
        .unwrap(),
    )
}

/// Start an Axum server on a random port.
async fn start_server(with_store: bool) -> TestServer {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap(),
    ));
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let mailbox = Arc::new(InMemoryMailbox::new(ME));

    let outreach = Arc::new(Outreach::new(
        &config(),
        OutreachDeps {
            store: with_store.then(|| store.clone() as Arc<dyn ContactStore>),
            kv: Arc::new(MemoryKv::new()),
            mail: mailbox.clone(),
            clock: clock.clone(),
            catalog: catalog(),
        },
    ));
    let app = api_routes(outreach);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        store,
        mailbox,
        clock,
    }
}

async fn add_contact(server: &TestServer, email: &str) -> Value {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/contacts", server.base))
        .json(&json!({"email": email, "name": "Dana", "sequence": "default"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

async fn post(server: &TestServer, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}{path}", server.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get(server: &TestServer, path: &str) -> (u16, Value) {
    let resp = reqwest::get(format!("{}{path}", server.base)).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

// ── Health ───────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_store_connection() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(true).await;
        let (status, json) = get(&server, "/health").await;
        assert_eq!(status, 200);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["store_connected"], true);
    })
    .await
    .expect("test timed out");
}

// ── Contacts ─────────────────────────────────────────────────────────

#[tokio::test]
async fn advance_then_lookup_reflects_new_step() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(true).await;
        let created = add_contact(&server, "Dana@Initech.com").await;
        assert_eq!(created["email"], "dana@initech.com");
        assert_eq!(created["current_step"], 1);

        // Warm the cache with the step-1 view.
        let (status, before) = get(&server, "/api/contacts/dana@initech.com").await;
        assert_eq!(status, 200);
        assert_eq!(before["is_ready"], true);

        let (status, advanced) = post(
            &server,
            "/api/contacts/dana@initech.com/advance",
            json!({"subject": "Quick question"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(advanced["current_step"], 2);
        assert_eq!(advanced["status"], "active");
        assert_eq!(advanced["step_one_subject"], "Quick question");

        // The cache entry was invalidated, so the lookup sees step 2.
        let (_, after) = get(&server, "/api/contacts/dana@initech.com").await;
        assert_eq!(after["current_step"], 2);
        assert_eq!(after["is_ready"], false);

        server
            .clock
            .set(Utc.with_ymd_and_hms(2024, 1, 13, 0, 30, 0).unwrap());
        let (_, due) = get(&server, "/api/contacts/dana@initech.com").await;
        assert_eq!(due["is_ready"], true);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn advancing_paused_contact_conflicts() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(true).await;
        add_contact(&server, "paused@example.com").await;

        let contact = server
            .store
            .find_by_email("paused@example.com")
            .await
            .unwrap()
            .unwrap();
        let patch = ContactPatch::new().set(ContactField::Status(ContactStatus::Paused));
        server
            .store
            .write_fields(contact.position, &patch)
            .await
            .unwrap();

        let (status, json) = post(&server, "/api/contacts/paused@example.com/advance", json!({})).await;
        assert_eq!(status, 409);
        assert!(json["error"].as_str().unwrap().contains("paused"));

        let unchanged = server.store.read_one(contact.position).await.unwrap().unwrap();
        assert_eq!(unchanged.current_step, 1);
        assert!(unchanged.last_email_date.is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_contact_is_not_found() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(true).await;
        let (status, _) = get(&server, "/api/contacts/nobody@example.com").await;
        assert_eq!(status, 404);

        let (status, _) = post(&server, "/api/contacts/nobody@example.com/advance", json!({})).await;
        assert_eq!(status, 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn call_flag_is_set_and_cleared_on_advance() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(true).await;
        add_contact(&server, "dana@initech.com").await;

        let (status, json) = post(&server, "/api/contacts/dana@initech.com/call", json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(json["call_completed"], true);

        let (_, json) = post(&server, "/api/contacts/dana@initech.com/advance", json!({})).await;
        assert_eq!(json["call_completed"], false);
    })
    .await
    .expect("test timed out");
}

// ── Maintenance ──────────────────────────────────────────────────────

#[tokio::test]
async fn daily_maintenance_runs_once() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(true).await;
        add_contact(&server, "lead@example.com").await;
        post(
            &server,
            "/api/contacts/lead@example.com/advance",
            json!({"subject": "Quick question"}),
        )
        .await;

        server
            .mailbox
            .add(MailMessage {
                id: "m1".into(),
                thread_id: "t1".into(),
                from: ME.into(),
                to: vec!["lead@example.com".into()],
                subject: "Quick question".into(),
                date: Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap(),
                is_draft: false,
            })
            .await;

        let (status, first) = post(&server, "/api/maintenance/daily", json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(first["outcome"], "ran");
        assert_eq!(first["threads"]["found"], 1);

        let (_, second) = post(&server, "/api/maintenance/daily", json!({})).await;
        assert_eq!(second["outcome"], "skipped");
        assert_eq!(second["date"], "2024-01-10");

        // The ungated run always executes.
        let (status, forced) = post(&server, "/api/maintenance/run", json!({})).await;
        assert_eq!(status, 200);
        assert!(forced["run_id"].is_string());

        let contact = server
            .store
            .find_by_email("lead@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.thread_id.as_deref(), Some("t1"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_store_is_service_unavailable() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false).await;

        let (status, _) = get(&server, "/api/contacts/dana@initech.com").await;
        assert_eq!(status, 503);

        let (status, json) = post(&server, "/api/maintenance/daily", json!({})).await;
        assert_eq!(status, 503);
        assert!(json["error"].as_str().unwrap().contains("OUTREACH_DB_PATH"));

        let (_, health) = get(&server, "/health").await;
        assert_eq!(health["store_connected"], false);
    })
    .await
    .expect("test timed out");
}
