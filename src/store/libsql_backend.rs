//! libSQL backend — async `ContactStore` and `KeyValueStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::contacts::{
    Contact, ContactField, ContactPatch, ContactStatus, NewContact, Priority, RowPosition,
    normalize_email,
};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{ContactStore, KeyValueStore};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_contacts(
        &self,
        sql: &str,
        params: Params,
        context: &str,
    ) -> Result<Vec<Contact>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{context}: {e}")))?;

        let mut contacts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_contact(&row) {
                Ok(contact) => contacts.push(contact),
                Err(e) => {
                    tracing::warn!("Skipping contact row: {e}");
                }
            }
        }
        Ok(contacts)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_datetime(s))
}

fn opt_datetime(dt: Option<DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(dt.to_rfc3339()),
        None => libsql::Value::Null,
    }
}

fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn field_value(field: &ContactField) -> libsql::Value {
    match field {
        ContactField::CurrentStep(v) => libsql::Value::Integer(i64::from(*v)),
        ContactField::Status(v) => libsql::Value::Text(v.as_str().to_string()),
        ContactField::LastEmailDate(v)
        | ContactField::NextStepDate(v)
        | ContactField::ReplyDate(v) => opt_datetime(*v),
        ContactField::StepOneSubject(v) => libsql::Value::Text(v.clone()),
        ContactField::StepOneMessageId(v) | ContactField::ThreadId(v) => {
            opt_text_owned(v.clone())
        }
        ContactField::ReplyReceived(v) | ContactField::CallCompleted(v) => {
            libsql::Value::Integer(i64::from(*v))
        }
    }
}

const CONTACT_COLUMNS: &str = "id, email, name, company, title, sequence, current_step, status, last_email_date, next_step_date, priority, step_one_subject, step_one_message_id, thread_id, reply_received, reply_date, call_completed";

/// Map a libsql Row to a Contact. Column order matches `CONTACT_COLUMNS`.
fn row_to_contact(row: &libsql::Row) -> Result<Contact, libsql::Error> {
    let status_str: String = row.get(7)?;
    let priority_str: String = row.get::<String>(10).unwrap_or_default();
    let last_email: Option<String> = row.get(8).ok();
    let next_step: Option<String> = row.get(9).ok();
    let reply_date: Option<String> = row.get(15).ok();

    Ok(Contact {
        position: RowPosition(row.get(0)?),
        email: row.get(1)?,
        name: row.get::<String>(2).unwrap_or_default(),
        company: row.get::<String>(3).unwrap_or_default(),
        title: row.get::<String>(4).unwrap_or_default(),
        sequence: row.get(5)?,
        current_step: u32::try_from(row.get::<i64>(6)?).unwrap_or(1).max(1),
        status: status_str.parse().unwrap_or(ContactStatus::Active),
        last_email_date: parse_optional_datetime(&last_email),
        next_step_date: parse_optional_datetime(&next_step),
        priority: priority_str.parse().unwrap_or(Priority::Medium),
        step_one_subject: row.get::<String>(11).unwrap_or_default(),
        step_one_message_id: row.get(12).ok(),
        thread_id: row.get(13).ok(),
        reply_received: row.get::<i64>(14).unwrap_or(0) != 0,
        reply_date: parse_optional_datetime(&reply_date),
        call_completed: row.get::<i64>(16).unwrap_or(0) != 0,
    })
}

// ── ContactStore ────────────────────────────────────────────────────

#[async_trait]
impl ContactStore for LibSqlBackend {
    async fn read_all(&self) -> Result<Vec<Contact>, DatabaseError> {
        self.query_contacts(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY id ASC"),
            Params::None,
            "read_all",
        )
        .await
    }

    async fn read_one(&self, position: RowPosition) -> Result<Option<Contact>, DatabaseError> {
        let mut contacts = self
            .query_contacts(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                Params::Positional(vec![libsql::Value::Integer(position.0)]),
                "read_one",
            )
            .await?;
        Ok(contacts.pop())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Contact>, DatabaseError> {
        let mut contacts = self
            .query_contacts(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE email = ?1"),
                Params::Positional(vec![libsql::Value::Text(normalize_email(email))]),
                "find_by_email",
            )
            .await?;
        Ok(contacts.pop())
    }

    async fn read_recent(&self, limit: usize) -> Result<Vec<Contact>, DatabaseError> {
        self.query_contacts(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY id DESC LIMIT ?1"),
            Params::Positional(vec![libsql::Value::Integer(limit as i64)]),
            "read_recent",
        )
        .await
    }

    async fn write_fields(
        &self,
        position: RowPosition,
        patch: &ContactPatch,
    ) -> Result<(), DatabaseError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut assignments = Vec::with_capacity(patch.len() + 1);
        let mut values = Vec::with_capacity(patch.len() + 2);
        for (i, field) in patch.fields().iter().enumerate() {
            assignments.push(format!("{} = ?{}", field.name(), i + 1));
            values.push(field_value(field));
        }
        let n = values.len();
        assignments.push(format!("updated_at = ?{}", n + 1));
        values.push(libsql::Value::Text(Utc::now().to_rfc3339()));
        values.push(libsql::Value::Integer(position.0));

        let sql = format!(
            "UPDATE contacts SET {} WHERE id = ?{}",
            assignments.join(", "),
            n + 2
        );

        let affected = self
            .conn()
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("write_fields: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "contact".into(),
                id: position.to_string(),
            });
        }

        debug!(position = %position, fields = ?patch.field_names(), "Contact fields written");
        Ok(())
    }

    async fn append(&self, contact: &NewContact) -> Result<RowPosition, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO contacts (email, name, company, title, sequence, priority, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) RETURNING id",
                params![
                    normalize_email(&contact.email),
                    contact.name.clone(),
                    contact.company.clone(),
                    contact.title.clone(),
                    contact.sequence.clone(),
                    contact.priority.as_str(),
                    now.clone(),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("append row parse: {e}")))?;
                debug!(id, email = %contact.email, "Contact appended");
                Ok(RowPosition(id))
            }
            Ok(None) => Err(DatabaseError::Query("append: no id returned".into())),
            Err(e) => Err(DatabaseError::Query(format!("append: {e}"))),
        }
    }
}

// ── KeyValueStore ───────────────────────────────────────────────────

#[async_trait]
impl KeyValueStore for LibSqlBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("kv get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| DatabaseError::Query(format!("kv get row parse: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("kv get: {e}"))),
        }
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO kv (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![namespace, key, value, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("kv set: {e}")))?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM kv WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("kv delete: {e}")))?;
        Ok(())
    }
}
