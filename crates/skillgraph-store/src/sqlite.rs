//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for SkillGraph. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use skillgraph_core::{
    Action, CandidateId, CandidateSkillGraph, Credential, CredentialId, Issuer, IssuerId, Role,
    Skill, TransactionLog, VerificationLog, VerificationStatus, WorkflowId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn to_doc<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn from_doc<T: DeserializeOwned>(doc: &str) -> Result<T> {
    Ok(serde_json::from_str(doc)?)
}

/// Collect the `doc` column of every row and decode it.
fn query_docs<T: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let docs = stmt
        .query_map(params, |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    docs.iter().map(|d| from_doc(d)).collect()
}

fn query_doc<T: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<T>> {
    let doc: Option<String> = conn.query_row(sql, params, |row| row.get(0)).optional()?;
    doc.as_deref().map(from_doc).transpose()
}

fn write_credential(conn: &Connection, credential: &Credential) -> Result<()> {
    conn.execute(
        "UPDATE credentials SET status = ?2, expires_at = ?3, doc = ?4 WHERE credential_id = ?1",
        params![
            credential.id.as_str(),
            credential.verification_status.as_str(),
            credential.expires_at.map(|d| d.timestamp_millis()),
            to_doc(credential)?,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_credential(&self, credential: &Credential) -> Result<InsertResult> {
        let credential = credential.clone();
        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO credentials
                    (credential_id, candidate_id, status, issued_at, expires_at, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    credential.id.as_str(),
                    credential.candidate_id.as_str(),
                    credential.verification_status.as_str(),
                    credential.issued_at.timestamp_millis(),
                    credential.expires_at.map(|d| d.timestamp_millis()),
                    to_doc(&credential)?,
                ],
            )?;
            Ok(if inserted == 0 {
                InsertResult::AlreadyExists
            } else {
                InsertResult::Inserted
            })
        })
        .await
    }

    async fn get_credential(&self, id: &CredentialId) -> Result<Option<Credential>> {
        let id = id.clone();
        self.run(move |conn| {
            query_doc(
                conn,
                "SELECT doc FROM credentials WHERE credential_id = ?1",
                params![id.as_str()],
            )
        })
        .await
    }

    async fn delete_credential(&self, id: &CredentialId) -> Result<bool> {
        let id = id.clone();
        self.run(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM credentials WHERE credential_id = ?1",
                params![id.as_str()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn credentials_for_candidate(
        &self,
        candidate_id: &CandidateId,
        statuses: &[VerificationStatus],
    ) -> Result<Vec<Credential>> {
        let candidate_id = candidate_id.clone();
        let statuses: Vec<&'static str> = statuses.iter().map(|s| s.as_str()).collect();
        self.run(move |conn| {
            let found: Vec<Credential> = query_docs(
                conn,
                "SELECT doc FROM credentials WHERE candidate_id = ?1
                 ORDER BY issued_at DESC, credential_id ASC",
                params![candidate_id.as_str()],
            )?;
            Ok(found
                .into_iter()
                .filter(|c| statuses.contains(&c.verification_status.as_str()))
                .collect())
        })
        .await
    }

    async fn set_credential_status(
        &self,
        id: &CredentialId,
        status: VerificationStatus,
        verified_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let id = id.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<Credential> = query_doc(
                &tx,
                "SELECT doc FROM credentials WHERE credential_id = ?1",
                params![id.as_str()],
            )?;
            let Some(mut credential) = existing else {
                return Ok(false);
            };
            credential.verification_status = status;
            if verified_at.is_some() {
                credential.verified_at = verified_at;
            }
            write_credential(&tx, &credential)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn mark_pending_verified(
        &self,
        candidate_id: &CandidateId,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let candidate_id = candidate_id.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let pending: Vec<Credential> = query_docs(
                &tx,
                "SELECT doc FROM credentials WHERE candidate_id = ?1 AND status = ?2",
                params![candidate_id.as_str(), VerificationStatus::Pending.as_str()],
            )?;
            for mut credential in pending.iter().cloned() {
                credential.verification_status = VerificationStatus::Verified;
                credential.verified_at = Some(at);
                write_credential(&tx, &credential)?;
            }
            tx.commit()?;
            Ok(pending.len())
        })
        .await
    }

    async fn expired_credentials(&self, now: DateTime<Utc>) -> Result<Vec<Credential>> {
        self.run(move |conn| {
            query_docs(
                conn,
                "SELECT doc FROM credentials
                 WHERE status = ?1 AND expires_at IS NOT NULL AND expires_at < ?2
                 ORDER BY credential_id ASC",
                params![
                    VerificationStatus::Verified.as_str(),
                    now.timestamp_millis()
                ],
            )
        })
        .await
    }

    async fn find_or_create_skill(&self, skill: &Skill) -> Result<Skill> {
        let skill = skill.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO skills (skill_id, normalized_key, doc) VALUES (?1, ?2, ?3)
                 ON CONFLICT(normalized_key) DO NOTHING",
                params![skill.id.as_str(), skill.normalized_key, to_doc(&skill)?],
            )?;
            query_doc(
                conn,
                "SELECT doc FROM skills WHERE normalized_key = ?1",
                params![skill.normalized_key],
            )?
            .ok_or_else(|| StoreError::NotFound(format!("skill {}", skill.normalized_key)))
        })
        .await
    }

    async fn get_skill_by_key(&self, normalized_key: &str) -> Result<Option<Skill>> {
        let key = normalized_key.to_string();
        self.run(move |conn| {
            query_doc(
                conn,
                "SELECT doc FROM skills WHERE normalized_key = ?1",
                params![key],
            )
        })
        .await
    }

    async fn upsert_skill_graph(&self, graph: &CandidateSkillGraph) -> Result<()> {
        let graph = graph.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO skill_graphs (candidate_id, updated_at, doc) VALUES (?1, ?2, ?3)
                 ON CONFLICT(candidate_id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    doc = excluded.doc",
                params![
                    graph.candidate_id.as_str(),
                    graph.last_updated.timestamp_millis(),
                    to_doc(&graph)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_skill_graph(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<Option<CandidateSkillGraph>> {
        let candidate_id = candidate_id.clone();
        self.run(move |conn| {
            query_doc(
                conn,
                "SELECT doc FROM skill_graphs WHERE candidate_id = ?1",
                params![candidate_id.as_str()],
            )
        })
        .await
    }

    async fn list_skill_graphs(&self) -> Result<Vec<CandidateSkillGraph>> {
        self.run(|conn| {
            query_docs(
                conn,
                "SELECT doc FROM skill_graphs ORDER BY candidate_id ASC",
                [],
            )
        })
        .await
    }

    async fn upsert_issuer(&self, issuer: &Issuer) -> Result<()> {
        let issuer = issuer.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO issuers (issuer_id, status, doc) VALUES (?1, ?2, ?3)
                 ON CONFLICT(issuer_id) DO UPDATE SET status = excluded.status, doc = excluded.doc",
                params![
                    issuer.id.as_str(),
                    issuer.status.as_str(),
                    to_doc(&issuer)?
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_issuer(&self, id: &IssuerId) -> Result<Option<Issuer>> {
        let id = id.clone();
        self.run(move |conn| {
            query_doc(
                conn,
                "SELECT doc FROM issuers WHERE issuer_id = ?1",
                params![id.as_str()],
            )
        })
        .await
    }

    async fn append_transaction_log(&self, log: &TransactionLog) -> Result<()> {
        let log = log.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO transaction_logs
                    (transaction_id, message_id, action, role, status, timestamp, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    log.transaction_id,
                    log.message_id,
                    log.action.as_str(),
                    log.role.as_str(),
                    log.status.as_str(),
                    log.timestamp.timestamp_millis(),
                    to_doc(&log)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest_transaction_log(
        &self,
        transaction_id: &str,
        action: Action,
        role: Role,
    ) -> Result<Option<TransactionLog>> {
        let transaction_id = transaction_id.to_string();
        self.run(move |conn| {
            query_doc(
                conn,
                "SELECT doc FROM transaction_logs
                 WHERE transaction_id = ?1 AND action = ?2 AND role = ?3
                 ORDER BY id DESC LIMIT 1",
                params![transaction_id, action.as_str(), role.as_str()],
            )
        })
        .await
    }

    async fn transaction_logs(&self, transaction_id: &str) -> Result<Vec<TransactionLog>> {
        let transaction_id = transaction_id.to_string();
        self.run(move |conn| {
            query_docs(
                conn,
                "SELECT doc FROM transaction_logs WHERE transaction_id = ?1 ORDER BY id ASC",
                params![transaction_id],
            )
        })
        .await
    }

    async fn save_verification_log(&self, log: &VerificationLog) -> Result<()> {
        let log = log.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO verification_logs (workflow_id, candidate_id, status, doc)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(workflow_id) DO UPDATE SET status = excluded.status, doc = excluded.doc",
                params![
                    log.workflow_id.as_str(),
                    log.candidate_id.as_str(),
                    log.status().as_str(),
                    to_doc(&log)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_verification_log(&self, id: &WorkflowId) -> Result<Option<VerificationLog>> {
        let id = id.clone();
        self.run(move |conn| {
            query_doc(
                conn,
                "SELECT doc FROM verification_logs WHERE workflow_id = ?1",
                params![id.as_str()],
            )
        })
        .await
    }
}
