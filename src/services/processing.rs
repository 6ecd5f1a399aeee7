//! Table-by-table data discovery and the type-specific processing actions.
//!
//! Deletion is best-effort: each table's outcome is recorded independently
//! and a mid-sequence failure leaves partial deletion surfaced in the
//! result, never retried or rolled back. The audit trail is the recovery
//! mechanism.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{AuditAction, DsrRequest, DsrRequestType, DsrStatus};
use crate::database::repository::{DsrRepository, RepositoryError};
use crate::services::audit::RequestContext;
use crate::services::mailer::Mailer;

/// One entry of the fixed table registry scanned during discovery.
#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    /// Column matched (case-insensitively) against the subject's email.
    pub email_column: Option<&'static str>,
    /// Foreign-key column matched against the resolved user id.
    pub user_id_column: Option<&'static str>,
    /// Whether delete requests may erase rows from this table.
    /// `dsr_requests` and `dsr_audit_log` are retained for compliance.
    pub erasable: bool,
}

/// Discovery order. `dsr_audit_log` carries no subject columns of its own
/// (rows attach to a request id) and is reached through `dsr_requests`.
pub const TABLE_REGISTRY: &[TableSpec] = &[
    TableSpec {
        name: "users",
        email_column: Some("email"),
        user_id_column: None,
        erasable: true,
    },
    TableSpec {
        name: "consents",
        email_column: None,
        user_id_column: Some("user_id"),
        erasable: true,
    },
    TableSpec {
        name: "dsr_requests",
        email_column: Some("email"),
        user_id_column: None,
        erasable: false,
    },
    TableSpec {
        name: "policies",
        email_column: Some("policyholder_email"),
        user_id_column: Some("user_id"),
        erasable: true,
    },
    TableSpec {
        name: "claims",
        email_column: None,
        user_id_column: Some("user_id"),
        erasable: true,
    },
    TableSpec {
        name: "communications",
        email_column: Some("recipient_email"),
        user_id_column: Some("user_id"),
        erasable: true,
    },
    TableSpec {
        name: "dsr_audit_log",
        email_column: None,
        user_id_column: None,
        erasable: false,
    },
];

/// Hardcoded reverse-dependency deletion order: children before parents so
/// foreign keys are never violated.
pub const DELETION_ORDER: &[&str] = &["communications", "claims", "policies", "consents", "users"];

fn table_spec(name: &str) -> Option<&'static TableSpec> {
    TABLE_REGISTRY.iter().find(|t| t.name == name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectFilter {
    Email(String),
    UserId(Uuid),
}

#[derive(Debug, Clone)]
pub struct Subject {
    pub email: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Error)]
#[error("{table}: {message}")]
pub struct StoreError {
    pub table: String,
    pub message: String,
}

/// Data access seam for discovery and deletion, mockable in tests.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn resolve_user_id(&self, email: &str) -> Result<Option<Uuid>, StoreError>;

    async fn fetch(
        &self,
        table: &TableSpec,
        filter: &SubjectFilter,
    ) -> Result<Vec<Value>, StoreError>;

    async fn delete(&self, table: &TableSpec, filter: &SubjectFilter)
        -> Result<u64, StoreError>;
}

/// Postgres-backed store. Table and column names come from the fixed
/// registry, never from input.
pub struct PgSubjectStore {
    pool: PgPool,
}

impl PgSubjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn predicate(filter: &SubjectFilter, table: &TableSpec) -> Option<String> {
        match filter {
            SubjectFilter::Email(_) => table
                .email_column
                .map(|col| format!("LOWER(\"{col}\") = LOWER($1)")),
            SubjectFilter::UserId(_) => table.user_id_column.map(|col| format!("\"{col}\" = $1")),
        }
    }

    fn store_err(table: &TableSpec, e: impl std::fmt::Display) -> StoreError {
        StoreError {
            table: table.name.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl SubjectStore for PgSubjectStore {
    async fn resolve_user_id(&self, email: &str) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError {
                table: "users".to_string(),
                message: e.to_string(),
            })?;

        row.map(|r| r.try_get("id"))
            .transpose()
            .map_err(|e| StoreError {
                table: "users".to_string(),
                message: e.to_string(),
            })
    }

    async fn fetch(
        &self,
        table: &TableSpec,
        filter: &SubjectFilter,
    ) -> Result<Vec<Value>, StoreError> {
        let Some(predicate) = Self::predicate(filter, table) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT row_to_json(t) AS row FROM (SELECT * FROM \"{}\" WHERE {}) t",
            table.name, predicate
        );

        let query = match filter {
            SubjectFilter::Email(email) => sqlx::query(&sql).bind(email),
            SubjectFilter::UserId(id) => sqlx::query(&sql).bind(id),
        };

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::store_err(table, e))?;

        rows.iter()
            .map(|r| r.try_get::<Value, _>("row"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Self::store_err(table, e))
    }

    async fn delete(
        &self,
        table: &TableSpec,
        filter: &SubjectFilter,
    ) -> Result<u64, StoreError> {
        let Some(predicate) = Self::predicate(filter, table) else {
            return Ok(0);
        };

        let sql = format!("DELETE FROM \"{}\" WHERE {}", table.name, predicate);
        let query = match filter {
            SubjectFilter::Email(email) => sqlx::query(&sql).bind(email),
            SubjectFilter::UserId(id) => sqlx::query(&sql).bind(id),
        };

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| Self::store_err(table, e))?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDiscovery {
    pub count: u64,
    pub fields: Vec<String>,
    pub records: Vec<Value>,
}

/// Transient result of one discovery run; never cached or reused.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    pub total_records: u64,
    pub tables: BTreeMap<String, TableDiscovery>,
    /// Fixed per-record estimate, a rough UI hint rather than a real
    /// serialized size.
    pub estimated_export_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDeletion {
    pub table: String,
    pub deleted: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub download_token: String,
    pub export_file_url: String,
    pub expires_at: DateTime<Utc>,
    pub payload: BTreeMap<String, Vec<Value>>,
}

const REDACTED_MARKERS: &[&str] = &["password", "secret", "token", "hash", "api_key"];

/// Replace secret-like fields in a copied row with a marker.
pub fn redact_record(record: Value) -> Value {
    match record {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let lower = k.to_lowercase();
                    if REDACTED_MARKERS.iter().any(|m| lower.contains(m)) {
                        (k, Value::String("[REDACTED]".to_string()))
                    } else {
                        (k, v)
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

/// Next business-day deadline, skipping weekends.
pub fn add_business_days(from: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let mut current = from;
    let mut remaining = days;
    while remaining > 0 {
        current += Duration::days(1);
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            remaining -= 1;
        }
    }
    current
}

/// Discovery plus the type-specific actions, over an injected store.
pub struct DsrEngine {
    store: Arc<dyn SubjectStore>,
    per_record_estimate: u64,
    export_ttl_days: i64,
}

impl DsrEngine {
    pub fn new(store: Arc<dyn SubjectStore>, per_record_estimate: u64, export_ttl_days: i64) -> Self {
        Self {
            store,
            per_record_estimate,
            export_ttl_days,
        }
    }

    fn filter_for(table: &TableSpec, subject: &Subject) -> Option<SubjectFilter> {
        if table.email_column.is_some() {
            return Some(SubjectFilter::Email(subject.email.clone()));
        }
        match (table.user_id_column, subject.user_id) {
            (Some(_), Some(id)) => Some(SubjectFilter::UserId(id)),
            _ => None,
        }
    }

    pub async fn resolve_subject(&self, email: &str) -> Result<Subject, StoreError> {
        let user_id = self.store.resolve_user_id(email).await?;
        Ok(Subject {
            email: email.to_string(),
            user_id,
        })
    }

    /// Scan every registered table for rows belonging to the subject.
    /// Tables with zero matches are omitted from the result.
    pub async fn discover(&self, subject: &Subject) -> Result<DiscoveryResult, StoreError> {
        let mut tables = BTreeMap::new();
        let mut total_records: u64 = 0;

        for table in TABLE_REGISTRY {
            let Some(filter) = Self::filter_for(table, subject) else {
                continue;
            };

            let rows = self.store.fetch(table, &filter).await?;
            if rows.is_empty() {
                continue;
            }

            let mut fields: Vec<String> = rows
                .first()
                .and_then(|r| r.as_object())
                .map(|o| o.keys().cloned().collect())
                .unwrap_or_default();
            fields.sort();

            let records: Vec<Value> = rows.into_iter().map(redact_record).collect();
            let count = records.len() as u64;
            total_records += count;

            tables.insert(
                table.name.to_string(),
                TableDiscovery {
                    count,
                    fields,
                    records,
                },
            );
        }

        Ok(DiscoveryResult {
            total_records,
            tables,
            estimated_export_size: total_records * self.per_record_estimate,
        })
    }

    /// Bundle discovered rows into an export payload with a time-limited
    /// download token. The signed URL is a stub contract.
    pub fn export(&self, request_id: Uuid, discovery: &DiscoveryResult) -> ExportOutcome {
        let download_token = Uuid::new_v4().simple().to_string();
        ExportOutcome {
            export_file_url: format!(
                "https://exports.invalid/dsr/{request_id}/{download_token}"
            ),
            download_token,
            expires_at: Utc::now() + Duration::days(self.export_ttl_days),
            payload: discovery
                .tables
                .iter()
                .map(|(name, t)| (name.clone(), t.records.clone()))
                .collect(),
        }
    }

    /// Delete matching rows table-by-table in reverse-dependency order.
    /// No wrapping transaction: failures are captured per table and the
    /// remaining tables are still attempted.
    pub async fn delete_subject(&self, subject: &Subject) -> Vec<TableDeletion> {
        let mut outcomes = Vec::with_capacity(DELETION_ORDER.len());

        for name in DELETION_ORDER {
            let Some(table) = table_spec(name) else {
                continue;
            };
            debug_assert!(table.erasable);

            let Some(filter) = Self::filter_for(table, subject) else {
                outcomes.push(TableDeletion {
                    table: name.to_string(),
                    deleted: 0,
                    error: None,
                });
                continue;
            };

            match self.store.delete(table, &filter).await {
                Ok(deleted) => outcomes.push(TableDeletion {
                    table: name.to_string(),
                    deleted,
                    error: None,
                }),
                Err(e) => {
                    tracing::warn!(table = *name, "deletion failed: {}", e.message);
                    outcomes.push(TableDeletion {
                        table: name.to_string(),
                        deleted: 0,
                        error: Some(e.message),
                    });
                }
            }
        }

        outcomes
    }

    /// Rectification is flagged for manual review, nothing is mutated.
    pub fn rectify(&self) -> Value {
        json!({
            "manual_review_required": true,
            "estimated_completion": add_business_days(Utc::now(), 5),
        })
    }
}

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("DSR request {0} not found")]
    RequestNotFound(Uuid),

    #[error("DSR request {0} has not been verified")]
    NotVerified(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug)]
pub struct ProcessingOutcome {
    pub request: DsrRequest,
    pub discovery: DiscoveryResult,
    pub result: Value,
}

/// Full processing run for a verified request: discovery, the type-specific
/// action, status transition, audit trail, completion notice.
pub struct ProcessingService {
    repo: DsrRepository,
    engine: DsrEngine,
    mailer: Arc<Mailer>,
}

impl ProcessingService {
    pub fn new(repo: DsrRepository, engine: DsrEngine, mailer: Arc<Mailer>) -> Self {
        Self {
            repo,
            engine,
            mailer,
        }
    }

    pub async fn process(
        &self,
        request_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        let request = self
            .repo
            .find_request(request_id)
            .await?
            .ok_or(ProcessingError::RequestNotFound(request_id))?;

        match request.status {
            DsrStatus::InProgress => {}
            DsrStatus::Pending => return Err(ProcessingError::NotVerified(request_id)),
            other => {
                return Err(ProcessingError::Repository(
                    RepositoryError::InvalidTransition {
                        from: other,
                        to: DsrStatus::Completed,
                    },
                ))
            }
        }

        let subject = match self.engine.resolve_subject(&request.email).await {
            Ok(s) => s,
            Err(e) => {
                self.record_failure(&request, ctx, &e).await;
                return Err(e.into());
            }
        };

        let discovery = match self.engine.discover(&subject).await {
            Ok(d) => d,
            Err(e) => {
                self.record_failure(&request, ctx, &e).await;
                return Err(e.into());
            }
        };

        self.repo
            .append_audit(
                request.id,
                AuditAction::DiscoveryCompleted,
                None,
                Some(discovery_summary(&discovery)),
                ctx.ip(),
                ctx.ua(),
            )
            .await?;

        let (result, notes) = match request.request_type {
            DsrRequestType::Export => {
                let outcome = self.engine.export(request.id, &discovery);
                let notes = format!(
                    "export bundled {} record(s); link expires {}",
                    discovery.total_records, outcome.expires_at
                );
                (json!(outcome), notes)
            }
            DsrRequestType::Delete => {
                let deletions = self.engine.delete_subject(&subject).await;
                for deletion in &deletions {
                    self.repo
                        .append_audit(
                            request.id,
                            AuditAction::TableDeleted,
                            None,
                            Some(json!(deletion)),
                            ctx.ip(),
                            ctx.ua(),
                        )
                        .await?;
                }

                let total_deleted: u64 = deletions.iter().map(|d| d.deleted).sum();
                let partial_failure = deletions.iter().any(|d| d.error.is_some());
                let notes = if partial_failure {
                    format!(
                        "deletion completed with failures; {total_deleted} row(s) removed"
                    )
                } else {
                    format!("deleted {total_deleted} row(s) across {} table(s)", deletions.len())
                };
                (
                    json!({
                        "deletions": deletions,
                        "total_deleted": total_deleted,
                        "partial_failure": partial_failure,
                    }),
                    notes,
                )
            }
            DsrRequestType::Rectify => (
                self.engine.rectify(),
                "flagged for manual rectification review".to_string(),
            ),
        };

        let updated = self
            .repo
            .transition_with_outcome(request.id, DsrStatus::Completed, Some(&notes), None)
            .await?;

        self.repo
            .append_audit(
                request.id,
                AuditAction::ProcessingCompleted,
                None,
                Some(json!({
                    "discovery": discovery_summary(&discovery),
                    "result": result,
                })),
                ctx.ip(),
                ctx.ua(),
            )
            .await?;

        self.mailer.send_completion(&updated).await;

        Ok(ProcessingOutcome {
            request: updated,
            discovery,
            result,
        })
    }

    /// Record the failure in the audit trail; the request stays in_progress.
    async fn record_failure(&self, request: &DsrRequest, ctx: &RequestContext, e: &StoreError) {
        if let Err(audit_err) = self
            .repo
            .append_audit(
                request.id,
                AuditAction::ProcessingFailed,
                None,
                Some(json!({ "table": e.table, "error": e.message })),
                ctx.ip(),
                ctx.ua(),
            )
            .await
        {
            tracing::error!("failed to audit processing failure: {}", audit_err);
        }
    }
}

fn discovery_summary(discovery: &DiscoveryResult) -> Value {
    json!({
        "total_records": discovery.total_records,
        "estimated_export_size": discovery.estimated_export_size,
        "tables": discovery
            .tables
            .iter()
            .map(|(name, t)| (name.clone(), json!(t.count)))
            .collect::<BTreeMap<_, _>>(),
    })
}
