use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{AuditAction, DsrAuditLog, DsrRequest, DsrStatus, NewDsrRequest};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: DsrStatus, to: DsrStatus },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Manager(#[from] DatabaseError),
}

/// Lifecycle persistence seam used by the verification flow, mockable in
/// tests the same way `SubjectStore` is for processing.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn find_request(&self, id: Uuid) -> Result<Option<DsrRequest>, RepositoryError>;

    async fn transition(&self, id: Uuid, next: DsrStatus) -> Result<DsrRequest, RepositoryError>;

    async fn append_audit(
        &self,
        request_id: Uuid,
        action: AuditAction,
        old_values: Option<Value>,
        new_values: Option<Value>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<DsrAuditLog, RepositoryError>;
}

/// Persistence for DSR requests and their append-only audit trail.
#[derive(Clone)]
pub struct DsrRepository {
    pool: PgPool,
}

impl DsrRepository {
    pub async fn new() -> Result<Self, RepositoryError> {
        Ok(Self {
            pool: DatabaseManager::pool().await?,
        })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a new request with status=pending.
    pub async fn insert_request(
        &self,
        new: &NewDsrRequest,
    ) -> Result<DsrRequest, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO dsr_requests
                (id, request_type, email, full_name, status, priority, description, data_types)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.request_type.as_str())
        .bind(&new.email)
        .bind(&new.full_name)
        .bind(DsrStatus::Pending.as_str())
        .bind(new.priority.as_str())
        .bind(&new.description)
        .bind(Value::from(new.data_types.clone()))
        .fetch_one(&self.pool)
        .await?;

        map_request(&row).map_err(Into::into)
    }

    pub async fn find_request(&self, id: Uuid) -> Result<Option<DsrRequest>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM dsr_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_request).transpose().map_err(Into::into)
    }

    /// Lookup for the tracking path: id plus case-insensitive email match.
    pub async fn find_by_id_and_email(
        &self,
        id: Uuid,
        email: &str,
    ) -> Result<Option<DsrRequest>, RepositoryError> {
        let row =
            sqlx::query("SELECT * FROM dsr_requests WHERE id = $1 AND LOWER(email) = LOWER($2)")
                .bind(id)
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(map_request).transpose().map_err(Into::into)
    }

    /// Move a request to `next`, enforcing the monotonic lifecycle.
    pub async fn transition(
        &self,
        id: Uuid,
        next: DsrStatus,
    ) -> Result<DsrRequest, RepositoryError> {
        self.transition_with_outcome(id, next, None, None).await
    }

    pub async fn transition_with_outcome(
        &self,
        id: Uuid,
        next: DsrStatus,
        resolution_notes: Option<&str>,
        rejected_reason: Option<&str>,
    ) -> Result<DsrRequest, RepositoryError> {
        let current = self
            .find_request(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("DSR request {id}")))?;

        if !current.status.can_transition_to(next) {
            return Err(RepositoryError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let completed_at: Option<DateTime<Utc>> = if next == DsrStatus::Completed {
            Some(Utc::now())
        } else {
            None
        };

        let row = sqlx::query(
            r#"
            UPDATE dsr_requests
            SET status = $2,
                updated_at = NOW(),
                completed_at = COALESCE($3, completed_at),
                resolution_notes = COALESCE($4, resolution_notes),
                rejected_reason = COALESCE($5, rejected_reason)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(completed_at)
        .bind(resolution_notes)
        .bind(rejected_reason)
        .fetch_one(&self.pool)
        .await?;

        map_request(&row).map_err(Into::into)
    }

    /// Append one audit row. There is intentionally no update or delete
    /// statement for this table.
    pub async fn append_audit(
        &self,
        request_id: Uuid,
        action: AuditAction,
        old_values: Option<Value>,
        new_values: Option<Value>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<DsrAuditLog, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO dsr_audit_log
                (id, request_id, action, old_values, new_values, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request_id)
        .bind(action.as_str())
        .bind(old_values)
        .bind(new_values)
        .bind(ip_address)
        .bind(user_agent)
        .fetch_one(&self.pool)
        .await?;

        map_audit(&row).map_err(Into::into)
    }

    pub async fn audit_trail(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<DsrAuditLog>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM dsr_audit_log WHERE request_id = $1 ORDER BY created_at ASC",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_audit).collect::<Result<_, _>>().map_err(Into::into)
    }
}

#[async_trait]
impl RequestStore for DsrRepository {
    async fn find_request(&self, id: Uuid) -> Result<Option<DsrRequest>, RepositoryError> {
        DsrRepository::find_request(self, id).await
    }

    async fn transition(&self, id: Uuid, next: DsrStatus) -> Result<DsrRequest, RepositoryError> {
        DsrRepository::transition(self, id, next).await
    }

    async fn append_audit(
        &self,
        request_id: Uuid,
        action: AuditAction,
        old_values: Option<Value>,
        new_values: Option<Value>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<DsrAuditLog, RepositoryError> {
        DsrRepository::append_audit(
            self,
            request_id,
            action,
            old_values,
            new_values,
            ip_address,
            user_agent,
        )
        .await
    }
}

fn map_request(row: &PgRow) -> Result<DsrRequest, sqlx::Error> {
    let request_type: String = row.try_get("request_type")?;
    let status: String = row.try_get("status")?;
    let priority: String = row.try_get("priority")?;
    let data_types: Value = row.try_get("data_types")?;

    Ok(DsrRequest {
        id: row.try_get("id")?,
        request_type: request_type
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        status: status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
        priority: priority
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
        description: row.try_get("description")?,
        data_types: serde_json::from_value(data_types)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
        resolution_notes: row.try_get("resolution_notes")?,
        rejected_reason: row.try_get("rejected_reason")?,
    })
}

fn map_audit(row: &PgRow) -> Result<DsrAuditLog, sqlx::Error> {
    Ok(DsrAuditLog {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        action: row.try_get("action")?,
        old_values: row.try_get("old_values")?,
        new_values: row.try_get("new_values")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
    })
}
