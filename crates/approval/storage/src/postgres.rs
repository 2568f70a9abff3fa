//! PostgreSQL adapter for approval storage.
//!
//! Full records are stored as JSONB next to the columns queries filter on.
//! The one-open-request-per-entity rule is a partial unique index, so a lost
//! race surfaces as SQLSTATE 23505 and maps to `StorageError::Conflict`.

use crate::model::{RequestCreation, RequestTransition, TenantAssignment};
use crate::traits::{ApprovalStore, QueryWindow, WorkflowStore};
use crate::{StorageError, StorageResult};
use approval_types::{
    ApprovalEvent, ApprovalRequest, AssignmentId, EntityId, EntityType, RequestId, StepAssignment,
    TenantId, UserId, WorkflowDefinition, WorkflowId,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresApprovalStorage {
    pool: PgPool,
}

impl PostgresApprovalStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS approval_workflow_definitions (
                workflow_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                tenant_id TEXT NOT NULL,
                company_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                is_active BOOLEAN NOT NULL,
                definition JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (workflow_id, version)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS approval_requests (
                request_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                status TEXT NOT NULL,
                version BIGINT NOT NULL,
                request JSONB NOT NULL,
                requested_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS approval_requests_one_open_per_entity
                ON approval_requests (tenant_id, entity_type, entity_id)
             WHERE status IN ('pending', 'escalated')
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS approval_step_assignments (
                assignment_id TEXT PRIMARY KEY,
                request_id TEXT NOT NULL REFERENCES approval_requests (request_id),
                tenant_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                step_order INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                assigned_at TIMESTAMPTZ NOT NULL,
                assignment JSONB NOT NULL,
                UNIQUE (request_id, step_id, sequence)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS approval_step_assignments_pending
                ON approval_step_assignments (assigned_at)
             WHERE status = 'pending'
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS approval_events (
                position BIGSERIAL PRIMARY KEY,
                event_id TEXT NOT NULL UNIQUE,
                request_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                at TIMESTAMPTZ NOT NULL,
                event JSONB NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for PostgresApprovalStorage {
    async fn insert_definition(&self, definition: WorkflowDefinition) -> StorageResult<()> {
        let json = to_json(&definition)?;
        sqlx::query(
            r#"
            INSERT INTO approval_workflow_definitions
                (workflow_id, version, tenant_id, company_id, entity_type, is_active, definition, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(definition.id.as_str())
        .bind(to_i32(definition.version)?)
        .bind(definition.tenant_id.as_str())
        .bind(definition.company_id.as_str())
        .bind(definition.entity_type.as_str())
        .bind(definition.is_active)
        .bind(json)
        .bind(definition.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn get_definition(
        &self,
        id: &WorkflowId,
        version: u32,
    ) -> StorageResult<Option<WorkflowDefinition>> {
        let row = sqlx::query(
            "SELECT definition FROM approval_workflow_definitions WHERE workflow_id = $1 AND version = $2",
        )
        .bind(id.as_str())
        .bind(to_i32(version)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| from_json_column(&r, "definition")).transpose()
    }

    async fn latest_definition(&self, id: &WorkflowId) -> StorageResult<Option<WorkflowDefinition>> {
        let row = sqlx::query(
            r#"
            SELECT definition
              FROM approval_workflow_definitions
             WHERE workflow_id = $1
             ORDER BY version DESC
             LIMIT 1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| from_json_column(&r, "definition")).transpose()
    }

    async fn latest_definitions(
        &self,
        tenant_id: Option<&TenantId>,
    ) -> StorageResult<Vec<WorkflowDefinition>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (workflow_id) definition
              FROM approval_workflow_definitions
             WHERE $1::TEXT IS NULL OR tenant_id = $1
             ORDER BY workflow_id, version DESC
            "#,
        )
        .bind(tenant_id.map(|t| t.as_str().to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter()
            .map(|r| from_json_column(r, "definition"))
            .collect()
    }
}

#[async_trait]
impl ApprovalStore for PostgresApprovalStorage {
    async fn create_request(&self, creation: RequestCreation) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let request = &creation.request;
        sqlx::query(
            r#"
            INSERT INTO approval_requests
                (request_id, tenant_id, entity_type, entity_id, status, version, request, requested_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.id.as_str())
        .bind(request.tenant_id.as_str())
        .bind(request.entity_type.as_str())
        .bind(request.entity_id.as_str())
        .bind(request.status.as_str())
        .bind(to_i64(request.version)?)
        .bind(to_json(request)?)
        .bind(request.requested_at)
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;

        for assignment in &creation.assignments {
            insert_assignment(&mut tx, &request.tenant_id, assignment).await?;
        }
        for event in &creation.events {
            insert_event(&mut tx, event).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn commit(&self, transition: RequestTransition) -> StorageResult<()> {
        transition.check().map_err(StorageError::InvalidInput)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if let Some(settled) = &transition.settled {
            let result = sqlx::query(
                r#"
                UPDATE approval_step_assignments
                   SET status = $1,
                       assignment = $2
                 WHERE assignment_id = $3
                   AND status = 'pending'
                "#,
            )
            .bind(settled.status.as_str())
            .bind(to_json(settled)?)
            .bind(settled.id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

            if result.rows_affected() == 0 {
                return Err(StorageError::Conflict(format!(
                    "assignment {} is no longer pending",
                    settled.id
                )));
            }
        }

        let request = &transition.request;
        let result = sqlx::query(
            r#"
            UPDATE approval_requests
               SET status = $1,
                   version = $2,
                   request = $3,
                   updated_at = $4
             WHERE request_id = $5
               AND version = $6
            "#,
        )
        .bind(request.status.as_str())
        .bind(to_i64(request.version)?)
        .bind(to_json(request)?)
        .bind(request.updated_at)
        .bind(request.id.as_str())
        .bind(to_i64(transition.expected_version)?)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "request {} changed since version {}",
                request.id, transition.expected_version
            )));
        }

        for assignment in &transition.new_assignments {
            insert_assignment(&mut tx, &request.tenant_id, assignment).await?;
        }
        for event in &transition.events {
            insert_event(&mut tx, event).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn get_request(
        &self,
        tenant_id: &TenantId,
        request_id: &RequestId,
    ) -> StorageResult<Option<ApprovalRequest>> {
        let row = sqlx::query(
            "SELECT request FROM approval_requests WHERE request_id = $1 AND tenant_id = $2",
        )
        .bind(request_id.as_str())
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| from_json_column(&r, "request")).transpose()
    }

    async fn find_open_request(
        &self,
        tenant_id: &TenantId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> StorageResult<Option<ApprovalRequest>> {
        let row = sqlx::query(
            r#"
            SELECT request
              FROM approval_requests
             WHERE tenant_id = $1
               AND entity_type = $2
               AND entity_id = $3
               AND status IN ('pending', 'escalated')
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(entity_type.as_str())
        .bind(entity_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| from_json_column(&r, "request")).transpose()
    }

    async fn get_assignment(
        &self,
        assignment_id: &AssignmentId,
    ) -> StorageResult<Option<StepAssignment>> {
        let row = sqlx::query(
            "SELECT assignment FROM approval_step_assignments WHERE assignment_id = $1",
        )
        .bind(assignment_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|r| from_json_column(&r, "assignment")).transpose()
    }

    async fn list_assignments(&self, request_id: &RequestId) -> StorageResult<Vec<StepAssignment>> {
        let rows = sqlx::query(
            r#"
            SELECT assignment
              FROM approval_step_assignments
             WHERE request_id = $1
             ORDER BY step_order, sequence
            "#,
        )
        .bind(request_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter()
            .map(|r| from_json_column(r, "assignment"))
            .collect()
    }

    async fn pending_assignments_for(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> StorageResult<Vec<StepAssignment>> {
        let rows = sqlx::query(
            r#"
            SELECT assignment
              FROM approval_step_assignments
             WHERE tenant_id = $1
               AND user_id = $2
               AND status = 'pending'
             ORDER BY assigned_at, assignment_id
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter()
            .map(|r| from_json_column(r, "assignment"))
            .collect()
    }

    async fn pending_assignments(
        &self,
        window: QueryWindow,
    ) -> StorageResult<Vec<TenantAssignment>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT tenant_id, assignment
                  FROM approval_step_assignments
                 WHERE status = 'pending'
                 ORDER BY assigned_at, assignment_id
                 OFFSET $1
                "#,
            )
            .bind(usize_to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT tenant_id, assignment
                  FROM approval_step_assignments
                 WHERE status = 'pending'
                 ORDER BY assigned_at, assignment_id
                 LIMIT $1 OFFSET $2
                "#,
            )
            .bind(usize_to_i64(window.limit)?)
            .bind(usize_to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };
        rows.iter()
            .map(|r| {
                let tenant_id: String = r
                    .try_get("tenant_id")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(TenantAssignment {
                    tenant_id: TenantId::new(tenant_id),
                    assignment: from_json_column(r, "assignment")?,
                })
            })
            .collect()
    }

    async fn list_events(&self, request_id: &RequestId) -> StorageResult<Vec<ApprovalEvent>> {
        let rows = sqlx::query(
            "SELECT event FROM approval_events WHERE request_id = $1 ORDER BY position",
        )
        .bind(request_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(|r| from_json_column(r, "event")).collect()
    }
}

async fn insert_assignment(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &TenantId,
    assignment: &StepAssignment,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO approval_step_assignments
            (assignment_id, request_id, tenant_id, step_id, step_order, sequence, user_id, status, assigned_at, assignment)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(assignment.id.as_str())
    .bind(assignment.request_id.as_str())
    .bind(tenant_id.as_str())
    .bind(assignment.step_id.as_str())
    .bind(to_i32(assignment.step_order)?)
    .bind(to_i32(assignment.sequence)?)
    .bind(assignment.user_id.as_str())
    .bind(assignment.status.as_str())
    .bind(assignment.assigned_at)
    .bind(to_json(assignment)?)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_conflict)?;
    Ok(())
}

async fn insert_event(tx: &mut Transaction<'_, Postgres>, event: &ApprovalEvent) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO approval_events (event_id, request_id, tenant_id, kind, at, event)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event.id.as_str())
    .bind(event.request_id.as_str())
    .bind(event.tenant_id.as_str())
    .bind(event.kind.as_str())
    .bind(event.at)
    .bind(to_json(event)?)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_conflict)?;
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_json_column<T: DeserializeOwned>(row: &PgRow, column: &str) -> StorageResult<T> {
    let json: serde_json::Value = row
        .try_get(column)
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    serde_json::from_value(json).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i32(value: u32) -> StorageResult<i32> {
    i32::try_from(value).map_err(|_| StorageError::InvalidInput(format!("{value} out of range")))
}

fn to_i64(value: u64) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::InvalidInput(format!("{value} out of range")))
}

fn usize_to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}
