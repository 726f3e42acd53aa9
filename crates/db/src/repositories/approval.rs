use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use matreq_core::domain::approval::{ApprovalId, ApprovalRecord, Decision};
use matreq_core::domain::request::RequestId;

use super::request::parse_rfc3339;
use super::{ApprovalRepository, RepositoryError};
use crate::DbPool;

/// Read side of the approval log. Records are written only through
/// `RequestRepository::record_decision`.
pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &SqliteRow) -> Result<ApprovalRecord, RepositoryError> {
    let decision: String = row.try_get("decision")?;
    let decided_at: String = row.try_get("decided_at")?;

    Ok(ApprovalRecord {
        id: ApprovalId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        decision: Decision::from_str(&decision)
            .map_err(|err| RepositoryError::Decode(err.to_string()))?,
        remark: row.try_get("remark")?,
        decided_at: parse_rfc3339("decided_at", &decided_at)?,
    })
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, decision, remark, decided_at
             FROM approval_record WHERE request_id = ? ORDER BY decided_at ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use matreq_core::domain::request::RequestId;

    use super::SqlApprovalRepository;
    use crate::repositories::ApprovalRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn unknown_request_has_empty_log() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let repo = SqlApprovalRepository::new(pool);
        let records =
            repo.list_for_request(&RequestId("nope".to_string())).await.expect("list records");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn stored_remark_and_decision_are_decoded() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        sqlx::query(
            "INSERT INTO material_request (id, requester, request_date, account_code, amount,
                                           approver_email, status, created_at, updated_at)
             VALUES ('r-1', 'Sarah', '2024-01-15', 'HR', '10', 'm@company.com', 'REJECTED',
                     '2024-01-15T08:00:00+00:00', '2024-01-15T09:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert request");
        sqlx::query(
            "INSERT INTO approval_record (id, request_id, decision, remark, decided_at)
             VALUES ('a-1', 'r-1', 'REJECT', 'over budget', '2024-01-15T09:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert record");

        let repo = SqlApprovalRepository::new(pool);
        let records = repo.list_for_request(&RequestId("r-1".to_string())).await.expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].remark.as_deref(), Some("over budget"));
        assert_eq!(records[0].decision.as_str(), "REJECT");
    }
}
