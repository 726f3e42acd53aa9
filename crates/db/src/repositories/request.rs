use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use matreq_core::domain::approval::ApprovalRecord;
use matreq_core::domain::request::{
    LineItem, NewRequest, Request, RequestFilter, RequestId, RequestNumber, RequestStatus,
};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "seq, id, requester, request_date, account_code, account_name,
     amount, note, approver_email, status, created_at, updated_at";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn attach_lines(&self, requests: &mut [Request]) -> Result<(), RepositoryError> {
        if requests.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT request_id, item_name, quantity FROM request_line WHERE request_id IN (",
        );
        let mut ids = builder.separated(", ");
        for request in requests.iter() {
            ids.push_bind(request.id.0.clone());
        }
        ids.push_unseparated(") ORDER BY request_id, position");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut lines: HashMap<String, Vec<LineItem>> = HashMap::new();
        for row in &rows {
            let request_id: String = row.try_get("request_id")?;
            lines.entry(request_id).or_default().push(line_from_row(row)?);
        }

        for request in requests.iter_mut() {
            request.line_items = lines.remove(&request.id.0).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn create(&self, draft: NewRequest) -> Result<Request, RepositoryError> {
        let id = RequestId::generate();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO material_request (id, requester, request_date, account_code, account_name,
                                           amount, note, approver_email, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(&draft.requester)
        .bind(draft.request_date.format("%Y-%m-%d").to_string())
        .bind(&draft.account_code)
        .bind(&draft.account_name)
        .bind(draft.amount.to_string())
        .bind(&draft.note)
        .bind(draft.approver_email.trim())
        .bind(RequestStatus::Pending.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let seq = u64::try_from(inserted.last_insert_rowid()).map_err(|_| {
            RepositoryError::Decode(format!(
                "negative request sequence {}",
                inserted.last_insert_rowid()
            ))
        })?;

        for (index, line) in draft.line_items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO request_line (request_id, position, item_name, quantity)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&id.0)
            .bind(index as i64 + 1)
            .bind(line.item.trim())
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let mut draft = draft;
        draft.approver_email = draft.approver_email.trim().to_string();
        for line in &mut draft.line_items {
            line.item = line.item.trim().to_string();
        }
        Ok(Request::from_new(id, RequestNumber(seq), draft, now))
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM material_request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut found = vec![request_from_row(&row)?];
        self.attach_lines(&mut found).await?;
        Ok(found.pop())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError> {
        let rows = match filter.status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM material_request WHERE status = ? ORDER BY seq DESC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM material_request ORDER BY seq DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            let request = request_from_row(row)?;
            if filter.matches_text(&request) {
                requests.push(request);
            }
        }

        self.attach_lines(&mut requests).await?;
        Ok(requests)
    }

    async fn record_decision(&self, record: ApprovalRecord) -> Result<Request, RepositoryError> {
        let target = record.decision.target_status();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE material_request SET status = ?, updated_at = ?
             WHERE id = ? AND status = 'PENDING'",
        )
        .bind(target.as_str())
        .bind(record.decided_at.to_rfc3339())
        .bind(&record.request_id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM material_request WHERE id = ?")
                    .bind(&record.request_id.0)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match current {
                None => RepositoryError::RequestNotFound(record.request_id),
                Some(status) => RepositoryError::NotPending {
                    id: record.request_id,
                    current: parse_status(&status)?,
                },
            });
        }

        sqlx::query(
            "INSERT INTO approval_record (id, request_id, decision, remark, decided_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.request_id.0)
        .bind(record.decision.as_str())
        .bind(&record.remark)
        .bind(record.decided_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.find_by_id(&record.request_id)
            .await?
            .ok_or(RepositoryError::RequestNotFound(record.request_id))
    }

    async fn delete(&self, id: &RequestId) -> Result<bool, RepositoryError> {
        let deleted = sqlx::query("DELETE FROM material_request WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }
}

fn request_from_row(row: &SqliteRow) -> Result<Request, RepositoryError> {
    let seq: i64 = row.try_get("seq")?;
    let request_date: String = row.try_get("request_date")?;
    let amount: String = row.try_get("amount")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Request {
        id: RequestId(row.try_get("id")?),
        request_no: RequestNumber(
            u64::try_from(seq)
                .map_err(|_| RepositoryError::Decode(format!("negative request sequence {seq}")))?,
        ),
        requester: row.try_get("requester")?,
        request_date: NaiveDate::parse_from_str(&request_date, "%Y-%m-%d").map_err(|err| {
            RepositoryError::Decode(format!("invalid request_date '{request_date}': {err}"))
        })?,
        account_code: row.try_get("account_code")?,
        account_name: row.try_get("account_name")?,
        amount: parse_decimal("amount", &amount)?,
        note: row.try_get("note")?,
        approver_email: row.try_get("approver_email")?,
        line_items: Vec::new(),
        status: parse_status(&status)?,
        created_at: parse_rfc3339("created_at", &created_at)?,
        updated_at: parse_rfc3339("updated_at", &updated_at)?,
    })
}

fn line_from_row(row: &SqliteRow) -> Result<LineItem, RepositoryError> {
    let quantity: i64 = row.try_get("quantity")?;
    let quantity = u32::try_from(quantity)
        .map_err(|_| RepositoryError::Decode(format!("invalid line quantity {quantity}")))?;
    Ok(LineItem::new(row.try_get::<String, _>("item_name")?, quantity))
}

fn parse_status(value: &str) -> Result<RequestStatus, RepositoryError> {
    RequestStatus::from_str(value).map_err(|err| RepositoryError::Decode(err.to_string()))
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|err| RepositoryError::Decode(format!("invalid {field} '{value}': {err}")))
}

pub(crate) fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid {field} timestamp '{value}': {err}"))
    })
}
