use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use matreq_core::domain::notification::{
    Notification, NotificationFilter, NotificationId, NotificationKind,
};
use matreq_core::domain::request::RequestId;

use super::request::parse_rfc3339;
use super::{NotificationRepository, RepositoryError};
use crate::DbPool;

const NOTIFICATION_COLUMNS: &str =
    "id, recipient, kind, title, message, request_id, is_read, created_at";

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_by_id(&self, id: &NotificationId) -> Result<Option<Notification>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notification WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_notification).transpose()
    }
}

fn row_to_notification(row: &SqliteRow) -> Result<Notification, RepositoryError> {
    let kind: String = row.try_get("kind")?;
    let request_id: Option<String> = row.try_get("request_id")?;
    let is_read: i64 = row.try_get("is_read")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Notification {
        id: NotificationId(row.try_get("id")?),
        recipient: row.try_get("recipient")?,
        kind: kind
            .parse::<NotificationKind>()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        request_id: request_id.map(RequestId),
        read: is_read != 0,
        created_at: parse_rfc3339("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn append(&self, notification: Notification) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO notification (id, recipient, kind, title, message, request_id, is_read,
                                       created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id.0)
        .bind(&notification.recipient)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.request_id.as_ref().map(|id| id.0.clone()))
        .bind(i64::from(notification.read))
        .bind(notification.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notification WHERE 1 = 1"
        ));
        if let Some(recipient) =
            filter.recipient.as_deref().map(str::trim).filter(|recipient| !recipient.is_empty())
        {
            builder.push(" AND recipient = ").push_bind(recipient.to_string());
            builder.push(" COLLATE NOCASE");
        }
        if filter.unread_only {
            builder.push(" AND is_read = 0");
        }
        builder.push(" ORDER BY rowid DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_notification).collect()
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<Option<Notification>, RepositoryError> {
        let updated = sqlx::query("UPDATE notification SET is_read = 1 WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }
}
