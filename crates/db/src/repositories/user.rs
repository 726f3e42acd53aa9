use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use matreq_core::domain::user::{User, UserId, UserRole};

use super::request::parse_rfc3339;
use super::{RepositoryError, UserRepository};
use crate::DbPool;

const USER_COLUMNS: &str = "id, name, email, role, department, active, created_at";

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role: String = row.try_get("role")?;
    let active: i64 = row.try_get("active")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(User {
        id: UserId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: role
            .parse::<UserRole>()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        department: row.try_get("department")?,
        active: active != 0,
        created_at: parse_rfc3339("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM app_user WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let email = user.email.trim().to_string();
        let result = sqlx::query(
            "INSERT INTO app_user (id, name, email, role, department, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 role = excluded.role,
                 department = excluded.department,
                 active = excluded.active",
        )
        .bind(&user.id.0)
        .bind(user.name.trim())
        .bind(&email)
        .bind(user.role.as_str())
        .bind(user.department.trim())
        .bind(i64::from(user.active))
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::DuplicateEmail(email))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn list(&self, active_only: bool) -> Result<Vec<User>, RepositoryError> {
        let sql = if active_only {
            format!("SELECT {USER_COLUMNS} FROM app_user WHERE active = 1 ORDER BY name ASC")
        } else {
            format!("SELECT {USER_COLUMNS} FROM app_user ORDER BY name ASC")
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn delete(&self, id: &UserId) -> Result<bool, RepositoryError> {
        let deleted =
            sqlx::query("DELETE FROM app_user WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(deleted.rows_affected() > 0)
    }
}
