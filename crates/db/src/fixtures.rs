use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_MATERIALS: &[SeedMaterial] = &[
    SeedMaterial { id: "mat-a4-paper", barcode: "1234567890123", on_hand: 50, minimum: 10 },
    SeedMaterial { id: "mat-laptop", barcode: "2345678901234", on_hand: 5, minimum: 2 },
    SeedMaterial { id: "mat-marker-pen", barcode: "3456789012345", on_hand: 25, minimum: 5 },
];

const SEED_REQUESTS: &[SeedRequest] = &[
    SeedRequest {
        id: "req-seed-001",
        seq: 1,
        requester: "Sarah Wilson",
        status: "PENDING",
        line_count: 1,
        approval_id: None,
        description: "Office supplies for new employees - awaiting approval",
    },
    SeedRequest {
        id: "req-seed-002",
        seq: 2,
        requester: "Mike Johnson",
        status: "APPROVED",
        line_count: 1,
        approval_id: Some("apr-seed-002"),
        description: "Replacement laptops for finance team - approved",
    },
];

/// Deterministic demo data: three catalog materials, a pending `REQ-001` and an
/// approved `REQ-002` with its approval record.
pub struct SeedDataset;

impl SeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            materials_seeded: SEED_MATERIALS.iter().map(|material| material.id).collect(),
            requests_seeded: SEED_REQUESTS
                .iter()
                .map(|request| RequestSeedInfo {
                    request_id: request.id,
                    request_no: format!("REQ-{:03}", request.seq),
                    description: request.description,
                })
                .collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for material in SEED_MATERIALS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM material
                               WHERE id = ?1 AND barcode = ?2
                                 AND quantity_on_hand = ?3 AND min_stock_level = ?4)",
            )
            .bind(material.id)
            .bind(material.barcode)
            .bind(material.on_hand)
            .bind(material.minimum)
            .fetch_one(pool)
            .await?;
            checks.push((material.id, present == 1));
        }

        for request in SEED_REQUESTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM material_request
                               WHERE id = ?1 AND seq = ?2 AND requester = ?3 AND status = ?4)",
            )
            .bind(request.id)
            .bind(request.seq)
            .bind(request.requester)
            .bind(request.status)
            .fetch_one(pool)
            .await?;
            checks.push((request.id, present == 1));

            let line_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM request_line WHERE request_id = ?1")
                    .bind(request.id)
                    .fetch_one(pool)
                    .await?;
            checks.push((request.lines_label(), line_count == request.line_count));

            let record_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM approval_record WHERE request_id = ?1")
                    .bind(request.id)
                    .fetch_one(pool)
                    .await?;
            let expected_records = i64::from(request.approval_id.is_some());
            checks.push((request.approvals_label(), record_count == expected_records));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_requests =
            sql_array_from_ids(&SEED_REQUESTS.iter().map(|r| r.id).collect::<Vec<_>>());
        let quoted_materials =
            sql_array_from_ids(&SEED_MATERIALS.iter().map(|m| m.id).collect::<Vec<_>>());

        sqlx::query(&format!("DELETE FROM material_request WHERE id IN {quoted_requests}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM material WHERE id IN {quoted_materials}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedMaterial {
    id: &'static str,
    barcode: &'static str,
    on_hand: i64,
    minimum: i64,
}

#[derive(Debug, Clone, Copy)]
struct SeedRequest {
    id: &'static str,
    seq: i64,
    requester: &'static str,
    status: &'static str,
    line_count: i64,
    approval_id: Option<&'static str>,
    description: &'static str,
}

impl SeedRequest {
    fn lines_label(&self) -> &'static str {
        match self.seq {
            1 => "req-001-lines",
            _ => "req-002-lines",
        }
    }

    fn approvals_label(&self) -> &'static str {
        match self.seq {
            1 => "req-001-approvals",
            _ => "req-002-approvals",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub materials_seeded: Vec<&'static str>,
    pub requests_seeded: Vec<RequestSeedInfo>,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub request_id: &'static str,
    pub request_no: String,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{RequestRepository, SqlRequestRepository};
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!SeedDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = SeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = SeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.materials_seeded.len(), 3);
        assert_eq!(first.requests_seeded.len(), 2);

        let second = SeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            SeedDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second_verification.all_present);
        assert_eq!(second.requests_seeded[0].request_no, "REQ-001");
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn new_requests_continue_after_seeded_numbers() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        SeedDataset::load(&pool).await.expect("load seed fixtures");

        let repo = SqlRequestRepository::new(pool.clone());
        let seeded = repo
            .find_by_id(&matreq_core::domain::request::RequestId("req-seed-002".to_string()))
            .await
            .expect("find seeded request")
            .expect("seeded request present");
        assert_eq!(seeded.request_no.to_string(), "REQ-002");

        let created = repo
            .create(matreq_core::domain::request::NewRequest {
                requester: "Lee".to_string(),
                request_date: seeded.request_date,
                account_code: "OPS".to_string(),
                account_name: String::new(),
                amount: seeded.amount,
                note: String::new(),
                approver_email: "manager@company.com".to_string(),
                line_items: seeded.line_items.clone(),
            })
            .await
            .expect("create after seed");
        assert_eq!(created.request_no.to_string(), "REQ-003");
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        SeedDataset::load(&pool).await.expect("load seed fixtures");

        SeedDataset::clean(&pool).await.expect("clean seed fixtures");

        let verification = SeedDataset::verify(&pool).await.expect("verify after clean");
        assert!(!verification.all_present);
        let lines: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM request_line")
            .fetch_one(&pool)
            .await
            .expect("count lines");
        assert_eq!(lines, 0);
    }
}
