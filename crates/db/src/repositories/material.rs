use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use matreq_core::domain::material::{Material, MaterialId};

use super::request::{parse_decimal, parse_rfc3339};
use super::{MaterialRepository, RepositoryError};
use crate::DbPool;

const MATERIAL_COLUMNS: &str = "id, barcode, name, category, description, unit, quantity_on_hand,
     min_stock_level, unit_price, supplier, active, updated_at";

pub struct SqlMaterialRepository {
    pool: DbPool,
}

impl SqlMaterialRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_material(row: &SqliteRow) -> Result<Material, RepositoryError> {
    let quantity_on_hand: i64 = row.try_get("quantity_on_hand")?;
    let min_stock_level: i64 = row.try_get("min_stock_level")?;
    let unit_price: String = row.try_get("unit_price")?;
    let active: i64 = row.try_get("active")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Material {
        id: MaterialId(row.try_get("id")?),
        barcode: row.try_get("barcode")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        unit: row.try_get("unit")?,
        quantity_on_hand: stock_count("quantity_on_hand", quantity_on_hand)?,
        min_stock_level: stock_count("min_stock_level", min_stock_level)?,
        unit_price: parse_decimal("unit_price", &unit_price)?,
        supplier: row.try_get("supplier")?,
        active: active != 0,
        updated_at: parse_rfc3339("updated_at", &updated_at)?,
    })
}

fn stock_count(field: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Decode(format!("invalid {field} {value}")))
}

#[async_trait::async_trait]
impl MaterialRepository for SqlMaterialRepository {
    async fn find_by_id(&self, id: &MaterialId) -> Result<Option<Material>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {MATERIAL_COLUMNS} FROM material WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_material).transpose()
    }

    async fn save(&self, material: Material) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO material (id, barcode, name, category, description, unit, quantity_on_hand,
                                   min_stock_level, unit_price, supplier, active, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 barcode = excluded.barcode,
                 name = excluded.name,
                 category = excluded.category,
                 description = excluded.description,
                 unit = excluded.unit,
                 quantity_on_hand = excluded.quantity_on_hand,
                 min_stock_level = excluded.min_stock_level,
                 unit_price = excluded.unit_price,
                 supplier = excluded.supplier,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&material.id.0)
        .bind(&material.barcode)
        .bind(&material.name)
        .bind(&material.category)
        .bind(&material.description)
        .bind(&material.unit)
        .bind(i64::from(material.quantity_on_hand))
        .bind(i64::from(material.min_stock_level))
        .bind(material.unit_price.to_string())
        .bind(&material.supplier)
        .bind(i64::from(material.active))
        .bind(material.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Material>, RepositoryError> {
        let sql = if active_only {
            format!("SELECT {MATERIAL_COLUMNS} FROM material WHERE active = 1 ORDER BY name ASC")
        } else {
            format!("SELECT {MATERIAL_COLUMNS} FROM material ORDER BY name ASC")
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_material).collect()
    }

    async fn list_below_minimum(&self) -> Result<Vec<Material>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM material
             WHERE active = 1 AND quantity_on_hand <= min_stock_level
             ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_material).collect()
    }

    async fn delete(&self, id: &MaterialId) -> Result<bool, RepositoryError> {
        let deleted = sqlx::query("DELETE FROM material WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{SubsecRound, Utc};
    use rust_decimal::Decimal;

    use matreq_core::domain::material::{Material, MaterialId};

    use super::SqlMaterialRepository;
    use crate::repositories::MaterialRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlMaterialRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlMaterialRepository::new(pool)
    }

    fn material(id: &str, name: &str, on_hand: u32, minimum: u32) -> Material {
        Material {
            id: MaterialId(id.to_string()),
            barcode: Some(format!("{id}-barcode")),
            name: name.to_string(),
            category: "Office Supplies".to_string(),
            description: String::new(),
            unit: "Unit".to_string(),
            quantity_on_hand: on_hand,
            min_stock_level: minimum,
            unit_price: Decimal::new(8_550, 2),
            supplier: "Stationery World".to_string(),
            active: true,
            updated_at: Utc::now().trunc_subsecs(0),
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let repo = setup().await;
        let marker = material("mat-1", "Marker Pen", 25, 5);

        repo.save(marker.clone()).await.expect("save");
        let found = repo.find_by_id(&marker.id).await.expect("find");

        assert_eq!(found, Some(marker));
    }

    #[tokio::test]
    async fn save_updates_existing_material() {
        let repo = setup().await;
        let mut paper = material("mat-2", "A4 Paper", 50, 10);
        repo.save(paper.clone()).await.expect("save");

        paper.quantity_on_hand = 8;
        repo.save(paper.clone()).await.expect("update");

        let found = repo.find_by_id(&paper.id).await.expect("find").expect("present");
        assert_eq!(found.quantity_on_hand, 8);
        assert_eq!(repo.list(false).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn low_stock_includes_items_at_minimum_and_skips_inactive() {
        let repo = setup().await;
        repo.save(material("mat-a", "Laptop Computer", 2, 2)).await.expect("save");
        repo.save(material("mat-b", "A4 Paper", 50, 10)).await.expect("save");
        let mut retired = material("mat-c", "Fax Toner", 0, 3);
        retired.active = false;
        repo.save(retired).await.expect("save");

        let low = repo.list_below_minimum().await.expect("low stock");
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name, "Laptop Computer");

        assert_eq!(repo.list(true).await.expect("active").len(), 2);
        assert_eq!(repo.list(false).await.expect("all").len(), 3);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_was_removed() {
        let repo = setup().await;
        let pen = material("mat-d", "Pen", 5, 1);
        repo.save(pen.clone()).await.expect("save");

        assert!(repo.delete(&pen.id).await.expect("delete"));
        assert!(!repo.delete(&pen.id).await.expect("delete again"));
        assert!(repo.find_by_id(&pen.id).await.expect("find").is_none());
    }
}
