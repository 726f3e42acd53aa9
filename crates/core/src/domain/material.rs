use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub String);

impl MaterialId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub barcode: Option<String>,
    pub name: String,
    pub category: String,
    pub description: String,
    pub unit: String,
    pub quantity_on_hand: u32,
    pub min_stock_level: u32,
    pub unit_price: Decimal,
    pub supplier: String,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Material {
    /// Stock at or under the configured minimum raises a low-stock alert.
    pub fn is_below_minimum(&self) -> bool {
        self.quantity_on_hand <= self.min_stock_level
    }

    pub fn stock_value(&self) -> Decimal {
        Decimal::from(self.quantity_on_hand) * self.unit_price
    }
}
