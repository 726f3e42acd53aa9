use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::material::Material;
use crate::domain::request::{Request, RequestStatus};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    /// `YYYY-MM` of the request date.
    pub month: String,
    pub requests: u64,
    pub value: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_requests: u64,
    pub pending_requests: u64,
    pub approved_requests: u64,
    pub rejected_requests: u64,
    pub total_materials: u64,
    pub low_stock_items: u64,
    pub total_requested_value: Decimal,
    pub total_stock_value: Decimal,
    pub monthly_trend: Vec<MonthlyTrend>,
}

impl DashboardStats {
    pub fn compute(requests: &[Request], materials: &[Material]) -> Self {
        let mut stats = Self::default();
        let mut months: BTreeMap<String, (u64, Decimal)> = BTreeMap::new();

        for request in requests {
            stats.total_requests += 1;
            match request.status {
                RequestStatus::Pending => stats.pending_requests += 1,
                RequestStatus::Approved => stats.approved_requests += 1,
                RequestStatus::Rejected => stats.rejected_requests += 1,
            }
            stats.total_requested_value += request.amount;

            let bucket = months
                .entry(request.request_date.format("%Y-%m").to_string())
                .or_insert((0, Decimal::ZERO));
            bucket.0 += 1;
            bucket.1 += request.amount;
        }

        for material in materials.iter().filter(|material| material.active) {
            stats.total_materials += 1;
            if material.is_below_minimum() {
                stats.low_stock_items += 1;
            }
            stats.total_stock_value += material.stock_value();
        }

        stats.monthly_trend = months
            .into_iter()
            .map(|(month, (requests, value))| MonthlyTrend { month, requests, value })
            .collect();
        stats
    }
}
