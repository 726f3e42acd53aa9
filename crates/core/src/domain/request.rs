use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::Decision;
use crate::domain::material::Material;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sequential, human-readable request number rendered as `REQ-001`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestNumber(pub u64);

impl fmt::Display for RequestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "REQ-{:03}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Pending => false,
            Self::Approved | Self::Rejected => true,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(DomainError::Validation(format!(
                "unknown request status `{other}` (expected PENDING|APPROVED|REJECTED)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item: String,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(item: impl Into<String>, quantity: u32) -> Self {
        Self { item: item.into(), quantity }
    }

    /// Copies the material name by value; later catalog edits do not touch the request.
    pub fn from_material(material: &Material, quantity: u32) -> Self {
        Self { item: material.name.clone(), quantity }
    }
}

/// Input accepted by a submission before a number and id are assigned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub requester: String,
    pub request_date: NaiveDate,
    pub account_code: String,
    pub account_name: String,
    pub amount: Decimal,
    pub note: String,
    pub approver_email: String,
    pub line_items: Vec<LineItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub request_no: RequestNumber,
    pub requester: String,
    pub request_date: NaiveDate,
    pub account_code: String,
    pub account_name: String,
    pub amount: Decimal,
    pub note: String,
    pub approver_email: String,
    pub line_items: Vec<LineItem>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn from_new(
        id: RequestId,
        request_no: RequestNumber,
        draft: NewRequest,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            request_no,
            requester: draft.requester,
            request_date: draft.request_date,
            account_code: draft.account_code,
            account_name: draft.account_name,
            amount: draft.amount,
            note: draft.note,
            approver_email: draft.approver_email,
            line_items: draft.line_items,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Both decisions are only available while the request is still `PENDING`.
    pub fn can_decide(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn apply(&mut self, decision: Decision, now: DateTime<Utc>) -> Result<(), DomainError> {
        let next = decision.target_status();
        if !self.can_decide() {
            return Err(DomainError::InvalidTransition { from: self.status, to: next });
        }

        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn total_quantity(&self) -> u64 {
        self.line_items.iter().map(|line| u64::from(line.quantity)).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub search_text: Option<String>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn matches(&self, request: &Request) -> bool {
        self.matches_status(request) && self.matches_text(request)
    }

    pub fn matches_status(&self, request: &Request) -> bool {
        self.status.map_or(true, |status| request.status == status)
    }

    pub fn matches_text(&self, request: &Request) -> bool {
        let needle = match self.search_text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_lowercase(),
            _ => return true,
        };

        [request.request_no.to_string(), request.requester.clone(), request.account_code.clone()]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}
