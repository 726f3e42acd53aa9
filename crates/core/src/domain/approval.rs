use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::{RequestId, RequestStatus};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
        }
    }

    pub fn target_status(&self) -> RequestStatus {
        match self {
            Self::Approve => RequestStatus::Approved,
            Self::Reject => RequestStatus::Rejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "APPROVE" => Ok(Self::Approve),
            "REJECT" => Ok(Self::Reject),
            other => Err(DomainError::Validation(format!(
                "unknown decision `{other}` (expected APPROVE|REJECT)"
            ))),
        }
    }
}

/// One immutable entry in the approval log of a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: ApprovalId,
    pub request_id: RequestId,
    pub decision: Decision,
    pub remark: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalRecord {
    pub fn new(request_id: RequestId, decision: Decision, remark: Option<String>) -> Self {
        let remark = remark.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
        Self { id: ApprovalId::generate(), request_id, decision, remark, decided_at: Utc::now() }
    }

    pub fn is_consistent_with(&self, status: RequestStatus) -> bool {
        self.decision.target_status() == status
    }
}
