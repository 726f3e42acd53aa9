use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::{ApprovalRecord, Decision};
use crate::domain::request::{Request, RequestId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    RequestSubmitted,
    RequestApproved,
    RequestRejected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestSubmitted => "REQUEST_SUBMITTED",
            Self::RequestApproved => "REQUEST_APPROVED",
            Self::RequestRejected => "REQUEST_REJECTED",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "REQUEST_SUBMITTED" => Ok(Self::RequestSubmitted),
            "REQUEST_APPROVED" => Ok(Self::RequestApproved),
            "REQUEST_REJECTED" => Ok(Self::RequestRejected),
            other => Err(DomainError::Validation(format!("unknown notification kind `{other}`"))),
        }
    }
}

/// In-app notice about a request, newest first in the log. Only `read` changes
/// after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub request_id: Option<RequestId>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Addressed to the approver of a freshly stored request.
    pub fn submitted(request: &Request) -> Self {
        Self {
            id: NotificationId::generate(),
            recipient: request.approver_email.clone(),
            kind: NotificationKind::RequestSubmitted,
            title: format!("{} awaits approval", request.request_no),
            message: format!(
                "{} requested {} item(s) worth {} on account {}",
                request.requester,
                request.total_quantity(),
                request.amount,
                request.account_code
            ),
            request_id: Some(request.id.clone()),
            read: false,
            created_at: Utc::now(),
        }
    }

    /// Addressed to the requester once the approver has decided.
    pub fn decided(request: &Request, record: &ApprovalRecord) -> Self {
        let (kind, verb) = match record.decision {
            Decision::Approve => (NotificationKind::RequestApproved, "approved"),
            Decision::Reject => (NotificationKind::RequestRejected, "rejected"),
        };
        let message = match record.remark.as_deref() {
            Some(remark) => format!("{} was {verb}: {remark}", request.request_no),
            None => format!("{} was {verb}", request.request_no),
        };

        Self {
            id: NotificationId::generate(),
            recipient: request.requester.clone(),
            kind,
            title: format!("{} {verb}", request.request_no),
            message,
            request_id: Some(request.id.clone()),
            read: false,
            created_at: record.decided_at,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFilter {
    pub recipient: Option<String>,
    pub unread_only: bool,
}

impl NotificationFilter {
    pub fn matches(&self, notification: &Notification) -> bool {
        let recipient = self.recipient.as_deref().map(str::trim).filter(|r| !r.is_empty());
        recipient.map_or(true, |who| notification.recipient.eq_ignore_ascii_case(who))
            && (!self.unread_only || !notification.read)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use crate::domain::approval::{ApprovalRecord, Decision};
    use crate::domain::request::{LineItem, NewRequest, Request, RequestId, RequestNumber};

    use super::{Notification, NotificationFilter, NotificationKind};

    fn request() -> Request {
        let draft = NewRequest {
            requester: "Sarah Wilson".to_string(),
            request_date: NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date"),
            account_code: "HR-5100".to_string(),
            account_name: "Human Resources".to_string(),
            amount: Decimal::new(1200, 0),
            note: String::new(),
            approver_email: "manager@company.com".to_string(),
            line_items: vec![LineItem::new("A4 Paper", 10), LineItem::new("Pen", 5)],
        };
        Request::from_new(RequestId::generate(), RequestNumber(4), draft, Utc::now())
    }

    #[test]
    fn submitted_notice_goes_to_the_approver() {
        let notice = Notification::submitted(&request());

        assert_eq!(notice.recipient, "manager@company.com");
        assert_eq!(notice.kind, NotificationKind::RequestSubmitted);
        assert_eq!(notice.title, "REQ-004 awaits approval");
        assert!(notice.message.contains("15 item(s)"), "{}", notice.message);
        assert!(!notice.read);
    }

    #[test]
    fn decided_notice_carries_the_remark() {
        let request = request();
        let record =
            ApprovalRecord::new(request.id.clone(), Decision::Reject, Some("over budget".into()));

        let notice = Notification::decided(&request, &record);
        assert_eq!(notice.recipient, "Sarah Wilson");
        assert_eq!(notice.kind, NotificationKind::RequestRejected);
        assert_eq!(notice.message, "REQ-004 was rejected: over budget");
    }

    #[test]
    fn filter_matches_recipient_and_unread() {
        let mut notice = Notification::submitted(&request());
        let mine = NotificationFilter {
            recipient: Some("Manager@Company.com".to_string()),
            unread_only: true,
        };
        assert!(mine.matches(&notice));

        notice.read = true;
        assert!(!mine.matches(&notice));
        assert!(NotificationFilter::default().matches(&notice));
    }
}
