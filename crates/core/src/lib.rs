pub mod audit;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod validation;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use dashboard::{DashboardStats, MonthlyTrend};
pub use domain::approval::{ApprovalId, ApprovalRecord, Decision};
pub use domain::material::{Material, MaterialId};
pub use domain::notification::{Notification, NotificationFilter, NotificationId, NotificationKind};
pub use domain::request::{
    LineItem, NewRequest, Request, RequestFilter, RequestId, RequestNumber, RequestStatus,
};
pub use domain::user::{User, UserId, UserRole};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notify::{ApprovalLinks, ApprovalNotice, Notifier, NotifyError};
