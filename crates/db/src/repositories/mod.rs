use async_trait::async_trait;
use thiserror::Error;

use matreq_core::domain::approval::ApprovalRecord;
use matreq_core::domain::material::{Material, MaterialId};
use matreq_core::domain::notification::{Notification, NotificationFilter, NotificationId};
use matreq_core::domain::request::{NewRequest, Request, RequestFilter, RequestId, RequestStatus};
use matreq_core::domain::user::{User, UserId};

pub mod approval;
pub mod material;
pub mod memory;
pub mod notification;
pub mod request;
pub mod user;

pub use approval::SqlApprovalRepository;
pub use material::SqlMaterialRepository;
pub use memory::{
    InMemoryMaterialRepository, InMemoryNotificationLog, InMemoryRequestStore,
    InMemoryUserRepository,
};
pub use notification::SqlNotificationRepository;
pub use request::SqlRequestRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("request `{0}` was not found")]
    RequestNotFound(RequestId),
    #[error("request `{id}` is {current}, only PENDING requests can be decided")]
    NotPending { id: RequestId, current: RequestStatus },
    #[error("email `{0}` already belongs to another user")]
    DuplicateEmail(String),
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Stores a draft as a new `PENDING` request with the next request number.
    async fn create(&self, draft: NewRequest) -> Result<Request, RepositoryError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;

    /// Newest first.
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError>;

    /// Moves a `PENDING` request to the record's target status and appends the
    /// record. Either both writes become visible or neither does.
    async fn record_decision(&self, record: ApprovalRecord) -> Result<Request, RepositoryError>;

    async fn delete(&self, id: &RequestId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError>;
}

#[async_trait]
pub trait MaterialRepository: Send + Sync {
    async fn find_by_id(&self, id: &MaterialId) -> Result<Option<Material>, RepositoryError>;
    async fn save(&self, material: Material) -> Result<(), RepositoryError>;
    async fn list(&self, active_only: bool) -> Result<Vec<Material>, RepositoryError>;
    async fn list_below_minimum(&self) -> Result<Vec<Material>, RepositoryError>;
    async fn delete(&self, id: &MaterialId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    /// Inserts or replaces by id. Emails are unique ignoring case.
    async fn save(&self, user: User) -> Result<(), RepositoryError>;

    /// Ordered by name.
    async fn list(&self, active_only: bool) -> Result<Vec<User>, RepositoryError>;
    async fn delete(&self, id: &UserId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn append(&self, notification: Notification) -> Result<(), RepositoryError>;

    /// Newest first.
    async fn list(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, RepositoryError>;

    /// Returns the updated notification, or `None` when the id is unknown.
    async fn mark_read(&self, id: &NotificationId) -> Result<Option<Notification>, RepositoryError>;
}
