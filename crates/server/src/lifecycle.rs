//! Request lifecycle orchestration: submission, approver notification and the
//! single-shot approve/reject decision.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use matreq_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use matreq_core::domain::approval::{ApprovalRecord, Decision};
use matreq_core::domain::notification::Notification;
use matreq_core::domain::request::{NewRequest, Request, RequestFilter, RequestId, RequestStatus};
use matreq_core::errors::{ApplicationError, DomainError};
use matreq_core::notify::{ApprovalLinks, ApprovalNotice, Notifier, NotifyError};
use matreq_core::validation::validate_submission;
use matreq_db::repositories::{
    ApprovalRepository, NotificationRepository, RepositoryError, RequestRepository,
};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Validation(String),
    #[error("request `{0}` was not found")]
    NotFound(RequestId),
    #[error("request `{id}` is {current} and can no longer be moved to {requested}")]
    InvalidState { id: RequestId, current: RequestStatus, requested: RequestStatus },
    #[error("request {} was saved but the approver was not notified: {source}", .request.request_no)]
    Notification { request: Box<Request>, source: NotifyError },
    #[error("persistence failure: {0}")]
    Persistence(#[source] RepositoryError),
}

impl From<LifecycleError> for ApplicationError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::Validation(message) => DomainError::Validation(message).into(),
            LifecycleError::NotFound(id) => ApplicationError::NotFound(format!("request {id}")),
            LifecycleError::InvalidState { current, requested, .. } => {
                DomainError::InvalidTransition { from: current, to: requested }.into()
            }
            LifecycleError::Notification { source, .. } => {
                ApplicationError::Notification(source.to_string())
            }
            LifecycleError::Persistence(error) => ApplicationError::Persistence(error.to_string()),
        }
    }
}

fn persistence(error: RepositoryError) -> LifecycleError {
    LifecycleError::Persistence(error)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecisionOutcome {
    pub request: Request,
    pub record: ApprovalRecord,
}

pub struct LifecycleController {
    requests: Arc<dyn RequestRepository>,
    approvals: Arc<dyn ApprovalRepository>,
    notifications: Arc<dyn NotificationRepository>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    links: ApprovalLinks,
    notify_timeout: Duration,
}

impl LifecycleController {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        approvals: Arc<dyn ApprovalRepository>,
        notifications: Arc<dyn NotificationRepository>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        links: ApprovalLinks,
        notify_timeout: Duration,
    ) -> Self {
        Self { requests, approvals, notifications, notifier, audit, links, notify_timeout }
    }

    /// Validates and stores a new `PENDING` request, then notifies the approver.
    ///
    /// A notification failure leaves the stored request in place and is
    /// reported as [`LifecycleError::Notification`] carrying that request.
    pub async fn submit(
        &self,
        draft: NewRequest,
        context: &AuditContext,
    ) -> Result<Request, LifecycleError> {
        if let Err(error) = validate_submission(&draft) {
            let message = match error {
                DomainError::Validation(message) => message,
                other => other.to_string(),
            };
            self.audit.emit(
                context
                    .event("request.submit_rejected", AuditCategory::Submission, AuditOutcome::Rejected)
                    .with_metadata("reason", message.clone()),
            );
            return Err(LifecycleError::Validation(message));
        }

        let request = self.requests.create(draft).await.map_err(persistence)?;
        let context = context.with_request(request.id.clone());
        self.audit.emit(
            context
                .event("request.submitted", AuditCategory::Submission, AuditOutcome::Success)
                .with_metadata("request_no", request.request_no.to_string())
                .with_metadata("amount", request.amount.to_string())
                .with_metadata("total_quantity", request.total_quantity().to_string()),
        );
        info!(
            event_name = "request.submitted",
            correlation_id = %context.correlation_id,
            request_id = %request.id,
            request_no = %request.request_no,
            "material request stored as PENDING"
        );
        self.log_notification(Notification::submitted(&request), &context).await;

        match self.notify_approver(&request).await {
            Ok(()) => {
                self.audit.emit(
                    context
                        .event("notification.sent", AuditCategory::Notification, AuditOutcome::Success)
                        .with_metadata("to", request.approver_email.clone()),
                );
                Ok(request)
            }
            Err(source) => {
                warn!(
                    event_name = "notification.failed",
                    correlation_id = %context.correlation_id,
                    request_id = %request.id,
                    error = %source,
                    "approver notification failed; request kept"
                );
                self.audit.emit(
                    context
                        .event("notification.failed", AuditCategory::Notification, AuditOutcome::Failed)
                        .with_metadata("error", source.to_string()),
                );
                Err(LifecycleError::Notification { request: Box::new(request), source })
            }
        }
    }

    /// The in-app log is best effort; a failed append never undoes the
    /// request change that produced it.
    async fn log_notification(&self, notification: Notification, context: &AuditContext) {
        let kind = notification.kind.as_str();
        if let Err(error) = self.notifications.append(notification).await {
            warn!(
                event_name = "notification.log_failed",
                correlation_id = %context.correlation_id,
                kind,
                error = %error,
                "in-app notification was not recorded"
            );
            self.audit.emit(
                context
                    .event("notification.log_failed", AuditCategory::Notification, AuditOutcome::Failed)
                    .with_metadata("kind", kind)
                    .with_metadata("error", error.to_string()),
            );
        }
    }

    async fn notify_approver(&self, request: &Request) -> Result<(), NotifyError> {
        let notice = ApprovalNotice::for_request(request, &self.links)?;
        match tokio::time::timeout(self.notify_timeout, self.notifier.notify(&notice)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout {
                after_ms: u64::try_from(self.notify_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Applies a one-time decision to a `PENDING` request.
    pub async fn decide(
        &self,
        id: &RequestId,
        decision: Decision,
        remark: Option<String>,
        context: &AuditContext,
    ) -> Result<DecisionOutcome, LifecycleError> {
        let context = context.with_request(id.clone());
        let record = ApprovalRecord::new(id.clone(), decision, remark);

        let request = match self.requests.record_decision(record.clone()).await {
            Ok(request) => request,
            Err(RepositoryError::RequestNotFound(id)) => return Err(LifecycleError::NotFound(id)),
            Err(RepositoryError::NotPending { id, current }) => {
                self.audit.emit(
                    context
                        .event("request.decision_refused", AuditCategory::Decision, AuditOutcome::Rejected)
                        .with_metadata("current", current.as_str())
                        .with_metadata("decision", decision.as_str()),
                );
                return Err(LifecycleError::InvalidState {
                    id,
                    current,
                    requested: decision.target_status(),
                });
            }
            Err(error) => return Err(persistence(error)),
        };

        self.audit.emit(
            context
                .event("request.decided", AuditCategory::Decision, AuditOutcome::Success)
                .with_metadata("from", RequestStatus::Pending.as_str())
                .with_metadata("to", request.status.as_str()),
        );
        info!(
            event_name = "request.decided",
            correlation_id = %context.correlation_id,
            request_id = %request.id,
            decision = %decision,
            "material request decided"
        );
        self.log_notification(Notification::decided(&request, &record), &context).await;

        Ok(DecisionOutcome { request, record })
    }

    pub async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, LifecycleError> {
        self.requests.list(filter).await.map_err(persistence)
    }

    pub async fn get(&self, id: &RequestId) -> Result<Request, LifecycleError> {
        self.requests
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    pub async fn approvals(&self, id: &RequestId) -> Result<Vec<ApprovalRecord>, LifecycleError> {
        self.get(id).await?;
        self.approvals.list_for_request(id).await.map_err(persistence)
    }

    /// Administrative removal; the request number is not handed out again.
    pub async fn remove(&self, id: &RequestId, context: &AuditContext) -> Result<(), LifecycleError> {
        if !self.requests.delete(id).await.map_err(persistence)? {
            return Err(LifecycleError::NotFound(id.clone()));
        }
        self.audit.emit(context.with_request(id.clone()).event(
            "request.removed",
            AuditCategory::System,
            AuditOutcome::Success,
        ));
        Ok(())
    }
}
