//! JSON API over the request lifecycle, the approval log, inventory, the user
//! directory, in-app notifications and the dashboard.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use matreq_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use matreq_core::dashboard::DashboardStats;
use matreq_core::domain::approval::{ApprovalRecord, Decision};
use matreq_core::domain::material::{Material, MaterialId};
use matreq_core::domain::notification::{Notification, NotificationFilter, NotificationId};
use matreq_core::domain::request::{
    LineItem, NewRequest, Request, RequestFilter, RequestId, RequestStatus,
};
use matreq_core::domain::user::{User, UserId, UserRole};
use matreq_core::errors::{ApplicationError, DomainError, InterfaceError};
use matreq_core::validation::{validate_material, validate_user};
use matreq_db::repositories::{
    MaterialRepository, NotificationRepository, RepositoryError, UserRepository,
};

use crate::lifecycle::{LifecycleController, LifecycleError};

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: Arc<LifecycleController>,
    pub materials: Arc<dyn MaterialRepository>,
    pub users: Arc<dyn UserRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub audit: Arc<dyn AuditSink>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Request>,
}

type ApiFailure = (StatusCode, Json<ApiError>);
type ApiResult<T> = Result<T, ApiFailure>;

#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    pub requester: String,
    #[serde(default)]
    pub request_date: Option<NaiveDate>,
    pub account_code: String,
    #[serde(default)]
    pub account_name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub note: String,
    pub approver_email: String,
    pub line_items: Vec<LineItemBody>,
}

/// A line is either free text or a reference to an inventory material.
#[derive(Debug, Deserialize)]
pub struct LineItemBody {
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub material_id: Option<String>,
    pub quantity: u32,
}

impl SubmitRequestBody {
    fn into_draft(self, line_items: Vec<LineItem>) -> NewRequest {
        NewRequest {
            requester: self.requester,
            request_date: self.request_date.unwrap_or_else(|| Utc::now().date_naive()),
            account_code: self.account_code,
            account_name: self.account_name,
            amount: self.amount,
            note: self.note,
            approver_email: self.approver_email,
            line_items,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionBody {
    #[serde(default)]
    pub remark: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MaterialListQuery {
    #[serde(default)]
    pub low_stock: bool,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
pub struct MaterialBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub unit: String,
    #[serde(default)]
    pub quantity_on_hand: u32,
    #[serde(default)]
    pub min_stock_level: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub supplier: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserBody {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub department: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationListQuery {
    pub recipient: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
}

fn default_active() -> bool {
    true
}

impl MaterialBody {
    fn into_material(self) -> Material {
        Material {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .map(MaterialId)
                .unwrap_or_else(MaterialId::generate),
            barcode: self.barcode,
            name: self.name,
            category: self.category,
            description: self.description,
            unit: self.unit,
            quantity_on_hand: self.quantity_on_hand,
            min_stock_level: self.min_stock_level,
            unit_price: self.unit_price,
            supplier: self.supplier,
            active: self.active,
            updated_at: Utc::now(),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/requests", get(list_requests).post(submit_request))
        .route("/api/v1/requests/{id}", get(get_request).delete(delete_request))
        .route("/api/v1/requests/{id}/approve", post(approve_request))
        .route("/api/v1/requests/{id}/reject", post(reject_request))
        .route("/api/v1/requests/{id}/approvals", get(list_approvals))
        .route("/api/v1/materials", get(list_materials).post(save_material))
        .route("/api/v1/materials/{id}", get(get_material).delete(delete_material))
        .route("/api/v1/users", get(list_users).post(save_user))
        .route("/api/v1/users/{id}", get(get_user).delete(delete_user))
        .route("/api/v1/notifications", get(list_notifications))
        .route("/api/v1/notifications/{id}/read", post(mark_notification_read))
        .route("/api/v1/dashboard", get(dashboard))
        .with_state(state)
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn audit_context(correlation_id: &str) -> AuditContext {
    AuditContext::new(None, correlation_id, "api")
}

fn interface_status(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: ApplicationError, correlation_id: &str, request: Option<Request>) -> ApiFailure {
    let interface = error.into_interface(correlation_id);
    let status = interface_status(&interface);

    let message = match interface {
        InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
            error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                error = %interface,
                "request handling failed"
            );
            interface.user_message().to_string()
        }
        _ => interface.message().to_string(),
    };

    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            message,
            correlation_id: correlation_id.to_string(),
            request,
        }),
    )
}

fn lifecycle_error(error: LifecycleError, correlation_id: &str) -> ApiFailure {
    let request = match &error {
        LifecycleError::Notification { request, .. } => Some(request.as_ref().clone()),
        _ => None,
    };
    api_error(ApplicationError::from(error), correlation_id, request)
}

fn repository_error(error: RepositoryError, correlation_id: &str) -> ApiFailure {
    let mapped: ApplicationError = if matches!(error, RepositoryError::DuplicateEmail(_)) {
        DomainError::Validation(error.to_string()).into()
    } else {
        ApplicationError::Persistence(error.to_string())
    };
    api_error(mapped, correlation_id, None)
}

fn not_found(what: String, correlation_id: &str) -> ApiFailure {
    api_error(ApplicationError::NotFound(what), correlation_id, None)
}

/// Turns submitted lines into request line items. Material references are
/// resolved against inventory and copied by value.
async fn resolve_line_items(
    materials: &dyn MaterialRepository,
    lines: Vec<LineItemBody>,
) -> Result<Vec<LineItem>, ApplicationError> {
    let mut resolved = Vec::with_capacity(lines.len());
    for (index, line) in lines.into_iter().enumerate() {
        let material_id =
            line.material_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty());
        let Some(material_id) = material_id else {
            resolved.push(LineItem::new(line.item.unwrap_or_default(), line.quantity));
            continue;
        };

        let material = materials
            .find_by_id(&MaterialId(material_id.clone()))
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
        match material {
            Some(material) if material.active => {
                resolved.push(LineItem::from_material(&material, line.quantity));
            }
            Some(_) => {
                return Err(DomainError::Validation(format!(
                    "line item {} references inactive material `{material_id}`",
                    index + 1
                ))
                .into());
            }
            None => {
                return Err(DomainError::Validation(format!(
                    "line item {} references unknown material `{material_id}`",
                    index + 1
                ))
                .into());
            }
        }
    }
    Ok(resolved)
}

fn parse_filter(query: RequestListQuery) -> Result<RequestFilter, DomainError> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|status| !status.is_empty())
        .map(str::parse::<RequestStatus>)
        .transpose()?;
    Ok(RequestFilter { search_text: query.search, status })
}

async fn submit_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(mut body): Json<SubmitRequestBody>,
) -> ApiResult<(StatusCode, Json<Request>)> {
    let correlation_id = correlation_id(&headers);
    let lines = std::mem::take(&mut body.line_items);
    let line_items = match resolve_line_items(state.materials.as_ref(), lines).await {
        Ok(line_items) => line_items,
        Err(error) => {
            state.audit.emit(
                audit_context(&correlation_id)
                    .event("request.submit_rejected", AuditCategory::Submission, AuditOutcome::Rejected)
                    .with_metadata("reason", error.to_string()),
            );
            return Err(api_error(error, &correlation_id, None));
        }
    };

    let request = state
        .lifecycle
        .submit(body.into_draft(line_items), &audit_context(&correlation_id))
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;

    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<Json<Vec<Request>>> {
    let correlation_id = correlation_id(&headers);
    let filter =
        parse_filter(query).map_err(|error| api_error(error.into(), &correlation_id, None))?;
    let requests = state
        .lifecycle
        .list(&filter)
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(requests))
}

async fn get_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Request>> {
    let correlation_id = correlation_id(&headers);
    let request = state
        .lifecycle
        .get(&RequestId(id))
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(request))
}

async fn delete_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let correlation_id = correlation_id(&headers);
    state
        .lifecycle
        .remove(&RequestId(id), &audit_context(&correlation_id))
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn approve_request(
    state: State<ApiState>,
    headers: HeaderMap,
    id: Path<String>,
    body: Option<Json<DecisionBody>>,
) -> ApiResult<Json<ApprovalRecord>> {
    decide(state, headers, id, Decision::Approve, body).await
}

async fn reject_request(
    state: State<ApiState>,
    headers: HeaderMap,
    id: Path<String>,
    body: Option<Json<DecisionBody>>,
) -> ApiResult<Json<ApprovalRecord>> {
    decide(state, headers, id, Decision::Reject, body).await
}

async fn decide(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    decision: Decision,
    body: Option<Json<DecisionBody>>,
) -> ApiResult<Json<ApprovalRecord>> {
    let correlation_id = correlation_id(&headers);
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let remark = body.remark.map(|remark| remark.trim().to_string()).filter(|r| !r.is_empty());

    let outcome = state
        .lifecycle
        .decide(&RequestId(id), decision, remark, &audit_context(&correlation_id))
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(outcome.record))
}

async fn list_approvals(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ApprovalRecord>>> {
    let correlation_id = correlation_id(&headers);
    let records = state
        .lifecycle
        .approvals(&RequestId(id))
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(records))
}

async fn list_materials(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<MaterialListQuery>,
) -> ApiResult<Json<Vec<Material>>> {
    let correlation_id = correlation_id(&headers);
    let materials = if query.low_stock {
        state.materials.list_below_minimum().await
    } else {
        state.materials.list(!query.include_inactive).await
    }
    .map_err(|error| repository_error(error, &correlation_id))?;
    Ok(Json(materials))
}

async fn get_material(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Material>> {
    let correlation_id = correlation_id(&headers);
    let material_id = MaterialId(id);
    match state.materials.find_by_id(&material_id).await {
        Ok(Some(material)) => Ok(Json(material)),
        Ok(None) => Err(not_found(format!("material {}", material_id.0), &correlation_id)),
        Err(error) => Err(repository_error(error, &correlation_id)),
    }
}

async fn save_material(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<MaterialBody>,
) -> ApiResult<(StatusCode, Json<Material>)> {
    let correlation_id = correlation_id(&headers);
    let material = body.into_material();
    validate_material(&material)
        .map_err(|error| api_error(error.into(), &correlation_id, None))?;

    state
        .materials
        .save(material.clone())
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    state.audit.emit(
        audit_context(&correlation_id)
            .event("material.saved", AuditCategory::Inventory, AuditOutcome::Success)
            .with_metadata("material_id", material.id.0.clone())
            .with_metadata("quantity_on_hand", material.quantity_on_hand.to_string()),
    );
    info!(
        event_name = "material.saved",
        correlation_id = %correlation_id,
        material_id = %material.id.0,
        low_stock = material.is_below_minimum(),
        "material saved"
    );
    Ok((StatusCode::CREATED, Json(material)))
}

async fn delete_material(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let correlation_id = correlation_id(&headers);
    let material_id = MaterialId(id);
    let removed = state
        .materials
        .delete(&material_id)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;
    if !removed {
        return Err(not_found(format!("material {}", material_id.0), &correlation_id));
    }

    state.audit.emit(
        audit_context(&correlation_id)
            .event("material.removed", AuditCategory::Inventory, AuditOutcome::Success)
            .with_metadata("material_id", material_id.0),
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn list_users(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let correlation_id = correlation_id(&headers);
    let users = state
        .users
        .list(!query.include_inactive)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    let correlation_id = correlation_id(&headers);
    let user_id = UserId(id);
    match state.users.find_by_id(&user_id).await {
        Ok(Some(user)) => Ok(Json(user)),
        Ok(None) => Err(not_found(format!("user {user_id}"), &correlation_id)),
        Err(error) => Err(repository_error(error, &correlation_id)),
    }
}

async fn save_user(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<UserBody>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let correlation_id = correlation_id(&headers);
    let id = body
        .id
        .filter(|id| !id.trim().is_empty())
        .map(UserId)
        .unwrap_or_else(UserId::generate);
    let created_at = match state.users.find_by_id(&id).await {
        Ok(existing) => existing.map_or_else(Utc::now, |user| user.created_at),
        Err(error) => return Err(repository_error(error, &correlation_id)),
    };
    let user = User {
        id,
        name: body.name.trim().to_string(),
        email: body.email.trim().to_string(),
        role: body.role,
        department: body.department.trim().to_string(),
        active: body.active,
        created_at,
    };
    validate_user(&user).map_err(|error| api_error(error.into(), &correlation_id, None))?;

    state
        .users
        .save(user.clone())
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    state.audit.emit(
        audit_context(&correlation_id)
            .event("user.saved", AuditCategory::Directory, AuditOutcome::Success)
            .with_metadata("user_id", user.id.0.clone())
            .with_metadata("role", user.role.as_str()),
    );
    Ok((StatusCode::CREATED, Json(user)))
}

async fn delete_user(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let correlation_id = correlation_id(&headers);
    let user_id = UserId(id);
    let removed = state
        .users
        .delete(&user_id)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;
    if !removed {
        return Err(not_found(format!("user {user_id}"), &correlation_id));
    }

    state.audit.emit(
        audit_context(&correlation_id)
            .event("user.removed", AuditCategory::Directory, AuditOutcome::Success)
            .with_metadata("user_id", user_id.0),
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn list_notifications(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<NotificationListQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let correlation_id = correlation_id(&headers);
    let filter = NotificationFilter { recipient: query.recipient, unread_only: query.unread_only };
    let notifications = state
        .notifications
        .list(&filter)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;
    Ok(Json(notifications))
}

async fn mark_notification_read(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    let correlation_id = correlation_id(&headers);
    let notification_id = NotificationId(id);
    match state.notifications.mark_read(&notification_id).await {
        Ok(Some(notification)) => Ok(Json(notification)),
        Ok(None) => Err(not_found(format!("notification {notification_id}"), &correlation_id)),
        Err(error) => Err(repository_error(error, &correlation_id)),
    }
}

async fn dashboard(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<DashboardStats>> {
    let correlation_id = correlation_id(&headers);
    let requests = state
        .lifecycle
        .list(&RequestFilter::default())
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    let materials =
        state.materials.list(false).await.map_err(|error| repository_error(error, &correlation_id))?;

    Ok(Json(DashboardStats::compute(&requests, &materials)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request as HttpRequest, StatusCode},
        Router,
    };
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use matreq_core::audit::InMemoryAuditSink;
    use matreq_core::dashboard::DashboardStats;
    use matreq_core::domain::approval::ApprovalRecord;
    use matreq_core::domain::material::Material;
    use matreq_core::domain::notification::{Notification, NotificationKind};
    use matreq_core::domain::request::{Request, RequestStatus};
    use matreq_core::domain::user::{User, UserRole};
    use matreq_core::notify::{ApprovalLinks, NotifyError, RecordingNotifier};
    use matreq_db::repositories::{
        InMemoryMaterialRepository, InMemoryNotificationLog, InMemoryRequestStore,
        InMemoryUserRepository,
    };

    use super::{router, ApiError, ApiState};
    use crate::lifecycle::LifecycleController;

    struct TestApp {
        router: Router,
        notifier: RecordingNotifier,
    }

    fn app_with(notifier: RecordingNotifier) -> TestApp {
        let store = Arc::new(InMemoryRequestStore::default());
        let notifications = Arc::new(InMemoryNotificationLog::default());
        let audit = Arc::new(InMemoryAuditSink::default());
        let lifecycle = LifecycleController::new(
            store.clone(),
            store,
            notifications.clone(),
            Arc::new(notifier.clone()),
            audit.clone(),
            ApprovalLinks::new("http://localhost:8080"),
            Duration::from_secs(1),
        );
        let router = router(ApiState {
            lifecycle: Arc::new(lifecycle),
            materials: Arc::new(InMemoryMaterialRepository::default()),
            users: Arc::new(InMemoryUserRepository::default()),
            notifications,
            audit,
        });
        TestApp { router, notifier }
    }

    fn app() -> TestApp {
        app_with(RecordingNotifier::default())
    }

    async fn call(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header("x-correlation-id", "corr-test");
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = app.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, bytes.to_vec())
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).expect("json body")
    }

    fn submission() -> Value {
        json!({
            "requester": "Sarah Wilson",
            "request_date": "2024-01-15",
            "account_code": "HR-5100",
            "account_name": "Human Resources",
            "amount": "100",
            "approver_email": "manager@company.com",
            "line_items": [{ "item": "Pen", "quantity": 5 }]
        })
    }

    fn material(name: &str, on_hand: u32, minimum: u32) -> Value {
        json!({
            "name": name,
            "category": "Office Supplies",
            "unit": "Unit",
            "quantity_on_hand": on_hand,
            "min_stock_level": minimum,
            "unit_price": "85.00"
        })
    }

    #[tokio::test]
    async fn submit_returns_created_pending_request() {
        let app = app();
        let (status, body) = call(&app, "POST", "/api/v1/requests", Some(submission())).await;

        assert_eq!(status, StatusCode::CREATED);
        let request: Request = decode(&body);
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.request_no.to_string(), "REQ-001");
        assert_eq!(app.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn submit_with_bad_email_is_bad_request() {
        let app = app();
        let mut body = submission();
        body["approver_email"] = json!("not-an-address");

        let (status, bytes) = call(&app, "POST", "/api/v1/requests", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ApiError = decode(&bytes);
        assert_eq!(error.correlation_id, "corr-test");
        assert!(error.message.contains("not-an-address"));

        let (_, listed) = call(&app, "GET", "/api/v1/requests", None).await;
        assert!(decode::<Vec<Request>>(&listed).is_empty());
    }

    #[tokio::test]
    async fn notification_failure_is_bad_gateway_with_stored_request() {
        let app = app_with(RecordingNotifier::failing(NotifyError::Transport("offline".into())));

        let (status, bytes) = call(&app, "POST", "/api/v1/requests", Some(submission())).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let error: ApiError = decode(&bytes);
        let stored = error.request.expect("stored request in body");

        let (status, _) = call(&app, "GET", &format!("/api/v1/requests/{}", stored.id), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn reject_then_second_decision_conflicts() {
        let app = app();
        let (_, body) = call(&app, "POST", "/api/v1/requests", Some(submission())).await;
        let request: Request = decode(&body);

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/v1/requests/{}/reject", request.id),
            Some(json!({ "remark": "over budget" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let record: ApprovalRecord = decode(&body);
        assert_eq!(record.remark.as_deref(), Some("over budget"));

        let (status, _) =
            call(&app, "POST", &format!("/api/v1/requests/{}/approve", request.id), Some(json!({})))
                .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) =
            call(&app, "GET", &format!("/api/v1/requests/{}/approvals", request.id), None).await;
        assert_eq!(decode::<Vec<ApprovalRecord>>(&body).len(), 1);
    }

    #[tokio::test]
    async fn deciding_unknown_request_is_not_found() {
        let app = app();
        let (status, _) =
            call(&app, "POST", "/api/v1/requests/nope/approve", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_filters_by_status_and_rejects_unknown_status() {
        let app = app();
        let (_, body) = call(&app, "POST", "/api/v1/requests", Some(submission())).await;
        let decided: Request = decode(&body);
        call(&app, "POST", "/api/v1/requests", Some(submission())).await;
        call(&app, "POST", &format!("/api/v1/requests/{}/approve", decided.id), Some(json!({})))
            .await;

        let (status, body) = call(&app, "GET", "/api/v1/requests?status=pending", None).await;
        assert_eq!(status, StatusCode::OK);
        let pending: Vec<Request> = decode(&body);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request_no.to_string(), "REQ-002");

        let (status, _) = call(&app, "GET", "/api/v1/requests?status=archived", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_removes_request() {
        let app = app();
        let (_, body) = call(&app, "POST", "/api/v1/requests", Some(submission())).await;
        let request: Request = decode(&body);
        let uri = format!("/api/v1/requests/{}", request.id);

        let (status, _) = call(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn materials_crud_and_low_stock_listing() {
        let app = app();
        let (status, body) =
            call(&app, "POST", "/api/v1/materials", Some(material("Marker Pen", 3, 5))).await;
        assert_eq!(status, StatusCode::CREATED);
        let marker: Material = decode(&body);
        call(&app, "POST", "/api/v1/materials", Some(material("A4 Paper", 50, 10))).await;

        let (_, body) = call(&app, "GET", "/api/v1/materials?low_stock=true", None).await;
        let low: Vec<Material> = decode(&body);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name, "Marker Pen");

        let uri = format!("/api/v1/materials/{}", marker.id.0);
        let (status, _) = call(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn material_without_name_is_bad_request() {
        let app = app();
        let (status, _) =
            call(&app, "POST", "/api/v1/materials", Some(material("  ", 1, 1))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dashboard_counts_requests_and_stock() {
        let app = app();
        let (_, body) = call(&app, "POST", "/api/v1/requests", Some(submission())).await;
        let request: Request = decode(&body);
        call(&app, "POST", "/api/v1/requests", Some(submission())).await;
        call(&app, "POST", &format!("/api/v1/requests/{}/reject", request.id), Some(json!({})))
            .await;
        call(&app, "POST", "/api/v1/materials", Some(material("Marker Pen", 3, 5))).await;

        let (status, body) = call(&app, "GET", "/api/v1/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        let stats: DashboardStats = decode(&body);
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.pending_requests, 1);
        assert_eq!(stats.rejected_requests, 1);
        assert_eq!(stats.total_materials, 1);
        assert_eq!(stats.low_stock_items, 1);
        assert_eq!(stats.monthly_trend.len(), 1);
        assert_eq!(stats.monthly_trend[0].month, "2024-01");
    }

    #[tokio::test]
    async fn decision_without_a_body_uses_no_remark() {
        let app = app();
        let (_, body) = call(&app, "POST", "/api/v1/requests", Some(submission())).await;
        let request: Request = decode(&body);

        let (status, body) =
            call(&app, "POST", &format!("/api/v1/requests/{}/approve", request.id), None).await;
        assert_eq!(status, StatusCode::OK);
        let record: ApprovalRecord = decode(&body);
        assert_eq!(record.remark, None);

        let (status, body) =
            call(&app, "POST", &format!("/api/v1/requests/{}/reject", request.id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let error: ApiError = decode(&body);
        assert_eq!(error.correlation_id, "corr-test");
    }

    #[tokio::test]
    async fn line_items_can_reference_inventory_materials() {
        let app = app();
        let (_, body) =
            call(&app, "POST", "/api/v1/materials", Some(material("Marker Pen", 25, 5))).await;
        let marker: Material = decode(&body);

        let mut body = submission();
        body["line_items"] = json!([
            { "material_id": marker.id.0, "quantity": 3 },
            { "item": "Stapler", "quantity": 1 }
        ]);
        let (status, bytes) = call(&app, "POST", "/api/v1/requests", Some(body)).await;

        assert_eq!(status, StatusCode::CREATED);
        let request: Request = decode(&bytes);
        assert_eq!(request.line_items[0].item, "Marker Pen");
        assert_eq!(request.line_items[0].quantity, 3);
        assert_eq!(request.line_items[1].item, "Stapler");
    }

    #[tokio::test]
    async fn unknown_material_reference_is_bad_request_and_stores_nothing() {
        let app = app();
        let mut body = submission();
        body["line_items"] = json!([{ "material_id": "mat-missing", "quantity": 1 }]);

        let (status, bytes) = call(&app, "POST", "/api/v1/requests", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ApiError = decode(&bytes);
        assert!(error.message.contains("mat-missing"), "{}", error.message);
        let (_, listed) = call(&app, "GET", "/api/v1/requests", None).await;
        assert!(decode::<Vec<Request>>(&listed).is_empty());
        assert!(app.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn users_crud_and_duplicate_email() {
        let app = app();
        let john = json!({
            "name": "John Doe",
            "email": "john.doe@company.com",
            "role": "manager",
            "department": "IT"
        });
        let (status, body) = call(&app, "POST", "/api/v1/users", Some(john)).await;
        assert_eq!(status, StatusCode::CREATED);
        let created: User = decode(&body);
        assert_eq!(created.role, UserRole::Manager);
        assert!(created.active);

        let clash = json!({ "name": "Jo", "email": "JOHN.DOE@company.com", "department": "HR" });
        let (status, _) = call(&app, "POST", "/api/v1/users", Some(clash)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let retire = json!({
            "id": created.id.0,
            "name": "John Doe",
            "email": "john.doe@company.com",
            "role": "manager",
            "department": "IT",
            "active": false
        });
        let (status, body) = call(&app, "POST", "/api/v1/users", Some(retire)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(decode::<User>(&body).created_at, created.created_at);

        let (_, body) = call(&app, "GET", "/api/v1/users", None).await;
        assert!(decode::<Vec<User>>(&body).is_empty());
        let (_, body) = call(&app, "GET", "/api/v1/users?include_inactive=true", None).await;
        assert_eq!(decode::<Vec<User>>(&body).len(), 1);

        let uri = format!("/api/v1/users/{}", created.id.0);
        let (status, _) = call(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn user_with_malformed_email_is_bad_request() {
        let app = app();
        let body = json!({ "name": "John Doe", "email": "john.doe", "department": "IT" });
        let (status, _) = call(&app, "POST", "/api/v1/users", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn notifications_follow_the_lifecycle_and_can_be_marked_read() {
        let app = app();
        let (_, body) = call(&app, "POST", "/api/v1/requests", Some(submission())).await;
        let request: Request = decode(&body);
        call(&app, "POST", &format!("/api/v1/requests/{}/approve", request.id), None).await;

        let (status, body) = call(
            &app,
            "GET",
            "/api/v1/notifications?recipient=manager@company.com&unread_only=true",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let inbox: Vec<Notification> = decode(&body);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::RequestSubmitted);

        let (status, body) =
            call(&app, "POST", &format!("/api/v1/notifications/{}/read", inbox[0].id), None)
                .await;
        assert_eq!(status, StatusCode::OK);
        assert!(decode::<Notification>(&body).read);

        let (_, body) = call(&app, "GET", "/api/v1/notifications?unread_only=true", None).await;
        let unread: Vec<Notification> = decode(&body);
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].kind, NotificationKind::RequestApproved);

        let (status, _) =
            call(&app, "POST", "/api/v1/notifications/missing/read", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
