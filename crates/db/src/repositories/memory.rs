use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use matreq_core::domain::approval::ApprovalRecord;
use matreq_core::domain::material::{Material, MaterialId};
use matreq_core::domain::notification::{Notification, NotificationFilter, NotificationId};
use matreq_core::domain::request::{
    NewRequest, Request, RequestFilter, RequestId, RequestNumber,
};
use matreq_core::domain::user::{User, UserId};

use super::{
    ApprovalRepository, MaterialRepository, NotificationRepository, RepositoryError,
    RequestRepository, UserRepository,
};

#[derive(Default)]
struct RequestState {
    last_number: u64,
    requests: HashMap<String, Request>,
    approvals: HashMap<String, Vec<ApprovalRecord>>,
}

/// Requests and their approval log behind one lock, so a decision is observed
/// as a single write.
#[derive(Default)]
pub struct InMemoryRequestStore {
    state: RwLock<RequestState>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestStore {
    async fn create(&self, draft: NewRequest) -> Result<Request, RepositoryError> {
        let mut state = self.state.write().await;
        state.last_number += 1;

        let mut draft = draft;
        draft.approver_email = draft.approver_email.trim().to_string();
        for line in &mut draft.line_items {
            line.item = line.item.trim().to_string();
        }

        let request = Request::from_new(
            RequestId::generate(),
            RequestNumber(state.last_number),
            draft,
            Utc::now(),
        );
        state.requests.insert(request.id.0.clone(), request.clone());
        Ok(request)
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError> {
        let state = self.state.read().await;
        let mut requests: Vec<Request> =
            state.requests.values().filter(|request| filter.matches(request)).cloned().collect();
        requests.sort_by(|left, right| right.request_no.cmp(&left.request_no));
        Ok(requests)
    }

    async fn record_decision(&self, record: ApprovalRecord) -> Result<Request, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(request) = state.requests.get_mut(&record.request_id.0) else {
            return Err(RepositoryError::RequestNotFound(record.request_id));
        };

        if request.apply(record.decision, record.decided_at).is_err() {
            return Err(RepositoryError::NotPending {
                id: record.request_id,
                current: request.status,
            });
        }

        let decided = request.clone();
        state.approvals.entry(record.request_id.0.clone()).or_default().push(record);
        Ok(decided)
    }

    async fn delete(&self, id: &RequestId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        state.approvals.remove(&id.0);
        Ok(state.requests.remove(&id.0).is_some())
    }
}

#[async_trait::async_trait]
impl ApprovalRepository for InMemoryRequestStore {
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.approvals.get(&request_id.0).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryMaterialRepository {
    materials: RwLock<HashMap<String, Material>>,
}

impl InMemoryMaterialRepository {
    async fn sorted(&self, keep: impl Fn(&Material) -> bool) -> Vec<Material> {
        let materials = self.materials.read().await;
        let mut selected: Vec<Material> =
            materials.values().filter(|material| keep(material)).cloned().collect();
        selected.sort_by(|left, right| left.name.cmp(&right.name));
        selected
    }
}

#[async_trait::async_trait]
impl MaterialRepository for InMemoryMaterialRepository {
    async fn find_by_id(&self, id: &MaterialId) -> Result<Option<Material>, RepositoryError> {
        let materials = self.materials.read().await;
        Ok(materials.get(&id.0).cloned())
    }

    async fn save(&self, material: Material) -> Result<(), RepositoryError> {
        let mut materials = self.materials.write().await;
        materials.insert(material.id.0.clone(), material);
        Ok(())
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Material>, RepositoryError> {
        Ok(self.sorted(|material| !active_only || material.active).await)
    }

    async fn list_below_minimum(&self) -> Result<Vec<Material>, RepositoryError> {
        Ok(self.sorted(|material| material.active && material.is_below_minimum()).await)
    }

    async fn delete(&self, id: &MaterialId) -> Result<bool, RepositoryError> {
        let mut materials = self.materials.write().await;
        Ok(materials.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn save(&self, mut user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        user.email = user.email.trim().to_string();
        let taken = users
            .values()
            .any(|other| other.id != user.id && other.email.eq_ignore_ascii_case(&user.email));
        if taken {
            return Err(RepositoryError::DuplicateEmail(user.email));
        }

        if let Some(existing) = users.get(&user.id.0) {
            user.created_at = existing.created_at;
        }
        users.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn list(&self, active_only: bool) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut selected: Vec<User> =
            users.values().filter(|user| !active_only || user.active).cloned().collect();
        selected.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(selected)
    }

    async fn delete(&self, id: &UserId) -> Result<bool, RepositoryError> {
        let mut users = self.users.write().await;
        Ok(users.remove(&id.0).is_some())
    }
}

/// Append-only log kept oldest first; reads reverse it.
#[derive(Default)]
pub struct InMemoryNotificationLog {
    entries: RwLock<Vec<Notification>>,
}

#[async_trait::async_trait]
impl NotificationRepository for InMemoryNotificationLog {
    async fn append(&self, notification: Notification) -> Result<(), RepositoryError> {
        self.entries.write().await.push(notification);
        Ok(())
    }

    async fn list(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().filter(|entry| filter.matches(entry)).cloned().collect())
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<Option<Notification>, RepositoryError> {
        let mut entries = self.entries.write().await;
        Ok(entries.iter_mut().find(|entry| entry.id == *id).map(|entry| {
            entry.read = true;
            entry.clone()
        }))
    }
}
