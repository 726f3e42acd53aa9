use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Submission,
    Decision,
    Notification,
    Inventory,
    Directory,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub request_id: Option<RequestId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        request_id: Option<RequestId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { request_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }

    pub fn with_request(&self, request_id: RequestId) -> Self {
        Self { request_id: Some(request_id), ..self.clone() }
    }

    pub fn event(
        &self,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent::new(
            self.request_id.clone(),
            self.correlation_id.clone(),
            event_type,
            category,
            self.actor.clone(),
            outcome,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub request_id: Option<RequestId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        request_id: Option<RequestId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            request_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, InMemoryAuditSink},
        domain::request::RequestId,
    };

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new(None, "req-123", "api")
            .with_request(RequestId("8d1c".to_owned()));

        sink.emit(
            context
                .event("request.decided", AuditCategory::Decision, AuditOutcome::Success)
                .with_metadata("from", "PENDING")
                .with_metadata("to", "APPROVED"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-123");
        assert_eq!(events[0].actor, "api");
        assert_eq!(events[0].request_id.as_ref().map(|id| id.0.as_str()), Some("8d1c"));
        assert!(events[0].metadata.contains_key("from"));
        assert_eq!(sink.event_types(), vec!["request.decided".to_string()]);
    }
}
