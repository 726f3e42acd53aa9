//! Approver notification payloads and the outbound notifier boundary.
//!
//! The lifecycle controller builds one [`ApprovalNotice`] per submitted request
//! and hands it to a [`Notifier`]. Transport adapters (HTTP email API, log-only)
//! live with the binaries that wire them.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::request::{LineItem, Request, RequestId};

const SUMMARY_TEMPLATE: &str = "\
Material request {{ request_no }} is waiting for your decision.

Requester: {{ requester }}
Request date: {{ request_date }}
Account: {{ account_code }}{% if account_name %} - {{ account_name }}{% endif %}
Amount: {{ amount }}

Items:
{{ items_list }}
{% if note %}
Note: {{ note }}
{% endif %}
Approve or reject: {{ approval_url }}
";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("could not render notification: {0}")]
    Render(String),
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("notification timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Builds the decision link embedded in every notice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalLinks {
    base_url: String,
}

impl ApprovalLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    pub fn decision_url(&self, request_id: &RequestId) -> String {
        format!("{}/approve/{}", self.base_url, request_id.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalNotice {
    pub to_email: String,
    pub request_id: String,
    pub request_no: String,
    pub requester: String,
    pub account_code: String,
    pub account_name: String,
    pub amount: String,
    pub request_date: String,
    pub items_list: String,
    pub note: String,
    pub approval_url: String,
    pub summary: String,
}

impl ApprovalNotice {
    pub fn for_request(request: &Request, links: &ApprovalLinks) -> Result<Self, NotifyError> {
        let mut notice = Self {
            to_email: request.approver_email.trim().to_string(),
            request_id: request.id.0.clone(),
            request_no: request.request_no.to_string(),
            requester: request.requester.clone(),
            account_code: request.account_code.clone(),
            account_name: request.account_name.clone(),
            amount: format_amount(request.amount),
            request_date: request.request_date.format("%Y-%m-%d").to_string(),
            items_list: format_line_items(&request.line_items),
            note: request.note.trim().to_string(),
            approval_url: links.decision_url(&request.id),
            summary: String::new(),
        };
        notice.summary = render_summary(&notice)?;
        Ok(notice)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &ApprovalNotice) -> Result<(), NotifyError>;
}

/// Keeps every notice it is handed; optionally fails each delivery.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<ApprovalNotice>>>,
    failure: Option<NotifyError>,
}

impl RecordingNotifier {
    pub fn failing(error: NotifyError) -> Self {
        Self { sent: Arc::default(), failure: Some(error) }
    }

    pub fn sent(&self) -> Vec<ApprovalNotice> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &ApprovalNotice) -> Result<(), NotifyError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notice.clone()),
            Err(poisoned) => poisoned.into_inner().push(notice.clone()),
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

pub fn format_line_items(items: &[LineItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(index, line)| format!("{}. {} x {}", index + 1, line.item.trim(), line.quantity))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders an amount with thousands separators, dropping trailing zero decimals.
pub fn format_amount(amount: Decimal) -> String {
    let normalized = amount.normalize().to_string();
    let (sign, unsigned) = match normalized.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", normalized.as_str()),
    };
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}

fn render_summary(notice: &ApprovalNotice) -> Result<String, NotifyError> {
    let mut context = Context::new();
    context.insert("request_no", &notice.request_no);
    context.insert("requester", &notice.requester);
    context.insert("request_date", &notice.request_date);
    context.insert("account_code", &notice.account_code);
    context.insert("account_name", &notice.account_name);
    context.insert("amount", &notice.amount);
    context.insert("items_list", &notice.items_list);
    context.insert("note", &notice.note);
    context.insert("approval_url", &notice.approval_url);

    Tera::one_off(SUMMARY_TEMPLATE, &context, false)
        .map_err(|error| NotifyError::Render(error.to_string()))
}
