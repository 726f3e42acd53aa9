use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::info;

use matreq_core::config::EmailConfig;
use matreq_core::notify::{ApprovalNotice, Notifier, NotifyError};

const MAX_ERROR_BODY: usize = 512;

/// Sends approval notices through an EmailJS-compatible HTTP send endpoint.
pub struct EmailJsNotifier {
    client: Client,
    api_url: String,
    service_id: String,
    template_id: String,
    public_key: SecretString,
    access_token: Option<SecretString>,
    timeout: Duration,
}

#[derive(Serialize)]
struct SendPayload<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
    template_params: TemplateParams<'a>,
}

#[derive(Serialize)]
struct TemplateParams<'a> {
    to_email: &'a str,
    request_no: &'a str,
    requester: &'a str,
    request_date: &'a str,
    account_code: &'a str,
    account_name: &'a str,
    amount: &'a str,
    items_list: &'a str,
    note: &'a str,
    approval_url: &'a str,
    message: &'a str,
}

impl EmailJsNotifier {
    pub fn from_config(config: &EmailConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim().to_string(),
            service_id: config.service_id.clone(),
            template_id: config.template_id.clone(),
            public_key: config.public_key.clone(),
            access_token: config.access_token.clone(),
            timeout,
        })
    }

    fn payload<'a>(&'a self, notice: &'a ApprovalNotice) -> SendPayload<'a> {
        SendPayload {
            service_id: &self.service_id,
            template_id: &self.template_id,
            user_id: self.public_key.expose_secret(),
            access_token: self.access_token.as_ref().map(|token| token.expose_secret()),
            template_params: TemplateParams {
                to_email: &notice.to_email,
                request_no: &notice.request_no,
                requester: &notice.requester,
                request_date: &notice.request_date,
                account_code: &notice.account_code,
                account_name: &notice.account_name,
                amount: &notice.amount,
                items_list: &notice.items_list,
                note: &notice.note,
                approval_url: &notice.approval_url,
                message: &notice.summary,
            },
        }
    }
}

#[async_trait]
impl Notifier for EmailJsNotifier {
    async fn notify(&self, notice: &ApprovalNotice) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&self.payload(notice))
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    NotifyError::Timeout {
                        after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    }
                } else {
                    NotifyError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        info!(
            event_name = "notification.email.sent",
            request_no = %notice.request_no,
            to = %notice.to_email,
            "approval email accepted by provider"
        );
        Ok(())
    }
}

/// Used when email delivery is disabled: the notice is only logged.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &ApprovalNotice) -> Result<(), NotifyError> {
        info!(
            event_name = "notification.logged",
            request_no = %notice.request_no,
            to = %notice.to_email,
            approval_url = %notice.approval_url,
            "email delivery disabled; approval notice logged"
        );
        Ok(())
    }
}
