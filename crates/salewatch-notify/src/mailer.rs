use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

pub const BREVO_ENDPOINT: &str = "https://api.brevo.com/v3/smtp/email";

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("mail API returned {status}: {body}")]
    ApiError { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    pub attachment: Option<Attachment>,
}

/// Whether a message actually left. `Skipped` means no transport is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<Delivery, MailerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrevoConfig {
    pub api_key: String,
    pub sender_email: String,
    pub sender_name: String,
    pub recipients: Vec<String>,
}

impl BrevoConfig {
    /// `None` unless the key, the sender and at least one recipient are present.
    pub fn from_parts(
        api_key: Option<String>,
        sender_email: Option<String>,
        sender_name: Option<String>,
        recipients: Option<String>,
    ) -> Option<Self> {
        let api_key = api_key.filter(|v| !v.trim().is_empty())?;
        let sender_email = sender_email.filter(|v| !v.trim().is_empty())?;
        let recipients: Vec<String> = recipients?
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();
        if recipients.is_empty() {
            return None;
        }
        Some(Self {
            api_key,
            sender_name: sender_name
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "salewatch".to_string()),
            sender_email,
            recipients,
        })
    }
}

#[derive(Serialize)]
struct BrevoSender<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
struct BrevoRecipient<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct BrevoAttachment<'a> {
    name: &'a str,
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoPayload<'a> {
    sender: BrevoSender<'a>,
    to: Vec<BrevoRecipient<'a>>,
    subject: &'a str,
    text_content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html_content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachment: Vec<BrevoAttachment<'a>>,
}

fn payload<'a>(config: &'a BrevoConfig, message: &'a MailMessage) -> BrevoPayload<'a> {
    BrevoPayload {
        sender: BrevoSender {
            name: &config.sender_name,
            email: &config.sender_email,
        },
        to: config
            .recipients
            .iter()
            .map(|email| BrevoRecipient { email })
            .collect(),
        subject: &message.subject,
        text_content: &message.text,
        html_content: message.html.as_deref(),
        attachment: message
            .attachment
            .iter()
            .map(|a| BrevoAttachment {
                name: &a.name,
                content: base64::engine::general_purpose::STANDARD.encode(&a.content),
            })
            .collect(),
    }
}

/// Transactional mail through Brevo's HTTP API. Without a config every send is skipped.
#[derive(Debug)]
pub struct BrevoMailer {
    config: Option<BrevoConfig>,
    endpoint: String,
    client: reqwest::Client,
}

impl BrevoMailer {
    pub fn new(config: Option<BrevoConfig>) -> Self {
        Self {
            config,
            endpoint: BREVO_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    async fn post(&self, config: &BrevoConfig, message: &MailMessage) -> Result<Delivery, MailerError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("api-key", &config.api_key)
            .json(&payload(config, message))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(MailerError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        info!(recipients = config.recipients.len(), "mail sent");
        Ok(Delivery::Sent)
    }
}

#[async_trait]
impl Mailer for BrevoMailer {
    async fn send(&self, message: &MailMessage) -> Result<Delivery, MailerError> {
        let Some(config) = &self.config else {
            warn!(subject = %message.subject, "mail transport not configured, skipping send");
            return Ok(Delivery::Skipped);
        };
        self.post(config, message)
            .instrument(info_span!("mail_send", subject = %message.subject))
            .await
    }
}
