//! 이메일 전송 협력자
//!
//! [`Mailer`]는 외부 이메일 서비스의 추상화입니다. 전송은 최선 노력이며,
//! 실패는 호출자가 로그로만 남깁니다 (알림 영속성이나 발송 마커는 되돌리지 않음).
//!
//! - [`LogMailer`]: `[email] enabled = false`일 때 메시지를 로그로만 남깁니다.
//! - [`WebhookMailer`]: `{from, to, subject, text}` JSON을 웹훅으로 POST 합니다.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use vulnwatch_core::config::EmailConfig;
use vulnwatch_core::pipeline::BoxFuture;
use vulnwatch_core::types::{AlertFrequency, Notification, NotificationType, UserProfile};

use crate::error::DeliveryError;

/// 전송할 이메일
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    /// 수신 주소
    pub to: String,
    /// 제목
    pub subject: String,
    /// 본문 (plain text)
    pub text: String,
}

/// 이메일 전송 인터페이스
pub trait Mailer: Send + Sync {
    /// 메시지 하나를 전송합니다.
    fn send<'a>(&'a self, message: EmailMessage) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

/// 로그 전용 메일러
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send<'a>(&'a self, message: EmailMessage) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            info!(
                to = %message.to,
                subject = %message.subject,
                bytes = message.text.len(),
                "email delivery disabled, message logged only"
            );
            Ok(())
        })
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// 웹훅 기반 메일러
pub struct WebhookMailer {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    from: String,
}

impl WebhookMailer {
    /// 이메일 설정으로 메일러를 생성합니다.
    pub fn new(config: &EmailConfig) -> Result<Self, DeliveryError> {
        if config.endpoint.trim().is_empty() {
            return Err(DeliveryError::Config("email.endpoint is empty".to_owned()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("vulnwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Config(e.to_string()))?;
        let token = Some(config.api_token.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_owned);
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            token,
            from: config.from.clone(),
        })
    }
}

impl Mailer for WebhookMailer {
    fn send<'a>(&'a self, message: EmailMessage) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            let payload = WebhookPayload {
                from: &self.from,
                to: &message.to,
                subject: &message.subject,
                text: &message.text,
            };
            let mut request = self.client.post(&self.endpoint).json(&payload);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DeliveryError::Rejected {
                    status: status.as_u16(),
                });
            }
            debug!(to = %message.to, status = status.as_u16(), "email accepted by webhook");
            Ok(())
        })
    }
}

/// 설정에 맞는 메일러를 만듭니다. 비활성화 상태면 [`LogMailer`].
pub fn mailer_from_config(
    config: &EmailConfig,
) -> Result<std::sync::Arc<dyn Mailer>, DeliveryError> {
    if config.enabled {
        Ok(std::sync::Arc::new(WebhookMailer::new(config)?))
    } else {
        Ok(std::sync::Arc::new(LogMailer))
    }
}

fn kind_title(kind: NotificationType) -> &'static str {
    match kind {
        NotificationType::System => "System",
        NotificationType::Security => "Security",
        NotificationType::Scan => "Scan",
        NotificationType::Collaboration => "Collaboration",
    }
}

/// 즉시 알림 이메일
pub fn render_immediate(user: &UserProfile, notification: &Notification) -> EmailMessage {
    EmailMessage {
        to: user.email.clone(),
        subject: format!("VulnWatch {} Alert", kind_title(notification.kind)),
        text: notification.message.clone(),
    }
}

/// 다이제스트 이메일 (오래된 순 항목)
pub fn render_digest(
    user: &UserProfile,
    frequency: AlertFrequency,
    items: &[Notification],
) -> EmailMessage {
    let mut text = format!(
        "Hello {},\n\nYour {frequency} VulnWatch digest contains {} item(s):\n\n",
        user.name,
        items.len()
    );
    for item in items {
        text.push_str(&format!(
            "- [{}] {} ({})\n",
            kind_title(item.kind),
            item.message,
            item.created_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    text.push_str("\nOpen VulnWatch to review and mark them as read.\n");

    EmailMessage {
        to: user.email.clone(),
        subject: format!("VulnWatch {frequency} security digest ({} items)", items.len()),
        text,
    }
}
