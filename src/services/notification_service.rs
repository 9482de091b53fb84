// 支付确认通知服务
// 支付成功后通过Aqilas短信网关通知申请人，未配置短信时仅写日志

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{SmsConfig, SmsProvider};
use crate::error::{PaymentError, PaymentResult};
use crate::models::RequesterContact;
use crate::utils::normalize_phone_number;

/// 通知发送接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// 发送支付确认通知
    async fn send_payment_confirmation(
        &self,
        contact: &RequesterContact,
        reference: &str,
        amount: Decimal,
    ) -> PaymentResult<()>;
}

/// 生成支付确认短信内容
pub fn payment_confirmation_message(
    contact: &RequesterContact,
    reference: &str,
    amount: Decimal,
) -> String {
    let greeting = match contact.first_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => format!("Cher(e) {},", name),
        _ => "Cher client,".to_string(),
    };

    format!(
        "{} votre paiement de {} FCFA (Ref: {}) a été confirmé. \
         Merci pour votre confiance. Ordre des Notaires BF",
        greeting, amount, reference
    )
}

/// Aqilas短信通知
pub struct SmsNotificationGateway {
    client: Client,
    api_url: String,
    token: String,
    sender: String,
}

impl SmsNotificationGateway {
    pub fn new(config: &SmsConfig, token: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent("NotairesPay-SMS/1.0")
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            sender: config.sender.clone(),
        })
    }
}

#[async_trait]
impl NotificationGateway for SmsNotificationGateway {
    async fn send_payment_confirmation(
        &self,
        contact: &RequesterContact,
        reference: &str,
        amount: Decimal,
    ) -> PaymentResult<()> {
        let phone = contact
            .phone
            .as_deref()
            .ok_or_else(|| PaymentError::Validation("requester has no phone number".to_string()))?;
        let phone = normalize_phone_number(phone)
            .map_err(|e| PaymentError::Validation(e.to_string()))?;

        let payload = json!({
            "from": self.sender,
            "text": payment_confirmation_message(contact, reference, amount),
            "to": [format!("+{}", phone)],
        });

        let response = self
            .client
            .post(format!("{}/sms", self.api_url))
            .header("X-AUTH-TOKEN", &self.token)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| PaymentError::Internal(format!("SMS request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status.as_u16() == 200 && body.get("success").and_then(Value::as_bool) == Some(true) {
            log::info!("Payment confirmation SMS sent to {} (ref: {})", phone, reference);
            Ok(())
        } else {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            Err(PaymentError::Internal(format!(
                "SMS provider rejected message (HTTP {}): {}",
                status.as_u16(),
                message
            )))
        }
    }
}

/// 仅写日志的通知实现
#[derive(Debug, Default)]
pub struct LogNotificationGateway;

#[async_trait]
impl NotificationGateway for LogNotificationGateway {
    async fn send_payment_confirmation(
        &self,
        contact: &RequesterContact,
        reference: &str,
        amount: Decimal,
    ) -> PaymentResult<()> {
        log::info!(
            "Payment confirmation (not sent) to {}: {}",
            contact.phone.as_deref().unwrap_or("unknown"),
            payment_confirmation_message(contact, reference, amount)
        );
        Ok(())
    }
}

/// 根据配置创建通知实现
pub fn build_notification_gateway(config: &SmsConfig) -> anyhow::Result<Arc<dyn NotificationGateway>> {
    match (config.provider, config.token.clone()) {
        (SmsProvider::Aqilas, Some(token)) => {
            Ok(Arc::new(SmsNotificationGateway::new(config, token)?))
        }
        (SmsProvider::Aqilas, None) => {
            log::warn!("AQILAS_TOKEN is not set, payment confirmations will only be logged");
            Ok(Arc::new(LogNotificationGateway))
        }
        (SmsProvider::Log, _) => Ok(Arc::new(LogNotificationGateway)),
    }
}
