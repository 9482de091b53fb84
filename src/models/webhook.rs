// Webhook回调数据模型
// 定义服务商回调事件、处理结果以及确认响应

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{PaymentError, PaymentResult};
use crate::models::{
    provider_status, NormalizedStatus, Provider, Transaction, TransactionStatus,
    WEBHOOK_STATUS_FIELDS,
};

/// 签名请求头，按优先级排列
pub const SIGNATURE_HEADERS: &[&str] = &["X-Webhook-Hash", "X-Signature", "Signature"];

/// 服务商回调事件
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// 服务商
    pub provider: Provider,
    /// 交易参考号
    pub reference: String,
    /// 服务商原始状态
    pub provider_status: Option<String>,
    /// 签名
    pub signature: Option<String>,
    /// 接收时间
    pub received_at: DateTime<Utc>,
    /// 原始载荷 (保持键顺序)
    pub body: Value,
}

impl WebhookEvent {
    /// 解析回调载荷
    ///
    /// 载荷必须是包含字符串 `reference` 字段的JSON对象。
    pub fn parse(provider: Provider, body: Value, signature: Option<String>) -> PaymentResult<Self> {
        if !body.is_object() {
            return Err(PaymentError::Validation(
                "webhook payload must be a JSON object".to_string(),
            ));
        }

        let reference = body
            .get("reference")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                PaymentError::Validation("webhook payload has no reference".to_string())
            })?
            .to_string();

        let provider_status = provider_status(&body, WEBHOOK_STATUS_FIELDS).map(str::to_string);

        Ok(Self {
            provider,
            reference,
            provider_status,
            signature,
            received_at: Utc::now(),
            body,
        })
    }

    /// 归一化后的状态
    pub fn normalized_status(&self) -> NormalizedStatus {
        NormalizedStatus::from_provider(self.provider_status.as_deref())
    }

    /// 服务商数据日志中的事件名称
    pub fn log_event_name(&self) -> String {
        format!("webhook_{}", self.provider.as_str())
    }
}

/// 回调处理结果
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// 已处理 (含重复回调)
    Processed {
        transaction: Transaction,
        transitioned: bool,
    },
    /// 未找到对应交易
    Unmatched { reference: String },
    /// 签名校验失败
    Unauthorized { reference: String },
}

/// 回调确认响应
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub reference: String,
    pub status: TransactionStatus,
    pub transitioned: bool,
}
