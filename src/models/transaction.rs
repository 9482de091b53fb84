// 支付交易数据模型
// 定义交易状态机、服务商状态归一化以及只追加的服务商数据日志

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::Provider;
use crate::utils::generate_reference;

/// Webhook载荷中读取服务商状态的字段顺序
pub const WEBHOOK_STATUS_FIELDS: &[&str] = &["paymentStatus", "transactionStatus"];

/// 查询支付意图时读取服务商状态的字段顺序
pub const INTENT_STATUS_FIELDS: &[&str] = &["transactionStatus", "paymentStatus"];

/// 交易状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// 已创建，等待服务商结果
    #[default]
    Initiated,
    /// 服务商处理中
    Pending,
    /// 支付成功 (终态)
    Validated,
    /// 支付失败 (终态)
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Validated => "validated",
            TransactionStatus::Failed => "failed",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Validated | TransactionStatus::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(TransactionStatus::Initiated),
            "pending" => Ok(TransactionStatus::Pending),
            "validated" => Ok(TransactionStatus::Validated),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// 归一化后的服务商状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizedStatus {
    Validated,
    Failed,
    Pending,
}

impl NormalizedStatus {
    /// 将服务商原始状态映射为三种归一化状态
    ///
    /// `DONE` / `SUCCESS` 为成功，`FAILED` / `CANCELLED` 为失败，
    /// 其他值或缺失均视为处理中。比较前去除首尾空白并转为大写。
    pub fn from_provider(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("DONE") | Some("SUCCESS") => NormalizedStatus::Validated,
            Some("FAILED") | Some("CANCELLED") => NormalizedStatus::Failed,
            _ => NormalizedStatus::Pending,
        }
    }

    /// 按字段顺序从载荷中读取并归一化状态
    pub fn from_payload(payload: &Value, fields: &[&str]) -> Self {
        Self::from_provider(provider_status(payload, fields))
    }
}

/// 按字段顺序读取第一个字符串类型的服务商状态
pub fn provider_status<'a>(payload: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|field| payload.get(*field).and_then(Value::as_str))
}

/// 服务商数据日志中的单条事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    /// 事件名称 (如 `intent_created`, `webhook_yengapay`, `verification`)
    pub event: String,
    /// 接收时间
    pub received_at: DateTime<Utc>,
    /// 原始数据
    pub data: Value,
}

impl ProviderEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            received_at: Utc::now(),
            data,
        }
    }

    fn key(&self) -> String {
        format!(
            "{}@{}",
            self.event,
            self.received_at.to_rfc3339_opts(SecondsFormat::Micros, true)
        )
    }
}

/// 只追加的服务商数据日志
///
/// 以 `{event}@{rfc3339}` 为键保存每条事件，已有条目永不覆盖，
/// 键冲突时追加 `#n` 后缀。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderLog(Map<String, Value>);

impl ProviderLog {
    /// 追加一条事件，返回实际使用的键
    pub fn append(&mut self, event: &ProviderEvent) -> String {
        let base = event.key();
        let mut key = base.clone();
        let mut n = 1;
        while self.0.contains_key(&key) {
            n += 1;
            key = format!("{}#{}", base, n);
        }

        let entry = serde_json::json!({
            "event": event.event,
            "received_at": event.received_at,
            "data": event.data,
        });
        self.0.insert(key.clone(), entry);
        key
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按追加顺序返回事件名称
    pub fn events(&self) -> Vec<&str> {
        self.0
            .values()
            .filter_map(|entry| entry.get("event").and_then(Value::as_str))
            .collect()
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Value> for ProviderLog {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => ProviderLog(map),
            Value::Null => ProviderLog::default(),
            other => {
                let mut map = Map::new();
                map.insert("legacy".to_string(), other);
                ProviderLog(map)
            }
        }
    }
}

/// 支付交易
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    /// 交易唯一标识符
    pub id: Uuid,
    /// 对外参考号
    pub reference: String,
    /// 服务商侧的支付意图标识
    pub external_id: Option<String>,
    /// 关联的业务申请ID
    pub request_id: i64,
    /// 支付金额 (FCFA)
    pub amount: Decimal,
    /// 支付服务商
    pub provider: Provider,
    /// 交易状态
    pub status: TransactionStatus,
    /// 服务商数据日志
    pub raw_provider_data: ProviderLog,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 最后更新时间
    pub last_updated_at: DateTime<Utc>,
    /// 首次确认成功的时间，幂等标记
    pub validated_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// 创建新的待支付交易
    pub fn new(request_id: i64, amount: Decimal, provider: Provider) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference: generate_reference(now),
            external_id: None,
            request_id,
            amount,
            provider,
            status: TransactionStatus::Initiated,
            raw_provider_data: ProviderLog::default(),
            created_at: now,
            last_updated_at: now,
            validated_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 记录服务商支付意图
    pub fn attach_intent(&mut self, external_id: Option<&str>, event: &ProviderEvent, now: DateTime<Utc>) {
        if let Some(external_id) = external_id {
            self.external_id = Some(external_id.to_string());
        }
        self.raw_provider_data.append(event);
        self.last_updated_at = now;
    }

    /// 应用服务商报告的状态
    ///
    /// 事件总是写入日志。终态交易不再变化；处理中的报告不改变状态；
    /// 首次进入成功时写入 `validated_at`。返回本次是否发生了状态迁移。
    pub fn apply_status(
        &mut self,
        status: NormalizedStatus,
        event: &ProviderEvent,
        now: DateTime<Utc>,
    ) -> bool {
        self.raw_provider_data.append(event);
        self.last_updated_at = now;

        if self.is_terminal() {
            return false;
        }

        match status {
            NormalizedStatus::Pending => false,
            NormalizedStatus::Validated => {
                self.status = TransactionStatus::Validated;
                if self.validated_at.is_none() {
                    self.validated_at = Some(now);
                }
                true
            }
            NormalizedStatus::Failed => {
                self.status = TransactionStatus::Failed;
                true
            }
        }
    }
}

/// 创建支付请求
#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    /// 业务申请ID
    pub demande_id: i64,
    /// 支付服务商名称
    #[serde(alias = "type_paiement")]
    pub provider: String,
}

/// 主动查询支付状态请求
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub transaction_reference: String,
}

/// 支付回跳查询参数
#[derive(Debug, Deserialize)]
pub struct PaymentCallbackQuery {
    pub transaction_id: Option<String>,
}

/// 交易响应
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub reference: String,
    pub external_id: Option<String>,
    pub request_id: i64,
    pub amount: Decimal,
    pub provider: Provider,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(transaction: &Transaction) -> Self {
        Self {
            reference: transaction.reference.clone(),
            external_id: transaction.external_id.clone(),
            request_id: transaction.request_id,
            amount: transaction.amount,
            provider: transaction.provider,
            status: transaction.status,
            created_at: transaction.created_at,
            last_updated_at: transaction.last_updated_at,
            validated_at: transaction.validated_at,
        }
    }
}

/// 创建支付响应
#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub transaction: TransactionResponse,
    /// 支付页面地址
    pub payment_url: String,
    pub external_id: Option<String>,
}

/// 主动查询支付状态响应
#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub transaction: TransactionResponse,
    /// 服务商报告的归一化状态
    pub provider_status: NormalizedStatus,
    /// 本次查询是否引起了状态迁移
    pub transitioned: bool,
}
