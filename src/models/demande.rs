// 业务申请数据模型
// 支付子系统只读取申请的状态、金额与申请人联系方式

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 申请状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RequestStatus {
    /// 等待支付
    AwaitingPayment,
    /// 已支付，等待处理
    AwaitingProcessing,
    /// 其他状态，保留原始值
    Other(String),
}

impl RequestStatus {
    pub const AWAITING_PAYMENT: &'static str = "attente_paiement";
    pub const AWAITING_PROCESSING: &'static str = "en_attente_traitement";

    pub fn from_code(code: &str) -> Self {
        match code {
            Self::AWAITING_PAYMENT => RequestStatus::AwaitingPayment,
            Self::AWAITING_PROCESSING => RequestStatus::AwaitingProcessing,
            other => RequestStatus::Other(other.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            RequestStatus::AwaitingPayment => Self::AWAITING_PAYMENT,
            RequestStatus::AwaitingProcessing => Self::AWAITING_PROCESSING,
            RequestStatus::Other(code) => code,
        }
    }
}

impl From<String> for RequestStatus {
    fn from(code: String) -> Self {
        RequestStatus::from_code(&code)
    }
}

impl From<RequestStatus> for String {
    fn from(status: RequestStatus) -> Self {
        status.as_code().to_string()
    }
}

/// 申请人联系方式
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// 业务申请快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demande {
    /// 申请ID
    pub id: i64,
    /// 申请人用户ID
    pub owner_id: i64,
    /// 申请状态
    pub status: RequestStatus,
    /// 应付总额 (FCFA)
    pub total_amount: Decimal,
    /// 申请人联系方式
    pub contact: RequesterContact,
}

impl Demande {
    pub fn is_awaiting_payment(&self) -> bool {
        self.status == RequestStatus::AwaitingPayment
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.owner_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_status_codes() {
        assert_eq!(RequestStatus::from_code("attente_paiement"), RequestStatus::AwaitingPayment);
        assert_eq!(
            RequestStatus::from_code("en_attente_traitement"),
            RequestStatus::AwaitingProcessing
        );
        let other = RequestStatus::from_code("brouillon");
        assert_eq!(other, RequestStatus::Other("brouillon".to_string()));
        assert_eq!(other.as_code(), "brouillon");
    }

    #[test]
    fn test_status_serializes_as_code() {
        let value = serde_json::to_value(RequestStatus::AwaitingPayment).unwrap();
        assert_eq!(value, serde_json::json!("attente_paiement"));
    }
}
