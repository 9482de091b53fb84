// 错误类型定义
// 支付子系统统一的错误分类及其HTTP映射

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ApiResponse;
use crate::services::GatewayFailure;

/// 付款人看到的支付启动失败提示
pub const PAYMENT_NOT_STARTED_MESSAGE: &str = "Le paiement n'a pas pu être démarré";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Payment provider error: {0}")]
    Gateway(#[from] GatewayFailure),

    #[error("Invalid signature for transaction {0}")]
    SignatureInvalid(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("An active transaction already exists for request {0}")]
    DuplicateTransaction(i64),

    #[error("Request {request_id} is not awaiting payment (status: {status})")]
    InvalidRequestState { request_id: i64, status: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment could not be started: {0}")]
    PaymentNotStarted(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type PaymentResult<T> = Result<T, PaymentError>;

impl PaymentError {
    /// 返回给调用方的消息，内部原因不外泄
    pub fn public_message(&self) -> String {
        match self {
            PaymentError::Configuration(_)
            | PaymentError::Database(_)
            | PaymentError::Internal(_) => "Internal server error".to_string(),
            PaymentError::Gateway(_) => "Payment provider unavailable".to_string(),
            PaymentError::PaymentNotStarted(_) => PAYMENT_NOT_STARTED_MESSAGE.to_string(),
            PaymentError::SignatureInvalid(_) => "Invalid signature".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for PaymentError {
    fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PaymentError::Gateway(_) => StatusCode::BAD_GATEWAY,
            PaymentError::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::DuplicateTransaction(_) => StatusCode::CONFLICT,
            PaymentError::InvalidRequestState { .. } => StatusCode::CONFLICT,
            PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
            PaymentError::PaymentNotStarted(_) => StatusCode::BAD_GATEWAY,
            PaymentError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            PaymentError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        }
        HttpResponse::build(status)
            .json(ApiResponse::error(status.as_u16() as i32, self.public_message()))
    }
}
