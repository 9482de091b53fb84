// 认证工具函数
// 从请求头中提取调用方身份与Webhook签名

use actix_web::HttpRequest;

use crate::error::{PaymentError, PaymentResult};
use crate::models::SIGNATURE_HEADERS;

/// 前置认证层写入的用户ID请求头
pub const USER_ID_HEADER: &str = "X-User-Id";

/// 从HTTP请求中提取调用方用户ID
///
/// # Arguments
/// * `req` - HTTP请求对象
///
/// # Returns
/// * 用户ID
pub fn extract_user_id(req: &HttpRequest) -> PaymentResult<i64> {
    let value = req
        .headers()
        .get(USER_ID_HEADER)
        .ok_or_else(|| PaymentError::Unauthenticated("missing caller identity".to_string()))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| PaymentError::Unauthenticated("invalid caller identity".to_string()))
}

/// 按优先级读取Webhook签名请求头
pub fn extract_signature(req: &HttpRequest) -> Option<String> {
    SIGNATURE_HEADERS.iter().find_map(|name| {
        req.headers()
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}
