// API路由配置
// 定义所有HTTP接口的路由规则

use actix_web::{web, Scope};
use crate::handlers::*;

/// API v1路由配置
pub fn api_v1_routes() -> Scope {
    web::scope("/api/v1")
        // 支付路由
        .service(payment_routes())
}

/// 支付路由
fn payment_routes() -> Scope {
    web::scope("/payments")
        .route("/initiate", web::post().to(initiate_payment))
        .route("/verify", web::post().to(verify_payment))
        .route("/transactions/{reference}", web::get().to(get_transaction))
        // 支付页面回跳 (无需认证)
        .route("/callback", web::get().to(payment_callback))
        // 服务商回调 (签名校验)
        .route("/webhook", web::post().to(receive_default_webhook))
        .route("/webhooks/{provider}", web::post().to(receive_webhook))
}

/// 公共路由 (无需认证)
pub fn public_routes() -> Scope {
    web::scope("")
        .route("/health", web::get().to(health_check))
}
