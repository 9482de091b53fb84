// 健康检查API处理器

use actix_web::{http::StatusCode, web, HttpResponse, Result as ActixResult};
use serde::Serialize;

use crate::state::AppState;

/// 系统健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 版本信息
    pub version: String,
    /// 数据库连接状态
    pub database: String,
    /// 当前时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// 基础健康检查
///
/// GET /health
///
/// 无需认证
/// 响应: HealthResponse
pub async fn health_check(data: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let mut health = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: "not_configured".to_string(),
        timestamp: chrono::Utc::now(),
    };

    if let Some(pool) = &data.db_pool {
        match sqlx::query("SELECT 1").fetch_one(pool).await {
            Ok(_) => health.database = "connected".to_string(),
            Err(e) => {
                log::error!("Database health check failed: {}", e);
                health.database = "disconnected".to_string();
                health.status = "unhealthy".to_string();
            }
        }
    }

    let status_code = if health.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok(HttpResponse::build(status_code).json(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        MemoryRequestLinkage, MemoryTransactionStore, MockNotificationGateway, MockPaymentGateway,
    };
    use actix_web::{test, App};
    use serde_json::Value;
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_health_check_without_database() {
        let requests = Arc::new(MemoryRequestLinkage::new());
        let store = Arc::new(MemoryTransactionStore::new(requests.clone()));
        let app_state = AppState::new_for_test(
            requests,
            store,
            MockPaymentGateway::new(),
            MockNotificationGateway::new(),
        );
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "not_configured");
    }
}
