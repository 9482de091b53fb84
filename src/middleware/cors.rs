// CORS中间件配置
// 允许前端应用调用支付API

use actix_cors::Cors;
use actix_web::http::header;

/// 创建CORS中间件
///
/// # Arguments
/// * `allowed_origins` - 允许的源列表，为空时仅放行本地开发地址
///
/// # Returns
/// * 配置好的CORS中间件
pub fn create_cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-user-id"),
        ])
        .expose_headers(vec![header::LOCATION])
        .max_age(3600);

    if allowed_origins.is_empty() {
        cors = cors.allowed_origin_fn(|origin, _req_head| {
            origin.as_bytes().starts_with(b"http://localhost")
                || origin.as_bytes().starts_with(b"http://127.0.0.1")
        });
    }

    for origin in allowed_origins {
        cors = cors.allowed_origin(origin);
    }

    cors
}
