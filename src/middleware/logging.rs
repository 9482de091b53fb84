// 请求日志中间件
// 记录每个API请求的调用方、耗时与状态码

use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::{ok, Ready};
use log::Level;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::utils::USER_ID_HEADER;

/// 请求日志中间件
pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggingMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestLoggingMiddleware { service })
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

/// 根据路径与状态码选择日志级别
///
/// 健康检查只在debug级别输出，避免探针刷屏
pub fn log_level_for(path: &str, status: u16) -> Level {
    if status >= 500 {
        Level::Error
    } else if status >= 400 {
        Level::Warn
    } else if path == "/health" {
        Level::Debug
    } else {
        Level::Info
    }
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let remote_addr = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        let caller = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| format!("user={}", v))
            .unwrap_or_else(|| "anonymous".to_string());

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let elapsed = start_time.elapsed().as_millis();

            match &result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    log::log!(
                        log_level_for(&path, status),
                        "{} {} {} ({}) -> {} in {}ms",
                        remote_addr,
                        method,
                        path,
                        caller,
                        status,
                        elapsed
                    );
                }
                Err(e) => {
                    log::error!(
                        "{} {} {} ({}) -> error after {}ms: {}",
                        remote_addr,
                        method,
                        path,
                        caller,
                        elapsed,
                        e
                    );
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test as actix_test, web, App, HttpResponse};

    #[test]
    fn test_log_level_for() {
        assert_eq!(log_level_for("/health", 200), Level::Debug);
        assert_eq!(log_level_for("/api/v1/payments/initiate", 201), Level::Info);
        assert_eq!(log_level_for("/api/v1/payments/webhook", 401), Level::Warn);
        assert_eq!(log_level_for("/health", 503), Level::Error);
    }

    #[actix_web::test]
    async fn test_middleware_passes_response_through() {
        let app = actix_test::init_service(
            App::new()
                .wrap(RequestLogging)
                .route("/ping", web::get().to(|| async { HttpResponse::Accepted().finish() })),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/ping")
            .insert_header((USER_ID_HEADER, "7"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), 202);
    }
}
