// 支付网关抽象
// 定义支付服务商接口、调用失败的分类以及服务商路由表

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{NormalizedStatus, Provider, Transaction};

/// 网关调用失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    /// 缺少必需的服务商配置
    Configuration,
    /// 网络错误或超时
    Network,
    /// 服务商返回非2xx状态
    Http,
    /// 响应不是合法JSON
    MalformedResponse,
    /// 响应缺少必需字段
    MissingField,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatewayErrorKind::Configuration => "configuration",
            GatewayErrorKind::Network => "network",
            GatewayErrorKind::Http => "http",
            GatewayErrorKind::MalformedResponse => "malformed_response",
            GatewayErrorKind::MissingField => "missing_field",
        };
        f.write_str(name)
    }
}

/// 网关调用失败
///
/// 作为值返回给调用方，`raw` 保存服务商的原始响应 (若有)。
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct GatewayFailure {
    pub kind: GatewayErrorKind,
    pub message: String,
    /// 服务商返回的HTTP状态码
    pub status_code: Option<u16>,
    pub raw: Value,
}

impl GatewayFailure {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            raw: Value::Null,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// 写入服务商数据日志的表示
    pub fn to_log_value(&self) -> Value {
        json!({
            "error": self.message,
            "kind": self.kind,
            "status_code": self.status_code,
            "raw": self.raw,
        })
    }
}

/// 创建成功的支付意图
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedIntent {
    /// 支付页面地址
    pub payment_url: String,
    /// 服务商侧标识
    pub external_id: Option<String>,
    /// 服务商原始响应
    pub raw: Value,
}

/// 查询得到的支付意图状态
#[derive(Debug, Clone, PartialEq)]
pub struct IntentStatus {
    pub status: NormalizedStatus,
    pub raw: Value,
}

/// 支付服务商接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// 为交易创建支付意图
    async fn create_intent(&self, transaction: &Transaction) -> Result<CreatedIntent, GatewayFailure>;

    /// 查询支付意图的当前状态
    async fn query_intent(&self, external_id: &str) -> Result<IntentStatus, GatewayFailure>;
}

/// 单个服务商的路由信息
#[derive(Clone)]
pub struct ProviderRoute {
    pub gateway: Arc<dyn PaymentGateway>,
    /// Webhook签名共享密钥
    pub webhook_secret: String,
}

/// 服务商路由表
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    routes: HashMap<Provider, ProviderRoute>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册服务商
    pub fn register(
        mut self,
        provider: Provider,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        self.routes.insert(
            provider,
            ProviderRoute {
                gateway,
                webhook_secret: webhook_secret.into(),
            },
        );
        self
    }

    pub fn route(&self, provider: Provider) -> Option<&ProviderRoute> {
        self.routes.get(&provider)
    }

    /// 根据外部名称 (含旧版别名) 查找已注册的服务商
    pub fn resolve(&self, name: &str) -> Option<(Provider, &ProviderRoute)> {
        let provider = Provider::resolve(name)?;
        self.route(provider).map(|route| (provider, route))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_aliases() {
        let registry = ProviderRegistry::new().register(
            Provider::Yengapay,
            Arc::new(MockPaymentGateway::new()),
            "secret",
        );

        let (provider, route) = registry.resolve("orange_money").unwrap();
        assert_eq!(provider, Provider::Yengapay);
        assert_eq!(route.webhook_secret, "secret");
        assert!(registry.resolve("moov_money").is_some());
        assert!(registry.resolve("stripe").is_none());
    }

    #[test]
    fn test_empty_registry_resolves_nothing() {
        assert!(ProviderRegistry::new().resolve("yengapay").is_none());
    }

    #[test]
    fn test_failure_log_value() {
        let failure = GatewayFailure::new(GatewayErrorKind::Http, "YengaPay returned HTTP 500")
            .with_status(500)
            .with_raw(json!({"body": "boom"}));

        let value = failure.to_log_value();
        assert_eq!(value["kind"], "http");
        assert_eq!(value["status_code"], 500);
        assert_eq!(value["raw"]["body"], "boom");
        assert_eq!(failure.to_string(), "http: YengaPay returned HTTP 500");
    }
}
