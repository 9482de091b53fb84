// 应用状态管理
// 包含数据库连接池、配置信息以及组装好的支付服务

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::models::Provider;
use crate::services::{
    build_notification_gateway, ConfirmationService, NotificationGateway, PaymentService,
    PgRequestLinkage, PgTransactionStore, ProviderRegistry, RequestLinkage, TransactionStore,
    WebhookProcessor, YengapayClient,
};

/// 应用全局状态
pub struct AppState {
    /// 应用配置
    pub config: Config,
    /// 数据库连接池 (测试环境可为空)
    pub db_pool: Option<PgPool>,
    /// 支付服务
    pub payments: Arc<PaymentService>,
    /// Webhook处理器
    pub webhooks: Arc<WebhookProcessor>,
}

impl AppState {
    /// 使用给定组件组装应用状态
    ///
    /// # Arguments
    /// * `config` - 应用配置
    /// * `db_pool` - 数据库连接池
    /// * `store` - 交易存储
    /// * `requests` - 业务申请访问
    /// * `providers` - 服务商路由表
    /// * `notifier` - 通知发送
    pub fn assemble(
        config: Config,
        db_pool: Option<PgPool>,
        store: Arc<dyn TransactionStore>,
        requests: Arc<dyn RequestLinkage>,
        providers: ProviderRegistry,
        notifier: Arc<dyn NotificationGateway>,
    ) -> Self {
        let confirmations = ConfirmationService::new(requests.clone(), notifier);

        let payments = Arc::new(PaymentService::new(
            store.clone(),
            requests,
            providers.clone(),
            confirmations.clone(),
            config.frontend.clone(),
        ));
        let webhooks = Arc::new(WebhookProcessor::new(store, providers, confirmations));

        Self {
            config,
            db_pool,
            payments,
            webhooks,
        }
    }

    /// 根据配置创建生产环境的应用状态
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(Duration::from_secs(config.database.connect_timeout))
            .connect(&config.database.url)
            .await
            .context("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;

        let yengapay = YengapayClient::new(config.yengapay.clone())
            .context("Failed to create YengaPay client")?;
        let providers = ProviderRegistry::new().register(
            Provider::Yengapay,
            Arc::new(yengapay),
            config.yengapay.webhook_secret.clone(),
        );

        let notifier = build_notification_gateway(&config.sms)
            .context("Failed to create notification gateway")?;

        Ok(Self::assemble(
            config,
            Some(pool.clone()),
            Arc::new(PgTransactionStore::new(pool.clone())),
            Arc::new(PgRequestLinkage::new(pool)),
            providers,
            notifier,
        ))
    }

    /// 创建测试用的应用状态 (内存存储 + 模拟服务商)
    #[cfg(test)]
    pub fn new_for_test(
        requests: Arc<crate::services::MemoryRequestLinkage>,
        store: Arc<crate::services::MemoryTransactionStore>,
        gateway: crate::services::MockPaymentGateway,
        notifier: crate::services::MockNotificationGateway,
    ) -> Self {
        let mut config = Config::default();
        config.yengapay.webhook_secret = TEST_WEBHOOK_SECRET.to_string();
        config.frontend.url = "https://notaires.bf".to_string();

        let providers = ProviderRegistry::new().register(
            Provider::Yengapay,
            Arc::new(gateway),
            config.yengapay.webhook_secret.clone(),
        );

        Self::assemble(config, None, store, requests, providers, Arc::new(notifier))
    }
}

/// 测试环境的Webhook签名密钥
#[cfg(test)]
pub const TEST_WEBHOOK_SECRET: &str = "whsec-test";
