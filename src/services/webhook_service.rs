// Webhook回调处理服务
// 校验服务商回调签名，归一化支付状态并驱动交易状态机

use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{PaymentError, PaymentResult};
use crate::models::{ProviderEvent, WebhookEvent, WebhookOutcome};
use crate::services::{ConfirmationService, ProviderRegistry, TransactionStore};
use crate::utils::verify;

/// Webhook处理器
pub struct WebhookProcessor {
    store: Arc<dyn TransactionStore>,
    providers: ProviderRegistry,
    confirmations: ConfirmationService,
}

impl WebhookProcessor {
    /// 创建新的Webhook处理器
    ///
    /// # Arguments
    /// * `store` - 交易存储
    /// * `providers` - 服务商路由表 (含签名密钥)
    /// * `confirmations` - 支付成功后的副作用
    pub fn new(
        store: Arc<dyn TransactionStore>,
        providers: ProviderRegistry,
        confirmations: ConfirmationService,
    ) -> Self {
        Self {
            store,
            providers,
            confirmations,
        }
    }

    /// 处理一次服务商回调
    ///
    /// 同一载荷重复投递是安全的：只有首次进入成功状态时才会触发副作用。
    ///
    /// # Arguments
    /// * `provider_name` - 路由中的服务商名称
    /// * `body` - 原始请求体
    /// * `signature` - 请求头中的签名
    ///
    /// # Returns
    /// * 处理结果；未知服务商与非法载荷以错误返回
    pub async fn process(
        &self,
        provider_name: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookOutcome> {
        let (provider, route) = self.providers.resolve(provider_name).ok_or_else(|| {
            PaymentError::NotFound(format!("payment provider {}", provider_name))
        })?;

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| PaymentError::Validation(format!("webhook body is not valid JSON: {}", e)))?;
        let event = WebhookEvent::parse(provider, payload, signature.map(str::to_string))?;

        let transaction = match self.store.find_by_reference(&event.reference).await {
            Ok(transaction) => transaction,
            Err(PaymentError::NotFound(_)) => {
                log::warn!(
                    "Webhook from {} for unknown transaction {}",
                    provider,
                    event.reference
                );
                return Ok(WebhookOutcome::Unmatched {
                    reference: event.reference,
                });
            }
            Err(e) => return Err(e),
        };

        let signature = event.signature.as_deref().unwrap_or_default();
        if !verify(&route.webhook_secret, &event.body, signature) {
            log::warn!(
                "security: rejected {} webhook for {} (signature {})",
                provider,
                event.reference,
                if signature.is_empty() { "missing" } else { "mismatch" }
            );
            return Ok(WebhookOutcome::Unauthorized {
                reference: event.reference,
            });
        }

        let status = event.normalized_status();
        let entry = ProviderEvent {
            event: event.log_event_name(),
            received_at: event.received_at,
            data: json!({
                "body": event.body,
                "signature": event.signature,
            }),
        };

        let update = self
            .store
            .apply_status(&transaction.reference, status, entry)
            .await?;

        log::info!(
            "Webhook {} processed: {} -> {} (provider status: {}, transitioned: {})",
            provider,
            update.transaction.reference,
            update.transaction.status,
            event.provider_status.as_deref().unwrap_or("none"),
            update.transitioned
        );

        if update.newly_validated() {
            self.confirmations.on_payment_validated(&update.transaction).await;
        }

        Ok(WebhookOutcome::Processed {
            transaction: update.transaction,
            transitioned: update.transitioned,
        })
    }
}
