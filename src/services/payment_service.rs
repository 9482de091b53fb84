// 支付服务
// 负责发起支付、主动查询支付状态、交易查询与支付回跳等核心业务逻辑

use std::sync::Arc;

use crate::config::FrontendConfig;
use crate::error::{PaymentError, PaymentResult};
use crate::models::{NormalizedStatus, ProviderEvent, Transaction, TransactionStatus};
use crate::services::{
    ConfirmationService, ProviderRegistry, RequestLinkage, StatusUpdate, TransactionStore,
};
use crate::utils::{validate_reference, validate_request_id};

/// 已发起的支付
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub transaction: Transaction,
    /// 付款人需要跳转的支付页面
    pub payment_url: String,
}

/// 主动查询的结果
#[derive(Debug, Clone)]
pub struct Verification {
    pub update: StatusUpdate,
    /// 服务商报告的归一化状态
    pub provider_status: NormalizedStatus,
}

/// 支付服务
pub struct PaymentService {
    store: Arc<dyn TransactionStore>,
    requests: Arc<dyn RequestLinkage>,
    providers: ProviderRegistry,
    confirmations: ConfirmationService,
    frontend: FrontendConfig,
}

impl PaymentService {
    /// 创建新的支付服务实例
    pub fn new(
        store: Arc<dyn TransactionStore>,
        requests: Arc<dyn RequestLinkage>,
        providers: ProviderRegistry,
        confirmations: ConfirmationService,
        frontend: FrontendConfig,
    ) -> Self {
        Self {
            store,
            requests,
            providers,
            confirmations,
            frontend,
        }
    }

    /// 为业务申请发起支付
    ///
    /// # Arguments
    /// * `user_id` - 调用方用户ID
    /// * `request_id` - 业务申请ID
    /// * `provider_name` - 服务商名称 (支持旧版别名)
    ///
    /// # Returns
    /// * 交易与支付页面地址
    pub async fn initiate(
        &self,
        user_id: i64,
        request_id: i64,
        provider_name: &str,
    ) -> PaymentResult<InitiatedPayment> {
        validate_request_id(request_id).map_err(|e| PaymentError::Validation(e.to_string()))?;

        let (provider, route) = self.providers.resolve(provider_name).ok_or_else(|| {
            PaymentError::Validation(format!("unsupported payment provider: {}", provider_name))
        })?;

        let demande = self
            .requests
            .find_request(request_id)
            .await?
            .filter(|d| d.is_owned_by(user_id))
            .ok_or_else(|| PaymentError::NotFound(format!("request {}", request_id)))?;

        let transaction = self
            .store
            .create(request_id, demande.total_amount, provider)
            .await?;

        match route.gateway.create_intent(&transaction).await {
            Ok(intent) => {
                let transaction = self
                    .store
                    .attach_intent(
                        &transaction.reference,
                        intent.external_id.as_deref(),
                        ProviderEvent::new("intent_created", intent.raw),
                    )
                    .await?;

                log::info!(
                    "Payment {} started for request {} via {}",
                    transaction.reference,
                    request_id,
                    provider.display_name()
                );

                Ok(InitiatedPayment {
                    transaction,
                    payment_url: intent.payment_url,
                })
            }
            Err(failure) => {
                log::error!(
                    "Failed to create payment intent for {}: {}",
                    transaction.reference,
                    failure
                );

                self.store
                    .apply_status(
                        &transaction.reference,
                        NormalizedStatus::Failed,
                        ProviderEvent::new("intent_failed", failure.to_log_value()),
                    )
                    .await?;

                Err(PaymentError::PaymentNotStarted(failure.message))
            }
        }
    }

    /// 主动向服务商查询支付状态
    ///
    /// 与Webhook路径共用状态机，首次进入成功状态时执行相同的副作用。
    pub async fn verify(&self, user_id: i64, reference: &str) -> PaymentResult<Verification> {
        let transaction = self.get_for_owner(user_id, reference).await?;

        let external_id = transaction.external_id.as_deref().ok_or_else(|| {
            PaymentError::Validation(format!(
                "transaction {} has no provider identifier yet",
                reference
            ))
        })?;

        let route = self.providers.route(transaction.provider).ok_or_else(|| {
            PaymentError::Configuration(format!(
                "payment provider {} is not registered",
                transaction.provider
            ))
        })?;

        let intent = route.gateway.query_intent(external_id).await?;

        let update = self
            .store
            .apply_status(
                &transaction.reference,
                intent.status,
                ProviderEvent::new("verification", intent.raw),
            )
            .await?;

        if update.newly_validated() {
            self.confirmations.on_payment_validated(&update.transaction).await;
        }

        Ok(Verification {
            update,
            provider_status: intent.status,
        })
    }

    /// 查询调用方拥有的交易
    pub async fn get_for_owner(&self, user_id: i64, reference: &str) -> PaymentResult<Transaction> {
        let transaction = self.store.find_by_reference(reference).await?;

        let owned = self
            .requests
            .find_request(transaction.request_id)
            .await?
            .map(|d| d.is_owned_by(user_id))
            .unwrap_or(false);

        if !owned {
            return Err(PaymentError::NotFound(format!("transaction {}", reference)));
        }

        Ok(transaction)
    }

    /// 付款人从支付页面返回后的跳转地址
    pub async fn return_redirect(&self, reference: Option<&str>) -> String {
        let reference = match reference.map(str::trim) {
            Some(reference) if validate_reference(reference) => reference,
            Some(reference) => {
                log::warn!("Payment return with malformed reference {:?}", reference);
                return self.frontend.payment_page("error");
            }
            None => return self.frontend.payment_page("error"),
        };

        match self.store.find_by_reference(reference).await {
            Ok(transaction) => {
                let outcome = match transaction.status {
                    TransactionStatus::Validated => "success",
                    TransactionStatus::Failed => "failed",
                    TransactionStatus::Initiated | TransactionStatus::Pending => "pending",
                };
                self.frontend
                    .payment_page(&format!("{}/{}", outcome, transaction.reference))
            }
            Err(e) => {
                log::warn!("Payment return for unknown transaction {}: {}", reference, e);
                self.frontend.payment_page("error")
            }
        }
    }
}
