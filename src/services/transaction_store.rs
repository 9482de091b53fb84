// 交易存储
// 定义交易持久化接口，并提供基于互斥锁的内存实现

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{PaymentError, PaymentResult};
use crate::models::{
    NormalizedStatus, Provider, ProviderEvent, Transaction, TransactionStatus,
};
use crate::services::RequestLinkage;

/// 状态更新结果
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// 更新后的交易
    pub transaction: Transaction,
    /// 本次调用是否引起了状态迁移
    pub transitioned: bool,
}

impl StatusUpdate {
    /// 本次调用是否首次进入成功状态
    pub fn newly_validated(&self) -> bool {
        self.transitioned && self.transaction.status == TransactionStatus::Validated
    }
}

/// 交易存储接口
///
/// `apply_status` 是唯一的串行化点：同一参考号的并发调用中至多一个返回
/// `transitioned = true`。
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// 为等待支付的申请创建交易
    async fn create(
        &self,
        request_id: i64,
        amount: Decimal,
        provider: Provider,
    ) -> PaymentResult<Transaction>;

    /// 按参考号查询交易
    async fn find_by_reference(&self, reference: &str) -> PaymentResult<Transaction>;

    /// 查询申请当前未失败的交易
    async fn find_active_for_request(&self, request_id: i64) -> PaymentResult<Option<Transaction>>;

    /// 记录服务商支付意图，状态不变
    async fn attach_intent(
        &self,
        reference: &str,
        external_id: Option<&str>,
        event: ProviderEvent,
    ) -> PaymentResult<Transaction>;

    /// 应用服务商报告的状态
    async fn apply_status(
        &self,
        reference: &str,
        status: NormalizedStatus,
        event: ProviderEvent,
    ) -> PaymentResult<StatusUpdate>;
}

/// 创建交易前的公共校验
pub(crate) fn ensure_positive_amount(amount: &Decimal) -> PaymentResult<()> {
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(PaymentError::Validation(format!(
            "Payment amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

/// 内存交易存储
///
/// 所有读写都在同一把锁内完成，锁内不跨越await点。
pub struct MemoryTransactionStore {
    requests: Arc<dyn RequestLinkage>,
    transactions: Mutex<HashMap<String, Transaction>>,
}

impl MemoryTransactionStore {
    pub fn new(requests: Arc<dyn RequestLinkage>) -> Self {
        Self {
            requests,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> PaymentResult<MutexGuard<'_, HashMap<String, Transaction>>> {
        self.transactions
            .lock()
            .map_err(|_| PaymentError::Internal("transaction store lock poisoned".to_string()))
    }
}

fn not_found(reference: &str) -> PaymentError {
    PaymentError::NotFound(format!("transaction {}", reference))
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn create(
        &self,
        request_id: i64,
        amount: Decimal,
        provider: Provider,
    ) -> PaymentResult<Transaction> {
        ensure_positive_amount(&amount)?;

        let demande = self
            .requests
            .find_request(request_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("request {}", request_id)))?;

        if !demande.is_awaiting_payment() {
            return Err(PaymentError::InvalidRequestState {
                request_id,
                status: demande.status.as_code().to_string(),
            });
        }

        let mut transactions = self.lock()?;
        let has_active = transactions
            .values()
            .any(|t| t.request_id == request_id && t.status != TransactionStatus::Failed);
        if has_active {
            return Err(PaymentError::DuplicateTransaction(request_id));
        }

        let transaction = Transaction::new(request_id, amount, provider);
        transactions.insert(transaction.reference.clone(), transaction.clone());

        log::info!(
            "Created transaction {} for request {} ({} FCFA)",
            transaction.reference,
            request_id,
            amount
        );
        Ok(transaction)
    }

    async fn find_by_reference(&self, reference: &str) -> PaymentResult<Transaction> {
        let transactions = self.lock()?;
        transactions
            .get(reference)
            .cloned()
            .ok_or_else(|| not_found(reference))
    }

    async fn find_active_for_request(&self, request_id: i64) -> PaymentResult<Option<Transaction>> {
        let transactions = self.lock()?;
        Ok(transactions
            .values()
            .find(|t| t.request_id == request_id && t.status != TransactionStatus::Failed)
            .cloned())
    }

    async fn attach_intent(
        &self,
        reference: &str,
        external_id: Option<&str>,
        event: ProviderEvent,
    ) -> PaymentResult<Transaction> {
        let mut transactions = self.lock()?;
        let transaction = transactions
            .get_mut(reference)
            .ok_or_else(|| not_found(reference))?;

        transaction.attach_intent(external_id, &event, Utc::now());
        Ok(transaction.clone())
    }

    async fn apply_status(
        &self,
        reference: &str,
        status: NormalizedStatus,
        event: ProviderEvent,
    ) -> PaymentResult<StatusUpdate> {
        let mut transactions = self.lock()?;
        let transaction = transactions
            .get_mut(reference)
            .ok_or_else(|| not_found(reference))?;

        let transitioned = transaction.apply_status(status, &event, Utc::now());
        Ok(StatusUpdate {
            transaction: transaction.clone(),
            transitioned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Demande, RequestStatus, RequesterContact};
    use crate::services::MemoryRequestLinkage;
    use serde_json::json;

    fn store_with_request(status: RequestStatus) -> (Arc<MemoryRequestLinkage>, MemoryTransactionStore) {
        let linkage = Arc::new(MemoryRequestLinkage::new());
        linkage
            .insert(Demande {
                id: 10,
                owner_id: 1,
                status,
                total_amount: Decimal::new(5000, 0),
                contact: RequesterContact::default(),
            })
            .unwrap();
        let store = MemoryTransactionStore::new(linkage.clone());
        (linkage, store)
    }

    fn event(name: &str) -> ProviderEvent {
        ProviderEvent::new(name, json!({"source": name}))
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let (_, store) = store_with_request(RequestStatus::AwaitingPayment);
        let tx = store
            .create(10, Decimal::new(5000, 0), Provider::Yengapay)
            .await
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Initiated);
        let found = store.find_by_reference(&tx.reference).await.unwrap();
        assert_eq!(found.id, tx.id);
        let active = store.find_active_for_request(10).await.unwrap().unwrap();
        assert_eq!(active.reference, tx.reference);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_active_transaction() {
        let (_, store) = store_with_request(RequestStatus::AwaitingPayment);
        store
            .create(10, Decimal::new(5000, 0), Provider::Yengapay)
            .await
            .unwrap();

        let err = store
            .create(10, Decimal::new(5000, 0), Provider::Yengapay)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateTransaction(10)));
    }

    #[tokio::test]
    async fn test_failed_transaction_allows_retry() {
        let (_, store) = store_with_request(RequestStatus::AwaitingPayment);
        let first = store
            .create(10, Decimal::new(5000, 0), Provider::Yengapay)
            .await
            .unwrap();
        store
            .apply_status(&first.reference, NormalizedStatus::Failed, event("intent_failed"))
            .await
            .unwrap();

        let second = store
            .create(10, Decimal::new(5000, 0), Provider::Yengapay)
            .await
            .unwrap();
        assert_ne!(first.reference, second.reference);
    }

    #[tokio::test]
    async fn test_create_requires_awaiting_payment() {
        let (_, store) = store_with_request(RequestStatus::AwaitingProcessing);
        let err = store
            .create(10, Decimal::new(5000, 0), Provider::Yengapay)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidRequestState { request_id: 10, .. }));

        let err = store
            .create(99, Decimal::new(5000, 0), Provider::Yengapay)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_non_positive_amount() {
        let (_, store) = store_with_request(RequestStatus::AwaitingPayment);
        let err = store
            .create(10, Decimal::ZERO, Provider::Yengapay)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_reference() {
        let (_, store) = store_with_request(RequestStatus::AwaitingPayment);
        assert!(matches!(
            store.find_by_reference("TXN-0-NOPE0000").await,
            Err(PaymentError::NotFound(_))
        ));
        assert!(matches!(
            store
                .apply_status("TXN-0-NOPE0000", NormalizedStatus::Validated, event("webhook"))
                .await,
            Err(PaymentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_attach_intent_keeps_status() {
        let (_, store) = store_with_request(RequestStatus::AwaitingPayment);
        let tx = store
            .create(10, Decimal::new(5000, 0), Provider::Yengapay)
            .await
            .unwrap();

        let updated = store
            .attach_intent(&tx.reference, Some("9912"), event("intent_created"))
            .await
            .unwrap();
        assert_eq!(updated.external_id.as_deref(), Some("9912"));
        assert_eq!(updated.status, TransactionStatus::Initiated);
        assert_eq!(updated.raw_provider_data.events(), vec!["intent_created"]);
    }

    #[tokio::test]
    async fn test_repeated_validation_transitions_once() {
        let (_, store) = store_with_request(RequestStatus::AwaitingPayment);
        let tx = store
            .create(10, Decimal::new(5000, 0), Provider::Yengapay)
            .await
            .unwrap();

        let first = store
            .apply_status(&tx.reference, NormalizedStatus::Validated, event("webhook_yengapay"))
            .await
            .unwrap();
        let second = store
            .apply_status(&tx.reference, NormalizedStatus::Validated, event("webhook_yengapay"))
            .await
            .unwrap();

        assert!(first.newly_validated());
        assert!(!second.transitioned);
        assert_eq!(second.transaction.validated_at, first.transaction.validated_at);
        assert_eq!(second.transaction.raw_provider_data.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_validation_transitions_exactly_once() {
        let (_, store) = store_with_request(RequestStatus::AwaitingPayment);
        let store = Arc::new(store);
        let tx = store
            .create(10, Decimal::new(5000, 0), Provider::Yengapay)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let reference = tx.reference.clone();
            let status = if i % 4 == 3 {
                NormalizedStatus::Failed
            } else {
                NormalizedStatus::Validated
            };
            handles.push(tokio::spawn(async move {
                store
                    .apply_status(&reference, status, event("webhook_yengapay"))
                    .await
                    .unwrap()
            }));
        }

        let mut transitions = 0;
        for handle in handles {
            if handle.await.unwrap().transitioned {
                transitions += 1;
            }
        }

        assert_eq!(transitions, 1);
        let stored = store.find_by_reference(&tx.reference).await.unwrap();
        assert!(stored.is_terminal());
        assert_eq!(stored.raw_provider_data.len(), 16);
    }
}
