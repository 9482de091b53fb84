// 支付确认后续处理
// 交易首次进入成功状态后推进业务申请并通知申请人，失败只记录日志

use std::sync::Arc;

use crate::models::Transaction;
use crate::services::{NotificationGateway, RequestLinkage};

/// 支付确认服务
#[derive(Clone)]
pub struct ConfirmationService {
    requests: Arc<dyn RequestLinkage>,
    notifier: Arc<dyn NotificationGateway>,
}

impl ConfirmationService {
    pub fn new(requests: Arc<dyn RequestLinkage>, notifier: Arc<dyn NotificationGateway>) -> Self {
        Self { requests, notifier }
    }

    /// 执行支付成功后的副作用
    ///
    /// 仅应在 `transitioned` 且状态为成功时调用一次。任何错误都不会向上传播。
    pub async fn on_payment_validated(&self, transaction: &Transaction) {
        let request_id = transaction.request_id;

        if let Err(e) = self.requests.mark_awaiting_processing(request_id).await {
            log::error!(
                "Failed to move request {} to awaiting processing after {}: {}",
                request_id,
                transaction.reference,
                e
            );
        }

        let demande = match self.requests.find_request(request_id).await {
            Ok(Some(demande)) => demande,
            Ok(None) => {
                log::warn!(
                    "Request {} not found, skipping payment confirmation for {}",
                    request_id,
                    transaction.reference
                );
                return;
            }
            Err(e) => {
                log::error!(
                    "Failed to load request {} for payment confirmation: {}",
                    request_id,
                    e
                );
                return;
            }
        };

        if let Err(e) = self
            .notifier
            .send_payment_confirmation(&demande.contact, &transaction.reference, transaction.amount)
            .await
        {
            log::error!(
                "Failed to send payment confirmation for {}: {}",
                transaction.reference,
                e
            );
        }
    }
}
