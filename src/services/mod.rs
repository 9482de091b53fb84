// 服务层模块
// 包含所有业务逻辑服务

pub mod confirmation_service;
pub mod gateway_service;
pub mod notification_service;
pub mod payment_service;
pub mod pg_transaction_store;
pub mod request_linkage;
pub mod transaction_store;
pub mod webhook_service;
pub mod yengapay_service;

// 重新导出服务
pub use confirmation_service::ConfirmationService;
pub use gateway_service::{
    CreatedIntent, GatewayErrorKind, GatewayFailure, IntentStatus, PaymentGateway,
    ProviderRegistry, ProviderRoute,
};
pub use notification_service::{
    build_notification_gateway, LogNotificationGateway, NotificationGateway,
    SmsNotificationGateway,
};
pub use payment_service::{InitiatedPayment, PaymentService, Verification};
pub use pg_transaction_store::PgTransactionStore;
pub use request_linkage::{MemoryRequestLinkage, PgRequestLinkage, RequestLinkage};
pub use transaction_store::{MemoryTransactionStore, StatusUpdate, TransactionStore};
pub use webhook_service::WebhookProcessor;
pub use yengapay_service::YengapayClient;

#[cfg(test)]
pub use gateway_service::MockPaymentGateway;
#[cfg(test)]
pub use notification_service::MockNotificationGateway;
#[cfg(test)]
pub use request_linkage::MockRequestLinkage;
