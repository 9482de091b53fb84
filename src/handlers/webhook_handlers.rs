// Webhook回调API处理器
// 接收支付服务商的异步支付结果通知

use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};

use crate::error::PaymentError;
use crate::models::{ApiResponse, Provider, WebhookAck, WebhookOutcome};
use crate::state::AppState;
use crate::utils::extract_signature;

/// 接收服务商回调
///
/// POST /api/v1/payments/webhooks/{provider}
///
/// 签名通过 `X-Webhook-Hash` (或 `X-Signature` / `Signature`) 请求头提供
/// 响应: WebhookAck
pub async fn receive_webhook(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    handle_webhook(&data, &path.into_inner(), &body, &req).await
}

/// 旧版单一回调地址，默认路由到YengaPay
///
/// POST /api/v1/payments/webhook
pub async fn receive_default_webhook(
    data: web::Data<AppState>,
    body: web::Bytes,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    handle_webhook(&data, Provider::DEFAULT.as_str(), &body, &req).await
}

async fn handle_webhook(
    data: &AppState,
    provider: &str,
    body: &[u8],
    req: &HttpRequest,
) -> ActixResult<HttpResponse> {
    let signature = extract_signature(req);

    match data
        .webhooks
        .process(provider, body, signature.as_deref())
        .await?
    {
        WebhookOutcome::Processed {
            transaction,
            transitioned,
        } => Ok(HttpResponse::Ok().json(ApiResponse::success(WebhookAck {
            reference: transaction.reference,
            status: transaction.status,
            transitioned,
        }))),
        WebhookOutcome::Unmatched { reference } => {
            Err(PaymentError::NotFound(format!("transaction {}", reference)).into())
        }
        WebhookOutcome::Unauthorized { reference } => {
            Err(PaymentError::SignatureInvalid(reference).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Demande, RequestStatus, RequesterContact, Transaction, TransactionStatus};
    use crate::routes::api_v1_routes;
    use crate::services::{
        MemoryRequestLinkage, MemoryTransactionStore, MockNotificationGateway,
        MockPaymentGateway, TransactionStore,
    };
    use crate::state::TEST_WEBHOOK_SECRET;
    use crate::utils::sign;
    use actix_web::{test, App};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use std::sync::Arc;

    async fn setup(
        notifier: MockNotificationGateway,
    ) -> (AppState, Arc<MemoryTransactionStore>, Arc<MemoryRequestLinkage>, Transaction) {
        let requests = Arc::new(MemoryRequestLinkage::new());
        requests
            .insert(Demande {
                id: 9,
                owner_id: 4,
                status: RequestStatus::AwaitingPayment,
                total_amount: Decimal::new(5000, 0),
                contact: RequesterContact {
                    first_name: Some("Issa".to_string()),
                    phone: Some("76000000".to_string()),
                    ..Default::default()
                },
            })
            .unwrap();
        let store = Arc::new(MemoryTransactionStore::new(requests.clone()));
        let transaction = store
            .create(9, Decimal::new(5000, 0), crate::models::Provider::Yengapay)
            .await
            .unwrap();

        let state = AppState::new_for_test(
            requests.clone(),
            store.clone(),
            MockPaymentGateway::new(),
            notifier,
        );
        (state, store, requests, transaction)
    }

    fn webhook_request(uri: &str, payload: &Value, signature: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header(("Content-Type", "application/json"))
            .insert_header(("X-Webhook-Hash", signature))
            .set_payload(serde_json::to_vec(payload).unwrap())
    }

    #[actix_web::test]
    async fn test_webhook_flow_is_idempotent() {
        let mut notifier = MockNotificationGateway::new();
        notifier
            .expect_send_payment_confirmation()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let (state, store, requests, tx) = setup(notifier).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(api_v1_routes()),
        )
        .await;

        let payload = json!({"reference": tx.reference, "paymentStatus": "DONE", "amount": 5000});
        let signature = sign(TEST_WEBHOOK_SECRET, &payload).unwrap();

        let req = webhook_request("/api/v1/payments/webhooks/yengapay", &payload, &signature).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "validated");
        assert_eq!(body["data"]["transitioned"], true);

        let req = webhook_request("/api/v1/payments/webhook", &payload, &signature).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["transitioned"], false);

        let stored = store.find_by_reference(&tx.reference).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Validated);
        assert_eq!(
            requests.status_of(9).unwrap(),
            Some(RequestStatus::AwaitingProcessing)
        );
    }

    #[actix_web::test]
    async fn test_webhook_wrong_signature_is_401() {
        let mut notifier = MockNotificationGateway::new();
        notifier.expect_send_payment_confirmation().times(0);
        let (state, store, _, tx) = setup(notifier).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(api_v1_routes()),
        )
        .await;

        let payload = json!({"reference": tx.reference, "paymentStatus": "DONE"});
        let signature = sign("someone-else", &payload).unwrap();

        let req = webhook_request("/api/v1/payments/webhooks/yengapay", &payload, &signature).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);

        let stored = store.find_by_reference(&tx.reference).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Initiated);
    }

    #[actix_web::test]
    async fn test_webhook_error_statuses() {
        let mut notifier = MockNotificationGateway::new();
        notifier.expect_send_payment_confirmation().times(0);
        let (state, _, _, _) = setup(notifier).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(api_v1_routes()),
        )
        .await;

        let unknown = json!({"reference": "TXN-0-UNKNOWN0", "paymentStatus": "DONE"});
        let signature = sign(TEST_WEBHOOK_SECRET, &unknown).unwrap();
        let req = webhook_request("/api/v1/payments/webhooks/yengapay", &unknown, &signature).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);

        let req = webhook_request("/api/v1/payments/webhooks/cinetpay", &unknown, &signature).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);

        let no_reference = json!({"paymentStatus": "DONE"});
        let req = webhook_request("/api/v1/payments/webhooks/yengapay", &no_reference, "00").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }
}
