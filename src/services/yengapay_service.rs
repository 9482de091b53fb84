// YengaPay支付网关客户端
// 负责创建支付意图 (间接支付) 与查询支付意图状态

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::YengapayConfig;
use crate::models::{NormalizedStatus, Transaction, INTENT_STATUS_FIELDS};
use crate::services::gateway_service::{
    CreatedIntent, GatewayErrorKind, GatewayFailure, IntentStatus, PaymentGateway,
};

/// 支付页面地址字段
const PAYMENT_URL_FIELD: &str = "checkoutPageUrlWithPaymentToken";

/// YengaPay客户端
pub struct YengapayClient {
    client: Client,
    config: YengapayConfig,
}

impl YengapayClient {
    /// 创建新的YengaPay客户端
    ///
    /// # Arguments
    /// * `config` - YengaPay配置
    ///
    /// # Returns
    /// * 客户端实例
    pub fn new(config: YengapayConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent("NotairesPay/1.0")
            .build()?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }

    fn intent_url(&self) -> String {
        format!(
            "{}/groups/{}/payment-intent/{}",
            self.base_url(),
            self.config.organization_id,
            self.config.project_id
        )
    }

    fn intent_status_url(&self, external_id: &str) -> String {
        format!(
            "{}/groups/{}/payment-intent/project/{}/intent/{}",
            self.base_url(),
            self.config.organization_id,
            self.config.project_id,
            external_id
        )
    }

    /// 检查必需配置，缺失时不发起网络请求
    fn ensure_configured(&self) -> Result<(), GatewayFailure> {
        let missing = self.config.missing_settings();
        if missing.is_empty() {
            return Ok(());
        }

        Err(GatewayFailure::new(
            GatewayErrorKind::Configuration,
            format!("YengaPay configuration missing: {}", missing.join(", ")),
        )
        .with_raw(json!({
            "missing": missing,
            "api_url": self.config.api_url,
        })))
    }

    /// 服务商收取的金额：交易金额的整数部分，不低于最小金额
    pub fn payable_amount(&self, amount: &Decimal) -> i64 {
        amount
            .trunc()
            .to_i64()
            .unwrap_or(0)
            .max(self.config.minimum_amount)
    }

    /// 构造创建支付意图的请求体
    pub fn build_intent_payload(&self, transaction: &Transaction) -> Value {
        let amount = self.payable_amount(&transaction.amount);
        json!({
            "paymentAmount": amount,
            "reference": transaction.reference,
            "articles": [
                {
                    "title": format!("Paiement Demande #{}", transaction.request_id),
                    "description": format!(
                        "Demande de service notarial - Ref: {}",
                        transaction.reference
                    ),
                    "price": amount,
                }
            ],
        })
    }

    /// 读取响应体，非2xx与非法JSON转换为失败
    async fn read_json(response: Response) -> Result<Value, GatewayFailure> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GatewayFailure::new(
                GatewayErrorKind::Network,
                format!("Failed to read YengaPay response: {}", e),
            )
        })?;

        if !status.is_success() {
            return Err(http_failure(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            GatewayFailure::new(
                GatewayErrorKind::MalformedResponse,
                format!("YengaPay returned invalid JSON: {}", e),
            )
            .with_status(status.as_u16())
            .with_raw(json!({ "body": body }))
        })
    }
}

fn http_failure(status: StatusCode, body: &str) -> GatewayFailure {
    let raw = serde_json::from_str::<Value>(body).unwrap_or_else(|_| json!({ "body": body }));
    GatewayFailure::new(
        GatewayErrorKind::Http,
        format!("YengaPay returned HTTP {}", status.as_u16()),
    )
    .with_status(status.as_u16())
    .with_raw(raw)
}

fn network_failure(err: reqwest::Error) -> GatewayFailure {
    let message = if err.is_timeout() {
        format!("YengaPay request timed out: {}", err)
    } else {
        format!("YengaPay request failed: {}", err)
    };
    GatewayFailure::new(GatewayErrorKind::Network, message)
}

/// 服务商标识可能是字符串或数字
fn external_id_of(data: &Value) -> Option<String> {
    match data.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for YengapayClient {
    async fn create_intent(&self, transaction: &Transaction) -> Result<CreatedIntent, GatewayFailure> {
        self.ensure_configured()?;

        let payload = self.build_intent_payload(transaction);
        log::info!(
            "Creating YengaPay payment intent for {} (amount: {})",
            transaction.reference,
            payload["paymentAmount"]
        );

        let response = self
            .client
            .post(self.intent_url())
            .header("x-api-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(network_failure)?;

        let data = Self::read_json(response).await?;

        let payment_url = match data.get(PAYMENT_URL_FIELD).and_then(Value::as_str) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                return Err(GatewayFailure::new(
                    GatewayErrorKind::MissingField,
                    format!("YengaPay response has no {}", PAYMENT_URL_FIELD),
                )
                .with_raw(data));
            }
        };

        Ok(CreatedIntent {
            payment_url,
            external_id: external_id_of(&data),
            raw: data,
        })
    }

    async fn query_intent(&self, external_id: &str) -> Result<IntentStatus, GatewayFailure> {
        self.ensure_configured()?;

        let response = self
            .client
            .get(self.intent_status_url(external_id))
            .header("x-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(network_failure)?;

        let data = Self::read_json(response).await?;
        let status = NormalizedStatus::from_payload(&data, INTENT_STATUS_FIELDS);
        log::debug!("YengaPay intent {} reported as {:?}", external_id, status);

        Ok(IntentStatus { status, raw: data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;
    use mockito::Matcher;

    fn config(api_url: &str) -> YengapayConfig {
        YengapayConfig {
            api_url: api_url.to_string(),
            api_key: "test-key".to_string(),
            organization_id: "org-1".to_string(),
            project_id: "77423".to_string(),
            webhook_secret: "whsec".to_string(),
            timeout: 5,
            minimum_amount: 200,
        }
    }

    fn transaction(amount: Decimal) -> Transaction {
        Transaction::new(17, amount, Provider::Yengapay)
    }

    #[test]
    fn test_payable_amount_truncates_and_floors() {
        let client = YengapayClient::new(config("http://localhost")).unwrap();
        assert_eq!(client.payable_amount(&Decimal::new(500075, 2)), 5000);
        assert_eq!(client.payable_amount(&Decimal::new(150, 0)), 200);
        assert_eq!(client.payable_amount(&Decimal::new(200, 0)), 200);
    }

    #[test]
    fn test_intent_payload_shape() {
        let client = YengapayClient::new(config("http://localhost")).unwrap();
        let tx = transaction(Decimal::new(5000, 0));
        let payload = client.build_intent_payload(&tx);

        assert_eq!(payload["paymentAmount"], 5000);
        assert_eq!(payload["reference"], tx.reference.as_str());
        assert_eq!(payload["articles"][0]["title"], "Paiement Demande #17");
        assert_eq!(
            payload["articles"][0]["description"],
            format!("Demande de service notarial - Ref: {}", tx.reference)
        );
        assert_eq!(payload["articles"][0]["price"], 5000);
    }

    #[tokio::test]
    async fn test_create_intent_success() {
        let mut server = mockito::Server::new_async().await;
        let tx = transaction(Decimal::new(5000, 0));
        let mock = server
            .mock("POST", "/groups/org-1/payment-intent/77423")
            .match_header("x-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "paymentAmount": 5000,
                "reference": tx.reference,
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 9912, "checkoutPageUrlWithPaymentToken": "https://checkout.yengapay.com/p/abc"}"#)
            .create_async()
            .await;

        let client = YengapayClient::new(config(&server.url())).unwrap();
        let intent = client.create_intent(&tx).await.unwrap();

        assert_eq!(intent.payment_url, "https://checkout.yengapay.com/p/abc");
        assert_eq!(intent.external_id.as_deref(), Some("9912"));
        assert_eq!(intent.raw["id"], 9912);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_intent_http_error_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/groups/org-1/payment-intent/77423")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "Invalid API key"}"#)
            .create_async()
            .await;

        let client = YengapayClient::new(config(&server.url())).unwrap();
        let failure = client
            .create_intent(&transaction(Decimal::new(5000, 0)))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, GatewayErrorKind::Http);
        assert_eq!(failure.status_code, Some(401));
        assert_eq!(failure.raw["message"], "Invalid API key");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_intent_missing_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/groups/org-1/payment-intent/77423")
            .with_status(200)
            .with_body(r#"{"id": "abc"}"#)
            .create_async()
            .await;

        let client = YengapayClient::new(config(&server.url())).unwrap();
        let failure = client
            .create_intent(&transaction(Decimal::new(5000, 0)))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, GatewayErrorKind::MissingField);
        assert_eq!(failure.raw["id"], "abc");
    }

    #[tokio::test]
    async fn test_create_intent_malformed_json() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/groups/org-1/payment-intent/77423")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = YengapayClient::new(config(&server.url())).unwrap();
        let failure = client
            .create_intent(&transaction(Decimal::new(5000, 0)))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, GatewayErrorKind::MalformedResponse);
        assert_eq!(failure.raw["body"], "<html>maintenance</html>");
    }

    #[tokio::test]
    async fn test_missing_configuration_makes_no_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut cfg = config(&server.url());
        cfg.organization_id = String::new();
        let client = YengapayClient::new(cfg).unwrap();
        let failure = client
            .create_intent(&transaction(Decimal::new(5000, 0)))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, GatewayErrorKind::Configuration);
        assert!(failure.message.contains("YENGAPAY_ORGANIZATION_ID"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_network_failure() {
        let client = YengapayClient::new(config("http://127.0.0.1:1")).unwrap();
        let failure = client
            .create_intent(&transaction(Decimal::new(5000, 0)))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, GatewayErrorKind::Network);
    }

    #[tokio::test]
    async fn test_query_intent_reads_transaction_status_first() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/groups/org-1/payment-intent/project/77423/intent/9912")
            .match_header("x-api-key", "test-key")
            .with_status(200)
            .with_body(r#"{"id": 9912, "transactionStatus": "DONE", "paymentStatus": "PENDING"}"#)
            .create_async()
            .await;

        let client = YengapayClient::new(config(&server.url())).unwrap();
        let status = client.query_intent("9912").await.unwrap();

        assert_eq!(status.status, NormalizedStatus::Validated);
        assert_eq!(status.raw["id"], 9912);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_intent_unknown_status_is_pending() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/groups/org-1/payment-intent/project/77423/intent/42")
            .with_status(200)
            .with_body(r#"{"id": 42}"#)
            .create_async()
            .await;

        let client = YengapayClient::new(config(&server.url())).unwrap();
        let status = client.query_intent("42").await.unwrap();
        assert_eq!(status.status, NormalizedStatus::Pending);
    }
}
