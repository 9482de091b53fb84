// 支付API处理器
// 处理支付发起、状态查询、交易详情与支付回跳等HTTP请求

use actix_web::{http::header, web, HttpRequest, HttpResponse, Result as ActixResult};

use crate::models::{
    ApiResponse, InitiatePaymentRequest, InitiatePaymentResponse, PaymentCallbackQuery,
    TransactionResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::state::AppState;
use crate::utils::extract_user_id;

/// 发起支付
///
/// POST /api/v1/payments/initiate
///
/// 需要 `X-User-Id` 请求头
/// 请求体: InitiatePaymentRequest
/// 响应: InitiatePaymentResponse
pub async fn initiate_payment(
    data: web::Data<AppState>,
    request: web::Json<InitiatePaymentRequest>,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    let user_id = extract_user_id(&req)?;
    let request = request.into_inner();

    let initiated = data
        .payments
        .initiate(user_id, request.demande_id, &request.provider)
        .await?;

    let response = InitiatePaymentResponse {
        transaction: TransactionResponse::from(&initiated.transaction),
        payment_url: initiated.payment_url,
        external_id: initiated.transaction.external_id.clone(),
    };

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        "Payment initiated",
        response,
    )))
}

/// 主动查询支付状态
///
/// POST /api/v1/payments/verify
///
/// 需要 `X-User-Id` 请求头
/// 请求体: VerifyPaymentRequest
/// 响应: VerifyPaymentResponse
pub async fn verify_payment(
    data: web::Data<AppState>,
    request: web::Json<VerifyPaymentRequest>,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    let user_id = extract_user_id(&req)?;

    let verification = data
        .payments
        .verify(user_id, request.transaction_reference.trim())
        .await?;

    let response = VerifyPaymentResponse {
        transaction: TransactionResponse::from(&verification.update.transaction),
        provider_status: verification.provider_status,
        transitioned: verification.update.transitioned,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

/// 获取交易详情
///
/// GET /api/v1/payments/transactions/{reference}
///
/// 需要 `X-User-Id` 请求头
/// 响应: TransactionResponse
pub async fn get_transaction(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    let user_id = extract_user_id(&req)?;
    let reference = path.into_inner();

    let transaction = data.payments.get_for_owner(user_id, &reference).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(TransactionResponse::from(&transaction))))
}

/// 支付页面回跳
///
/// GET /api/v1/payments/callback?transaction_id=...
///
/// 无需认证，302跳转到前端结果页
pub async fn payment_callback(
    data: web::Data<AppState>,
    query: web::Query<PaymentCallbackQuery>,
) -> HttpResponse {
    let location = data
        .payments
        .return_redirect(query.transaction_id.as_deref())
        .await;

    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}
