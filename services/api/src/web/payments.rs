//! services/api/src/web/payments.rs
//!
//! Payment endpoints for both providers. Paystack charges arrive twice
//! (browser verify and webhook) and M-Pesa confirmations arrive twice
//! (status poller and callback); every path funnels into the settlement
//! service, which collapses duplicates on the unique reference.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::adapters::paystack::verify_webhook_signature;
use crate::error::{port_reject, reject, HttpError};
use crate::web::state::AppState;
use lms_core::domain::{Course, CourseStatus, NewPayment, NewStkRequest, StkRequest, StkStatus};
use lms_core::settlement::{minor_to_major, SettlementOutcome};

/// How long the poller waits between Daraja status queries, and how many
/// queries it makes before handing the payment over to the callback and
/// the reconcile loop.
const STK_POLL_INTERVAL: Duration = Duration::from_secs(5);
const STK_POLL_ATTEMPTS: u32 = 12;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct PaystackInitializeRequest {
    pub course_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct PaystackInitializeResponse {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Serialize, ToSchema)]
pub struct PaystackVerifyResponse {
    pub reference: String,
    pub status: String,
    pub enrolled: bool,
}

#[derive(Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct MpesaInitiateRequest {
    pub course_id: Uuid,
    /// MSISDN in international format, e.g. 254712345678.
    pub phone_number: String,
}

#[derive(Serialize, ToSchema)]
pub struct MpesaInitiateResponse {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub checkout_request_id: String,
    /// "completed" once the charge is recorded, "pending" before that.
    pub status: String,
}

/// The event envelope Paystack posts to the webhook endpoint. Only
/// `charge.success` is acted on; every other event is acknowledged and
/// dropped.
#[derive(Deserialize)]
struct WebhookEvent {
    event: String,
    data: Option<WebhookCharge>,
}

#[derive(Deserialize)]
struct WebhookCharge {
    reference: String,
    /// Minor units, as everywhere on the Paystack wire.
    amount: i64,
    currency: String,
    channel: String,
    paid_at: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

//=========================================================================================
// Daraja Callback Wire Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct MpesaCallbackBody {
    #[serde(rename = "Body")]
    pub body: MpesaCallbackInner,
}

#[derive(Deserialize, ToSchema)]
pub struct MpesaCallbackInner {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Deserialize, ToSchema)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    /// 0 means the customer paid; anything else is a cancel or failure.
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata")]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Deserialize, ToSchema)]
pub struct CallbackMetadata {
    #[serde(rename = "Item")]
    pub item: Vec<CallbackItem>,
}

#[derive(Deserialize, ToSchema)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    /// String, number, or absent depending on the item.
    #[serde(rename = "Value", default)]
    #[schema(value_type = Option<Object>)]
    pub value: Option<serde_json::Value>,
}

/// Daraja expects this shape back from the callback URL.
#[derive(Serialize, ToSchema)]
pub struct MpesaCallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

//=========================================================================================
// Shared Checks
//=========================================================================================

/// A course someone can pay for: it exists, is published, and has a price.
async fn load_payable_course(state: &AppState, course_id: Uuid) -> Result<Course, HttpError> {
    let course = state.db.get_course(course_id).await.map_err(port_reject)?;
    if course.status != CourseStatus::Published {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Course is not open for enrollment",
        ));
    }
    if course.price <= Decimal::ZERO {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "This course is free; enroll directly",
        ));
    }
    Ok(course)
}

async fn ensure_not_enrolled(
    state: &AppState,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<(), HttpError> {
    let existing = state
        .db
        .get_enrollment(user_id, course_id)
        .await
        .map_err(port_reject)?;
    if matches!(existing, Some(ref e) if e.status == "active") {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Already enrolled in this course",
        ));
    }
    Ok(())
}

/// Pulls the user and course tagged at initialize time out of transaction
/// metadata.
fn metadata_ids(metadata: &Option<serde_json::Value>) -> Option<(Uuid, Uuid)> {
    let meta = metadata.as_ref()?;
    let user_id = meta
        .get("user_id")?
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())?;
    let course_id = meta
        .get("course_id")?
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())?;
    Some((user_id, course_id))
}

//=========================================================================================
// Paystack Handlers
//=========================================================================================

/// POST /api/paystack/initialize - Start a card checkout for a course
#[utoipa::path(
    post,
    path = "/api/paystack/initialize",
    request_body = PaystackInitializeRequest,
    responses(
        (status = 200, description = "Checkout created; redirect the browser to the authorization URL", body = PaystackInitializeResponse),
        (status = 400, description = "Course is free, unpublished, or already enrolled"),
        (status = 404, description = "No such user or course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn paystack_initialize_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<PaystackInitializeRequest>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. The payer must have a profile; the charge is keyed on their email
    let user = state.db.get_user(user_id).await.map_err(port_reject)?;

    // 2. The course must be payable and not already held
    let course = load_payable_course(&state, req.course_id).await?;
    ensure_not_enrolled(&state, user.id, course.id).await?;

    // 3. Paystack wants minor units
    let amount_minor = (course.price * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| {
            error!(course_id = %course.id, price = %course.price, "course price not representable in minor units");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Course price is out of range")
        })?;

    // 4. Create the checkout, tagging the user and course into metadata
    let init = state
        .card_gateway
        .initialize_transaction(
            &user.email,
            amount_minor,
            &course.currency,
            None,
            user.id,
            course.id,
        )
        .await
        .map_err(port_reject)?;

    Ok(Json(PaystackInitializeResponse {
        authorization_url: init.authorization_url,
        access_code: init.access_code,
        reference: init.reference,
    }))
}

/// GET /api/paystack/verify/{reference} - Confirm a charge and grant access
#[utoipa::path(
    get,
    path = "/api/paystack/verify/{reference}",
    params(("reference" = String, Path, description = "Transaction reference from initialize")),
    responses(
        (status = 200, description = "Charge confirmed and enrollment granted", body = PaystackVerifyResponse),
        (status = 400, description = "The charge was not successful or carries no course"),
        (status = 404, description = "No such user or transaction"),
        (status = 500, description = "Charge recorded but the grant could not be applied")
    )
)]
pub async fn paystack_verify_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. The payer must still have a profile to attach the payment to
    let user = state.db.get_user(user_id).await.map_err(port_reject)?;

    // 2. Ask Paystack what actually happened to this reference
    let charge = state
        .card_gateway
        .verify_transaction(&reference)
        .await
        .map_err(port_reject)?;
    if !charge.is_successful() {
        return Err(reject(StatusCode::BAD_REQUEST, "Payment was not successful"));
    }
    let course_id = charge.course_id.ok_or_else(|| {
        reject(
            StatusCode::BAD_REQUEST,
            "Transaction is not linked to a course",
        )
    })?;

    // 3. Record and grant; replays collapse on the reference
    let outcome = state
        .settlement
        .settle(NewPayment {
            user_id: user.id,
            course_id,
            reference: charge.reference.clone(),
            amount: minor_to_major(charge.amount_minor),
            currency: charge.currency,
            channel: charge.channel,
            plan_code: None,
            paid_at: charge.paid_at.unwrap_or_else(Utc::now),
        })
        .await
        .map_err(port_reject)?;

    match outcome {
        SettlementOutcome::Granted | SettlementOutcome::AlreadyProcessed => {
            Ok(Json(PaystackVerifyResponse {
                reference: charge.reference,
                status: "success".to_string(),
                enrolled: true,
            }))
        }
        SettlementOutcome::RecordedUnsettled { reason } => {
            error!(reference = %charge.reference, reason, "charge recorded but grant failed");
            Err(reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Payment recorded; enrollment will be granted shortly",
            ))
        }
    }
}

/// POST /api/paystack/webhook - Receive signed Paystack events
///
/// The signature is checked against the raw body before anything else
/// runs; an unsigned request never touches the database.
#[utoipa::path(
    post,
    path = "/api/paystack/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Body is not a valid event"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 500, description = "The payment could not be recorded; Paystack should retry")
    )
)]
pub async fn paystack_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, HttpError> {
    // 1. Authenticate the sender from the raw bytes
    let signature = headers
        .get("x-paystack-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Missing signature"))?;
    if !verify_webhook_signature(&state.config.paystack_secret_key, body.as_bytes(), signature) {
        return Err(reject(StatusCode::UNAUTHORIZED, "Invalid signature"));
    }

    // 2. Parse the event
    let event: WebhookEvent = serde_json::from_str(&body)
        .map_err(|_| reject(StatusCode::BAD_REQUEST, "Invalid webhook payload"))?;

    // 3. Everything except a successful charge is acknowledged and dropped
    if event.event != "charge.success" {
        info!(event = event.event, "ignoring webhook event");
        return Ok(Json(WebhookAck { received: true }));
    }
    let charge = event
        .data
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "Invalid webhook payload"))?;

    // 4. Charges made outside this platform carry no metadata; nothing to do
    let Some((user_id, course_id)) = metadata_ids(&charge.metadata) else {
        warn!(reference = charge.reference, "charge.success without metadata; skipping");
        return Ok(Json(WebhookAck { received: true }));
    };

    // 5. Record and grant. A storage failure returns 500 so Paystack
    //    redelivers the event.
    let outcome = state
        .settlement
        .settle(NewPayment {
            user_id,
            course_id,
            reference: charge.reference.clone(),
            amount: minor_to_major(charge.amount),
            currency: charge.currency,
            channel: charge.channel,
            plan_code: None,
            paid_at: charge.paid_at.unwrap_or_else(Utc::now),
        })
        .await
        .map_err(|e| {
            error!("failed to record webhook charge: {e}");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to record payment")
        })?;

    if let SettlementOutcome::RecordedUnsettled { reason } = &outcome {
        warn!(reference = charge.reference, reason, "webhook charge recorded unsettled");
    }
    Ok(Json(WebhookAck { received: true }))
}

//=========================================================================================
// M-Pesa Handlers
//=========================================================================================

/// POST /api/mpesa/initiate - Push an STK prompt to the customer's phone
#[utoipa::path(
    post,
    path = "/api/mpesa/initiate",
    request_body = MpesaInitiateRequest,
    responses(
        (status = 200, description = "Prompt sent; poll the status endpoint", body = MpesaInitiateResponse),
        (status = 400, description = "Course is free, unpublished, or already enrolled"),
        (status = 404, description = "No such user or course"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mpesa_initiate_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<MpesaInitiateRequest>,
) -> Result<impl IntoResponse, HttpError> {
    // 1. Same gates as the card flow
    let user = state.db.get_user(user_id).await.map_err(port_reject)?;
    let course = load_payable_course(&state, req.course_id).await?;
    ensure_not_enrolled(&state, user.id, course.id).await?;

    // 2. Fire the prompt. AccountReference is capped at 12 characters by
    //    Daraja, so it carries a short course tag rather than the id.
    let account_reference = format!("LMS-{}", &course.id.simple().to_string()[..8]);
    let handle = state
        .mobile_gateway
        .stk_push(&req.phone_number, course.price, &account_reference)
        .await
        .map_err(port_reject)?;

    // 3. Persist the context so the callback can resolve this push
    let request = state
        .db
        .record_stk_request(NewStkRequest {
            checkout_request_id: handle.checkout_request_id.clone(),
            merchant_request_id: handle.merchant_request_id.clone(),
            user_id: user.id,
            course_id: course.id,
            amount: course.price,
            currency: course.currency.clone(),
            phone_number: req.phone_number,
        })
        .await
        .map_err(port_reject)?;

    // 4. Poll in the background; the callback usually wins the race
    tokio::spawn(poll_stk_result(state.clone(), request));

    Ok(Json(MpesaInitiateResponse {
        merchant_request_id: handle.merchant_request_id,
        checkout_request_id: handle.checkout_request_id,
        message: "STK push sent; confirm the prompt on your handset".to_string(),
    }))
}

/// POST /api/mpesa/callback - Daraja's asynchronous payment confirmation
///
/// Always acknowledged with 200; Daraja does not retry, so any follow-up
/// for an unprocessable callback falls to the poller and reconcile loop.
#[utoipa::path(
    post,
    path = "/api/mpesa/callback",
    request_body = MpesaCallbackBody,
    responses(
        (status = 200, description = "Callback acknowledged", body = MpesaCallbackAck)
    )
)]
pub async fn mpesa_callback_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MpesaCallbackBody>,
) -> Json<MpesaCallbackAck> {
    let callback = body.body.stk_callback;

    // Resolve the push this callback belongs to
    match state.db.get_stk_request(&callback.checkout_request_id).await {
        Ok(Some(request)) => {
            if callback.result_code == 0 {
                if let Some(receipt) = receipt_number(&callback.callback_metadata) {
                    info!(
                        checkout_request_id = callback.checkout_request_id,
                        receipt, "mpesa payment confirmed by callback"
                    );
                }
                settle_stk_payment(&state, &request).await;
            } else {
                info!(
                    checkout_request_id = callback.checkout_request_id,
                    result_code = callback.result_code,
                    result_desc = callback.result_desc,
                    "mpesa payment not completed"
                );
            }
        }
        Ok(None) => {
            warn!(
                checkout_request_id = callback.checkout_request_id,
                "callback for an unknown checkout request"
            );
        }
        Err(e) => {
            error!("failed to load stk request for callback: {e}");
        }
    }

    Json(MpesaCallbackAck {
        result_code: 0,
        result_desc: "Accepted".to_string(),
    })
}

/// GET /api/mpesa/status/{checkout_request_id} - Client-facing payment state
#[utoipa::path(
    get,
    path = "/api/mpesa/status/{checkout_request_id}",
    params(("checkout_request_id" = String, Path, description = "Handle returned by initiate")),
    responses(
        (status = 200, description = "Current state of the push", body = PaymentStatusResponse),
        (status = 404, description = "No such checkout request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mpesa_status_handler(
    State(state): State<Arc<AppState>>,
    Path(checkout_request_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    // "completed" means the grant has been applied, not just that the
    // money arrived.
    if state
        .settlement
        .is_settled(&checkout_request_id)
        .await
        .map_err(port_reject)?
    {
        return Ok(Json(PaymentStatusResponse {
            checkout_request_id,
            status: "completed".to_string(),
        }));
    }

    let pending = state
        .db
        .get_stk_request(&checkout_request_id)
        .await
        .map_err(port_reject)?;
    if pending.is_none() {
        return Err(reject(
            StatusCode::NOT_FOUND,
            format!("checkout request {checkout_request_id} not found"),
        ));
    }
    Ok(Json(PaymentStatusResponse {
        checkout_request_id,
        status: "pending".to_string(),
    }))
}

//=========================================================================================
// STK Settlement Plumbing
//=========================================================================================

fn receipt_number(metadata: &Option<CallbackMetadata>) -> Option<String> {
    metadata.as_ref()?.item.iter().find_map(|item| {
        if item.name == "MpesaReceiptNumber" {
            item.value.as_ref()?.as_str().map(str::to_string)
        } else {
            None
        }
    })
}

/// Polls Daraja for the outcome of an STK push. The customer gets a few
/// minutes to complete the prompt; after that the callback or the
/// reconcile loop picks the payment up.
async fn poll_stk_result(state: Arc<AppState>, request: StkRequest) {
    for _ in 0..STK_POLL_ATTEMPTS {
        tokio::time::sleep(STK_POLL_INTERVAL).await;
        match state
            .mobile_gateway
            .query_status(&request.checkout_request_id)
            .await
        {
            Ok(StkStatus::Succeeded { receipt }) => {
                if let Some(receipt) = receipt {
                    info!(
                        checkout_request_id = request.checkout_request_id,
                        receipt, "mpesa payment confirmed by polling"
                    );
                }
                settle_stk_payment(&state, &request).await;
                return;
            }
            Ok(StkStatus::Failed { reason }) => {
                info!(
                    checkout_request_id = request.checkout_request_id,
                    reason, "mpesa payment failed"
                );
                return;
            }
            Ok(StkStatus::Pending) => {}
            Err(e) => {
                // Transient query failures just mean we ask again later.
                warn!("mpesa status query failed: {e}");
            }
        }
    }
    info!(
        checkout_request_id = request.checkout_request_id,
        "stopped polling; awaiting callback"
    );
}

/// Funnels a confirmed STK push into the settlement service. Runs from
/// the poller and the callback; whichever arrives second is a no-op.
async fn settle_stk_payment(state: &AppState, request: &StkRequest) {
    let charge = NewPayment {
        user_id: request.user_id,
        course_id: request.course_id,
        reference: request.checkout_request_id.clone(),
        amount: request.amount,
        currency: request.currency.clone(),
        channel: "mobile_money".to_string(),
        plan_code: None,
        paid_at: Utc::now(),
    };
    match state.settlement.settle(charge).await {
        Ok(SettlementOutcome::Granted) => {
            info!(
                checkout_request_id = request.checkout_request_id,
                "mpesa payment settled"
            );
        }
        Ok(SettlementOutcome::AlreadyProcessed) => {}
        Ok(SettlementOutcome::RecordedUnsettled { reason }) => {
            warn!(
                checkout_request_id = request.checkout_request_id,
                reason, "mpesa payment recorded unsettled"
            );
        }
        Err(e) => {
            error!(
                checkout_request_id = request.checkout_request_id,
                "failed to settle mpesa payment: {e}"
            );
        }
    }
}
