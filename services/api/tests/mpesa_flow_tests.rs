//! services/api/tests/mpesa_flow_tests.rs
//!
//! STK push initiation, the Daraja callback, and the client-facing
//! status read, all over the in-memory store.

mod common;

use api_lib::web::payments::{
    mpesa_callback_handler, mpesa_initiate_handler, mpesa_status_handler, CallbackItem,
    CallbackMetadata, MpesaCallbackBody, MpesaCallbackInner, MpesaInitiateRequest, StkCallback,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use common::{body_json, harness, learner, trainer};
use lms_core::domain::StkStatus;
use lms_core::ports::DatabaseService;
use rust_decimal_macros::dec;

fn paid_callback(checkout_request_id: &str, merchant_request_id: &str) -> MpesaCallbackBody {
    MpesaCallbackBody {
        body: MpesaCallbackInner {
            stk_callback: StkCallback {
                merchant_request_id: merchant_request_id.to_string(),
                checkout_request_id: checkout_request_id.to_string(),
                result_code: 0,
                result_desc: "The service request is processed successfully.".to_string(),
                callback_metadata: Some(CallbackMetadata {
                    item: vec![
                        CallbackItem {
                            name: "Amount".to_string(),
                            value: Some(serde_json::json!(1800.0)),
                        },
                        CallbackItem {
                            name: "MpesaReceiptNumber".to_string(),
                            value: Some(serde_json::json!("QK12XYZ9AB")),
                        },
                        CallbackItem {
                            name: "PhoneNumber".to_string(),
                            value: Some(serde_json::json!(254712345678u64)),
                        },
                    ],
                }),
            },
        },
    }
}

fn cancelled_callback(checkout_request_id: &str, merchant_request_id: &str) -> MpesaCallbackBody {
    MpesaCallbackBody {
        body: MpesaCallbackInner {
            stk_callback: StkCallback {
                merchant_request_id: merchant_request_id.to_string(),
                checkout_request_id: checkout_request_id.to_string(),
                result_code: 1032,
                result_desc: "Request cancelled by user".to_string(),
                callback_metadata: None,
            },
        },
    }
}

#[tokio::test]
async fn initiate_records_context_and_reads_as_pending() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let payer = learner(&h.store).await;
    let course = common::published_course(&h.store, owner.id, dec!(1800.00)).await;

    let initiated = mpesa_initiate_handler(
        State(h.state.clone()),
        Extension(payer.id),
        Json(MpesaInitiateRequest {
            course_id: course.id,
            phone_number: "254712345678".to_string(),
        }),
    )
    .await
    .expect("initiate")
    .into_response();
    assert_eq!(initiated.status(), StatusCode::OK);
    let initiated = body_json(initiated).await;
    let checkout_id = initiated["checkout_request_id"].as_str().unwrap().to_string();

    let request = h
        .store
        .get_stk_request(&checkout_id)
        .await
        .expect("read stk request")
        .expect("context persisted");
    assert_eq!(request.user_id, payer.id);
    assert_eq!(request.course_id, course.id);
    assert_eq!(request.amount, dec!(1800.00));

    let status = mpesa_status_handler(State(h.state.clone()), Path(checkout_id))
        .await
        .expect("status")
        .into_response();
    assert_eq!(body_json(status).await["status"], "pending");
}

#[tokio::test]
async fn a_paid_callback_settles_and_completes_the_status() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let payer = learner(&h.store).await;
    let course = common::published_course(&h.store, owner.id, dec!(1800.00)).await;

    let initiated = mpesa_initiate_handler(
        State(h.state.clone()),
        Extension(payer.id),
        Json(MpesaInitiateRequest {
            course_id: course.id,
            phone_number: "254712345678".to_string(),
        }),
    )
    .await
    .expect("initiate")
    .into_response();
    let initiated = body_json(initiated).await;
    let checkout_id = initiated["checkout_request_id"].as_str().unwrap().to_string();
    let merchant_id = initiated["merchant_request_id"].as_str().unwrap().to_string();

    let ack = mpesa_callback_handler(
        State(h.state.clone()),
        Json(paid_callback(&checkout_id, &merchant_id)),
    )
    .await;
    assert_eq!(ack.0.result_code, 0);

    let enrollment = h
        .store
        .get_enrollment(payer.id, course.id)
        .await
        .expect("read enrollment")
        .expect("enrolled");
    assert_eq!(enrollment.payment_status, "paid");

    let payment = h
        .store
        .get_payment_by_reference(&checkout_id)
        .await
        .expect("read payment")
        .expect("payment recorded");
    assert_eq!(payment.channel, "mobile_money");
    assert_eq!(payment.amount, dec!(1800.00));

    let status = mpesa_status_handler(State(h.state.clone()), Path(checkout_id.clone()))
        .await
        .expect("status")
        .into_response();
    assert_eq!(body_json(status).await["status"], "completed");

    // Daraja occasionally redelivers; a replay must not double-grant.
    let ack = mpesa_callback_handler(
        State(h.state.clone()),
        Json(paid_callback(&checkout_id, &merchant_id)),
    )
    .await;
    assert_eq!(ack.0.result_code, 0);
    assert_eq!(
        h.store.list_enrollments(payer.id).await.expect("list").len(),
        1
    );
}

#[tokio::test]
async fn a_cancelled_callback_leaves_the_push_pending() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let payer = learner(&h.store).await;
    let course = common::published_course(&h.store, owner.id, dec!(600.00)).await;

    let initiated = mpesa_initiate_handler(
        State(h.state.clone()),
        Extension(payer.id),
        Json(MpesaInitiateRequest {
            course_id: course.id,
            phone_number: "254700000001".to_string(),
        }),
    )
    .await
    .expect("initiate")
    .into_response();
    let initiated = body_json(initiated).await;
    let checkout_id = initiated["checkout_request_id"].as_str().unwrap().to_string();
    let merchant_id = initiated["merchant_request_id"].as_str().unwrap().to_string();

    mpesa_callback_handler(
        State(h.state.clone()),
        Json(cancelled_callback(&checkout_id, &merchant_id)),
    )
    .await;

    assert!(h
        .store
        .get_enrollment(payer.id, course.id)
        .await
        .expect("read enrollment")
        .is_none());
    let status = mpesa_status_handler(State(h.state.clone()), Path(checkout_id))
        .await
        .expect("status")
        .into_response();
    assert_eq!(body_json(status).await["status"], "pending");
}

#[tokio::test(start_paused = true)]
async fn the_poller_settles_when_the_callback_is_lost() {
    let h = harness();
    let owner = trainer(&h.store).await;
    let payer = learner(&h.store).await;
    let course = common::published_course(&h.store, owner.id, dec!(2500.00)).await;

    let initiated = mpesa_initiate_handler(
        State(h.state.clone()),
        Extension(payer.id),
        Json(MpesaInitiateRequest {
            course_id: course.id,
            phone_number: "254722000111".to_string(),
        }),
    )
    .await
    .expect("initiate")
    .into_response();
    let checkout_id = body_json(initiated).await["checkout_request_id"]
        .as_str()
        .unwrap()
        .to_string();

    h.mobile_gateway
        .stage_status(
            &checkout_id,
            StkStatus::Succeeded {
                receipt: Some("QK77AB12CD".to_string()),
            },
        )
        .await;

    // The clock is paused, so sleeping here fast-forwards the spawned
    // poller through its interval.
    for _ in 0..10 {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        if h.store
            .get_payment_by_reference(&checkout_id)
            .await
            .expect("read payment")
            .is_some()
        {
            break;
        }
    }

    let enrollment = h
        .store
        .get_enrollment(payer.id, course.id)
        .await
        .expect("read enrollment")
        .expect("poller settled the payment");
    assert_eq!(enrollment.payment_status, "paid");
}

#[tokio::test]
async fn unknown_callbacks_are_acked_and_ignored() {
    let h = harness();

    let ack = mpesa_callback_handler(
        State(h.state.clone()),
        Json(paid_callback("ws_CO_unknown", "mr_unknown")),
    )
    .await;
    assert_eq!(ack.0.result_code, 0);
    assert!(h
        .store
        .get_payment_by_reference("ws_CO_unknown")
        .await
        .expect("read payment")
        .is_none());
}

#[tokio::test]
async fn status_for_an_unknown_push_is_not_found() {
    let h = harness();

    let err = mpesa_status_handler(State(h.state.clone()), Path("ws_CO_missing".to_string()))
        .await
        .err()
        .expect("should 404");
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}
