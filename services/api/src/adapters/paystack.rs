//! services/api/src/adapters/paystack.rs
//!
//! Paystack client implementing the `CardPaymentGateway` port, plus the
//! webhook signature check. Every Paystack response is wrapped in an
//! envelope of `{status, message, data}`; a `status` of false means the
//! request was rejected even when the HTTP status is 200.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use uuid::Uuid;

use lms_core::domain::{ChargeVerification, InitializedTransaction};
use lms_core::ports::{CardPaymentGateway, PortError, PortResult};

type HmacSha512 = Hmac<Sha512>;

/// Checks the `x-paystack-signature` header: an HMAC-SHA512 of the raw
/// request body, keyed with the account secret, hex encoded.
pub fn verify_webhook_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_compare(&expected, signature)
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    /// Minor units (kobo / cents), per the Paystack contract.
    amount: i64,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<&'a str>,
    metadata: TransactionMetadata,
}

/// Custom fields attached at initialize time. Paystack echoes these back
/// on verify and in webhook events, which is how a charge is tied back to
/// the user and course that produced it.
#[derive(Serialize)]
struct TransactionMetadata {
    user_id: Uuid,
    course_id: Uuid,
}

#[derive(Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Deserialize)]
struct VerifyData {
    reference: String,
    status: String,
    amount: i64,
    currency: String,
    channel: String,
    paid_at: Option<DateTime<Utc>>,
    customer: Option<CustomerData>,
    /// Paystack returns transactions without metadata as `""`, so this is
    /// parsed loosely instead of with a typed struct.
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct CustomerData {
    email: Option<String>,
}

//=========================================================================================
// The Client
//=========================================================================================

#[derive(Clone)]
pub struct PaystackClient {
    secret_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl PaystackClient {
    pub fn new(secret_key: String, base_url: String) -> Self {
        Self {
            secret_key,
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn request_failed(e: reqwest::Error) -> PortError {
        PortError::Unexpected(format!("paystack request failed: {e}"))
    }
}

#[async_trait]
impl CardPaymentGateway for PaystackClient {
    async fn initialize_transaction(
        &self,
        email: &str,
        amount_minor: i64,
        currency: &str,
        plan_code: Option<&str>,
        user_id: Uuid,
        course_id: Uuid,
    ) -> PortResult<InitializedTransaction> {
        let url = format!("{}/transaction/initialize", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&InitializeRequest {
                email,
                amount: amount_minor,
                currency,
                plan: plan_code,
                metadata: TransactionMetadata { user_id, course_id },
            })
            .send()
            .await
            .map_err(Self::request_failed)?;

        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "paystack initialize returned {}",
                response.status()
            )));
        }

        let envelope: Envelope<InitializeData> =
            response.json().await.map_err(Self::request_failed)?;
        if !envelope.status {
            return Err(PortError::Unexpected(format!(
                "paystack initialize rejected: {}",
                envelope.message
            )));
        }
        let data = envelope.data.ok_or_else(|| {
            PortError::Unexpected("paystack initialize returned no data".to_string())
        })?;

        Ok(InitializedTransaction {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    async fn verify_transaction(&self, reference: &str) -> PortResult<ChargeVerification> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(Self::request_failed)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PortError::NotFound(format!("transaction {reference}")));
        }
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "paystack verify returned {}",
                response.status()
            )));
        }

        let envelope: Envelope<VerifyData> =
            response.json().await.map_err(Self::request_failed)?;
        if !envelope.status {
            return Err(PortError::NotFound(format!(
                "transaction {reference}: {}",
                envelope.message
            )));
        }
        let data = envelope
            .data
            .ok_or_else(|| PortError::Unexpected("paystack verify returned no data".to_string()))?;

        let course_id = data
            .metadata
            .as_ref()
            .and_then(|m| m.get("course_id"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        Ok(ChargeVerification {
            reference: data.reference,
            status: data.status,
            amount_minor: data.amount,
            currency: data.currency,
            channel: data.channel,
            customer_email: data.customer.and_then(|c| c.email),
            paid_at: data.paid_at,
            course_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_correctly_signed_payload() {
        let secret = "sk_test_secret";
        let payload = br#"{"event":"charge.success"}"#;
        let signature = sign(secret, payload);
        assert!(verify_webhook_signature(secret, payload, &signature));
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let secret = "sk_test_secret";
        let signature = sign(secret, br#"{"event":"charge.success"}"#);
        assert!(!verify_webhook_signature(
            secret,
            br#"{"event":"charge.failed"}"#,
            &signature
        ));
    }

    #[test]
    fn rejects_a_signature_of_wrong_length() {
        assert!(!verify_webhook_signature(
            "sk_test_secret",
            b"payload",
            "deadbeef"
        ));
    }

    #[tokio::test]
    async fn initialize_sends_metadata_and_parses_the_envelope() {
        let user_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transaction/initialize")
            .match_body(mockito::Matcher::PartialJsonString(format!(
                r#"{{"metadata":{{"user_id":"{user_id}","course_id":"{course_id}"}}}}"#
            )))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":true,"message":"Authorization URL created","data":{
                    "authorization_url":"https://checkout.paystack.com/abc123",
                    "access_code":"abc123",
                    "reference":"ref_init_1"}}"#,
            )
            .create_async()
            .await;

        let client = PaystackClient::new("sk_test_x".into(), server.url());
        let init = client
            .initialize_transaction("learner@example.com", 500_000, "KES", None, user_id, course_id)
            .await
            .unwrap();

        assert_eq!(init.reference, "ref_init_1");
        assert_eq!(init.authorization_url, "https://checkout.paystack.com/abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn verify_reports_the_charge_with_its_metadata() {
        let course_id = Uuid::new_v4();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/transaction/verify/ref_ok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"status":true,"message":"Verification successful","data":{{
                    "reference":"ref_ok","status":"success","amount":500000,
                    "currency":"KES","channel":"card",
                    "paid_at":"2024-03-01T10:15:00.000Z",
                    "customer":{{"email":"learner@example.com"}},
                    "metadata":{{"user_id":"{}","course_id":"{course_id}"}}}}}}"#,
                Uuid::new_v4()
            ))
            .create_async()
            .await;

        let client = PaystackClient::new("sk_test_x".into(), server.url());
        let charge = client.verify_transaction("ref_ok").await.unwrap();

        assert!(charge.is_successful());
        assert_eq!(charge.amount_minor, 500_000);
        assert_eq!(charge.customer_email.as_deref(), Some("learner@example.com"));
        assert_eq!(charge.course_id, Some(course_id));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn verify_tolerates_a_charge_without_metadata() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/transaction/verify/ref_bare")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":true,"message":"Verification successful","data":{
                    "reference":"ref_bare","status":"success","amount":1000,
                    "currency":"KES","channel":"card","paid_at":null,
                    "customer":null,"metadata":""}}"#,
            )
            .create_async()
            .await;

        let client = PaystackClient::new("sk_test_x".into(), server.url());
        let charge = client.verify_transaction("ref_bare").await.unwrap();
        assert_eq!(charge.course_id, None);
    }

    #[tokio::test]
    async fn verify_maps_unknown_references_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/transaction/verify/ref_missing")
            .with_status(404)
            .with_body(r#"{"status":false,"message":"Transaction reference not found"}"#)
            .create_async()
            .await;

        let client = PaystackClient::new("sk_test_x".into(), server.url());
        let err = client.verify_transaction("ref_missing").await;
        assert!(matches!(err, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn a_false_envelope_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/transaction/initialize")
            .with_status(200)
            .with_body(r#"{"status":false,"message":"Invalid key"}"#)
            .create_async()
            .await;

        let client = PaystackClient::new("sk_bad".into(), server.url());
        let err = client
            .initialize_transaction(
                "learner@example.com",
                1000,
                "KES",
                None,
                Uuid::new_v4(),
                Uuid::new_v4(),
            )
            .await;
        assert!(matches!(err, Err(PortError::Unexpected(_))));
    }
}
