//! services/api/src/adapters/mpesa.rs
//!
//! M-Pesa (Daraja) client implementing the `MobileMoneyGateway` port.
//! Every call fetches an OAuth token first; STK push and status queries
//! authenticate with the shortcode password, a base64 of
//! shortcode + passkey + timestamp.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lms_core::domain::{StkPushHandle, StkStatus};
use lms_core::ports::{MobileMoneyGateway, PortError, PortResult};

/// Daraja's "still processing" error code on the query endpoint.
const PROCESSING_ERROR_CODE: &str = "500.001.1001";

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
struct StkPushRequest<'a> {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: &'a str,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: &'a str,
    #[serde(rename = "Amount")]
    amount: u64,
    #[serde(rename = "PartyA")]
    party_a: &'a str,
    #[serde(rename = "PartyB")]
    party_b: &'a str,
    #[serde(rename = "PhoneNumber")]
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    #[serde(rename = "AccountReference")]
    account_reference: &'a str,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: &'a str,
}

#[derive(Deserialize)]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    response_code: String,
    #[serde(rename = "ResponseDescription")]
    response_description: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: &'a str,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(rename = "ResultCode")]
    result_code: Option<String>,
    #[serde(rename = "ResultDesc")]
    result_desc: Option<String>,
}

#[derive(Deserialize)]
struct DarajaError {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

//=========================================================================================
// The Client
//=========================================================================================

#[derive(Clone)]
pub struct MpesaClient {
    client: reqwest::Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    shortcode: String,
    passkey: String,
    callback_url: String,
}

impl MpesaClient {
    pub fn new(
        base_url: String,
        consumer_key: String,
        consumer_secret: String,
        shortcode: String,
        passkey: String,
        callback_url: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            consumer_key,
            consumer_secret,
            shortcode,
            passkey,
            callback_url,
        }
    }

    fn request_failed(e: reqwest::Error) -> PortError {
        PortError::Unexpected(format!("mpesa request failed: {e}"))
    }

    /// The shortcode password and its timestamp, which must match.
    fn password(&self) -> (String, String) {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = BASE64.encode(format!("{}{}{}", self.shortcode, self.passkey, timestamp));
        (password, timestamp)
    }

    async fn access_token(&self) -> PortResult<String> {
        let url = format!("{}/oauth/v1/generate?grant_type=client_credentials", self.base_url);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await
            .map_err(Self::request_failed)?;

        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "mpesa token request returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(Self::request_failed)?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl MobileMoneyGateway for MpesaClient {
    async fn stk_push(
        &self,
        phone_number: &str,
        amount: Decimal,
        account_reference: &str,
    ) -> PortResult<StkPushHandle> {
        let token = self.access_token().await?;
        let (password, timestamp) = self.password();

        // Daraja takes whole shillings only.
        let units = amount.round().to_u64().ok_or_else(|| {
            PortError::Unexpected(format!("amount {amount} is not a valid shilling value"))
        })?;

        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&StkPushRequest {
                business_short_code: &self.shortcode,
                password,
                timestamp,
                transaction_type: "CustomerPayBillOnline",
                amount: units,
                party_a: phone_number,
                party_b: &self.shortcode,
                phone_number,
                callback_url: &self.callback_url,
                account_reference,
                transaction_desc: "Course enrollment",
            })
            .send()
            .await
            .map_err(Self::request_failed)?;

        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "mpesa stk push returned {}",
                response.status()
            )));
        }

        let push: StkPushResponse = response.json().await.map_err(Self::request_failed)?;
        if push.response_code != "0" {
            return Err(PortError::Unexpected(format!(
                "mpesa stk push rejected: {}",
                push.response_description
            )));
        }

        Ok(StkPushHandle {
            merchant_request_id: push.merchant_request_id,
            checkout_request_id: push.checkout_request_id,
        })
    }

    async fn query_status(&self, checkout_request_id: &str) -> PortResult<StkStatus> {
        let token = self.access_token().await?;
        let (password, timestamp) = self.password();

        let url = format!("{}/mpesa/stkpushquery/v1/query", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&QueryRequest {
                business_short_code: &self.shortcode,
                password,
                timestamp,
                checkout_request_id,
            })
            .send()
            .await
            .map_err(Self::request_failed)?;

        // Daraja answers an in-flight transaction with an error body,
        // not a pending status.
        if !response.status().is_success() {
            let err: DarajaError = response.json().await.map_err(Self::request_failed)?;
            if err.error_code.as_deref() == Some(PROCESSING_ERROR_CODE) {
                return Ok(StkStatus::Pending);
            }
            return Err(PortError::Unexpected(format!(
                "mpesa query failed: {}",
                err.error_message.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        let query: QueryResponse = response.json().await.map_err(Self::request_failed)?;
        match query.result_code.as_deref() {
            Some("0") => Ok(StkStatus::Succeeded { receipt: None }),
            Some(_) => Ok(StkStatus::Failed {
                reason: query
                    .result_desc
                    .unwrap_or_else(|| "request not accepted".to_string()),
            }),
            None => Ok(StkStatus::Pending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn client(base_url: String) -> MpesaClient {
        MpesaClient::new(
            base_url,
            "key".into(),
            "secret".into(),
            "174379".into(),
            "passkey".into(),
            "https://lms.example.com/api/mpesa/callback".into(),
        )
    }

    async fn mock_token(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("GET", "/oauth/v1/generate?grant_type=client_credentials")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"token123","expires_in":"3599"}"#)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn stk_push_returns_the_checkout_handle() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let push = server
            .mock("POST", "/mpesa/stkpush/v1/processrequest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"MerchantRequestID":"29115-34620561-1",
                    "CheckoutRequestID":"ws_CO_191220191020363925",
                    "ResponseCode":"0",
                    "ResponseDescription":"Success. Request accepted for processing",
                    "CustomerMessage":"Success. Request accepted for processing"}"#,
            )
            .create_async()
            .await;

        let handle = client(server.url())
            .stk_push("254712345678", dec!(5000.00), "COURSE-1")
            .await
            .unwrap();

        assert_eq!(handle.checkout_request_id, "ws_CO_191220191020363925");
        push.assert_async().await;
    }

    #[tokio::test]
    async fn query_maps_result_code_zero_to_success() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        server
            .mock("POST", "/mpesa/stkpushquery/v1/query")
            .with_status(200)
            .with_body(
                r#"{"ResponseCode":"0","ResponseDescription":"ok",
                    "MerchantRequestID":"x","CheckoutRequestID":"y",
                    "ResultCode":"0",
                    "ResultDesc":"The service request is processed successfully."}"#,
            )
            .create_async()
            .await;

        let status = client(server.url()).query_status("ws_CO_1").await.unwrap();
        assert_eq!(status, StkStatus::Succeeded { receipt: None });
    }

    #[tokio::test]
    async fn query_maps_cancellation_to_failure() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        server
            .mock("POST", "/mpesa/stkpushquery/v1/query")
            .with_status(200)
            .with_body(
                r#"{"ResponseCode":"0","ResponseDescription":"ok",
                    "MerchantRequestID":"x","CheckoutRequestID":"y",
                    "ResultCode":"1032","ResultDesc":"Request cancelled by user"}"#,
            )
            .create_async()
            .await;

        let status = client(server.url()).query_status("ws_CO_2").await.unwrap();
        assert_eq!(
            status,
            StkStatus::Failed {
                reason: "Request cancelled by user".to_string()
            }
        );
    }

    #[tokio::test]
    async fn query_maps_the_processing_error_to_pending() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        server
            .mock("POST", "/mpesa/stkpushquery/v1/query")
            .with_status(500)
            .with_body(
                r#"{"requestId":"1234","errorCode":"500.001.1001",
                    "errorMessage":"The transaction is being processed"}"#,
            )
            .create_async()
            .await;

        let status = client(server.url()).query_status("ws_CO_3").await.unwrap();
        assert_eq!(status, StkStatus::Pending);
    }
}
