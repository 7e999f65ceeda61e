use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::ports::{GatewayError, GatewayOrder, GatewayRefund, PaymentGateway};

#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub key_id: String,
    pub key_secret: String,
}

#[derive(Serialize)]
struct OrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Serialize)]
struct RefundRequest {
    amount: i64,
}

/// HTTP client for the payment gateway's orders and refunds API
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    credentials: GatewayCredentials,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, credentials: GatewayCredentials) -> Self {
        Self::with_circuit_breaker(base_url, credentials, 3, 60)
    }

    /// Creates a client with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        credentials: GatewayCredentials,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            base_url,
            credentials,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post<B, T>(&self, url: String, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let request = self
            .client
            .post(&url)
            .basic_auth(&self.credentials.key_id, Some(&self.credentials.key_secret))
            .json(body);

        let result = self
            .circuit_breaker
            .call(async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| GatewayError::Request(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(GatewayError::Rejected {
                        status: status.as_u16(),
                        body,
                    });
                }

                response
                    .json::<T>()
                    .await
                    .map_err(|e| GatewayError::Request(e.to_string()))
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let order: GatewayOrder = self
            .post(
                self.url("/v1/orders"),
                &OrderRequest {
                    amount,
                    currency,
                    receipt,
                },
            )
            .await?;

        tracing::info!(order_id = %order.id, amount, receipt, "Gateway order created");
        Ok(order)
    }

    async fn create_refund(
        &self,
        payment_id: &str,
        amount: i64,
    ) -> Result<GatewayRefund, GatewayError> {
        let refund: GatewayRefund = self
            .post(
                self.url(&format!("/v1/payments/{}/refund", payment_id)),
                &RefundRequest { amount },
            )
            .await?;

        tracing::info!(refund_id = %refund.id, payment_id, amount, "Gateway refund requested");
        Ok(refund)
    }
}
