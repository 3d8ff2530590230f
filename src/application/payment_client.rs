use crate::application::shutdown::Shutdown;
use crate::domain::order::Amount;
use crate::domain::payment::{
    InitiateRequest, InitiatedPayment, IntentStatus, PayerDetails, PaymentReference, PollOutcome,
    VerifySnapshot,
};
use crate::domain::ports::PaymentGatewayBox;
use crate::error::{GatewayError, OrderFlowError, Result};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Bounds for `poll_until_settled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_millis(3000),
        }
    }
}

/// Reported to the caller after every verification attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PollProgress {
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: IntentStatus,
    pub error: Option<String>,
}

/// Starts payments and follows them to settlement.
///
/// Payment errors are never retried here: a new attempt needs a new
/// `initiate`, otherwise a stale intent could be charged twice.
pub struct PaymentGatewayClient {
    gateway: PaymentGatewayBox,
}

impl PaymentGatewayClient {
    pub fn new(gateway: PaymentGatewayBox) -> Self {
        Self { gateway }
    }

    /// Creates a remote payment intent and returns where to send the payer.
    #[instrument(skip(self, reference, payer), fields(payment_type = ?reference.payment_type(), %amount))]
    pub async fn initiate(
        &self,
        reference: PaymentReference,
        amount: Decimal,
        payer: PayerDetails,
    ) -> Result<InitiatedPayment> {
        let request = InitiateRequest {
            reference,
            amount: Amount::new(amount)?,
            payer,
        };
        let initiated = self.gateway.initiate(&request).await.map_err(|e| {
            warn!(error = %e, "Payment initiation failed");
            OrderFlowError::Gateway(e)
        })?;
        if initiated.payment_url.trim().is_empty() || initiated.gateway_txn_id.trim().is_empty() {
            return Err(GatewayError::InvalidResponse(
                "gateway returned no payment url or transaction id".to_string(),
            )
            .into());
        }
        info!(gateway_txn_id = %initiated.gateway_txn_id, "Payment intent created");
        Ok(initiated)
    }

    /// Current status of an intent. Safe to call any number of times.
    pub async fn verify(&self, gateway_txn_id: &str) -> Result<VerifySnapshot> {
        if gateway_txn_id.trim().is_empty() {
            return Err(OrderFlowError::Validation(
                "Transaction id is required".to_string(),
            ));
        }
        Ok(self.gateway.verify(gateway_txn_id).await?)
    }

    pub async fn poll_until_settled(
        &self,
        gateway_txn_id: &str,
        policy: PollPolicy,
        shutdown: Shutdown,
    ) -> Result<PollOutcome> {
        self.poll_until_settled_with(gateway_txn_id, policy, shutdown, |_| {})
            .await
    }

    /// Verifies repeatedly until the intent is terminal, attempts run out, or
    /// `shutdown` fires.
    ///
    /// Running out of attempts is reported as [`PollOutcome::TimedOut`], never
    /// as a failure. Transient verification errors count as an attempt and the
    /// last known status is kept. Only a gateway that no longer knows the
    /// transaction ends the loop with an error.
    #[instrument(skip(self, shutdown, on_update), fields(max_attempts = policy.max_attempts))]
    pub async fn poll_until_settled_with<F>(
        &self,
        gateway_txn_id: &str,
        policy: PollPolicy,
        mut shutdown: Shutdown,
        mut on_update: F,
    ) -> Result<PollOutcome>
    where
        F: FnMut(&PollProgress) + Send,
    {
        if policy.max_attempts == 0 {
            return Err(OrderFlowError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let mut last_status = IntentStatus::Unknown;
        for attempt in 1..=policy.max_attempts {
            if shutdown.is_cancelled() {
                return Ok(PollOutcome::Cancelled {
                    last_status,
                    attempts: attempt - 1,
                });
            }

            let mut error = None;
            match self.verify(gateway_txn_id).await {
                Ok(snapshot) => {
                    last_status = snapshot.status;
                    debug!(attempt, status = %snapshot.status, "Verified payment");
                    if snapshot.status.is_terminal() {
                        on_update(&PollProgress {
                            attempt,
                            max_attempts: policy.max_attempts,
                            status: snapshot.status,
                            error: None,
                        });
                        info!(attempt, status = %snapshot.status, "Payment settled");
                        return Ok(PollOutcome::Settled(snapshot));
                    }
                }
                Err(OrderFlowError::Gateway(GatewayError::UnknownTransaction(id))) => {
                    return Err(GatewayError::UnknownTransaction(id).into());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Verification attempt failed");
                    error = Some(e.to_string());
                }
            }

            on_update(&PollProgress {
                attempt,
                max_attempts: policy.max_attempts,
                status: last_status,
                error,
            });

            if attempt < policy.max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(policy.interval) => {}
                    _ = shutdown.cancelled() => {
                        info!(attempt, "Payment polling cancelled");
                        return Ok(PollOutcome::Cancelled { last_status, attempts: attempt });
                    }
                }
            }
        }

        info!(%last_status, "Payment not settled within the attempt budget");
        Ok(PollOutcome::TimedOut {
            last_status,
            attempts: policy.max_attempts,
        })
    }
}
