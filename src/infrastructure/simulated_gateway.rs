use crate::domain::payment::{
    InitiateRequest, InitiatedPayment, IntentStatus, PaymentCallback, PaymentIntent,
    PaymentReference, SettledTransaction, VerifySnapshot,
};
use crate::domain::ports::{CallbackOutcome, PaymentCallbackRef, PaymentGateway};
use crate::error::{GatewayError, OrderFlowError, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct GatewayState {
    intents: HashMap<String, PaymentIntent>,
    scripts: HashMap<String, VecDeque<IntentStatus>>,
    delivered: HashMap<String, PaymentCallback>,
    next_txn: u64,
    refuse_initiate: Option<GatewayError>,
}

/// A local stand-in for the hosted payment gateway.
///
/// Issues `TX<n>` transaction ids by default, answers `verify` from its own intent
/// records and, once an intent settles, posts the settlement to the order
/// store the same way the real gateway does.
#[derive(Clone)]
pub struct SimulatedGateway {
    state: Arc<Mutex<GatewayState>>,
    callbacks: Option<PaymentCallbackRef>,
    checkout_base: String,
    txn_prefix: String,
}

impl SimulatedGateway {
    pub fn new(checkout_base: impl Into<String>) -> Self {
        Self {
            state: Arc::default(),
            callbacks: None,
            checkout_base: checkout_base.into().trim_end_matches('/').to_string(),
            txn_prefix: "TX".to_string(),
        }
    }

    /// Transaction ids become `<prefix><n>`. Keeps ids unique across runs
    /// that share a persistent store.
    pub fn with_txn_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.txn_prefix = prefix.into();
        self
    }

    /// Settlement callbacks are delivered to `handler`.
    pub fn with_callback_handler(mut self, handler: PaymentCallbackRef) -> Self {
        self.callbacks = Some(handler);
        self
    }

    /// Every later `initiate` fails with `error`; `None` restores normal behavior.
    pub fn refuse_initiate(&self, error: Option<GatewayError>) {
        self.state.lock().refuse_initiate = error;
    }

    /// Queues the statuses successive `verify` calls will move the intent through.
    ///
    /// A terminal status in the script settles the intent when reached.
    pub fn script(&self, gateway_txn_id: &str, statuses: impl IntoIterator<Item = IntentStatus>) {
        self.state
            .lock()
            .scripts
            .insert(gateway_txn_id.to_string(), statuses.into_iter().collect());
    }

    pub fn intent(&self, gateway_txn_id: &str) -> Option<PaymentIntent> {
        self.state.lock().intents.get(gateway_txn_id).cloned()
    }

    /// Settles an intent with a terminal `outcome` and delivers the callback.
    ///
    /// Settling twice keeps the first outcome.
    pub async fn settle(
        &self,
        gateway_txn_id: &str,
        outcome: IntentStatus,
    ) -> Result<Option<CallbackOutcome>> {
        if !outcome.is_terminal() {
            return Err(OrderFlowError::Validation(format!(
                "'{outcome}' is not a settlement outcome"
            )));
        }
        let callback = {
            let mut state = self.state.lock();
            let intent = state
                .intents
                .get_mut(gateway_txn_id)
                .ok_or_else(|| GatewayError::UnknownTransaction(gateway_txn_id.to_string()))?;
            if !intent.advance(outcome) {
                debug!(txn = gateway_txn_id, status = %intent.status, "Intent already settled");
                return Ok(None);
            }
            let callback = PaymentCallback {
                gateway_txn_id: intent.gateway_txn_id.clone(),
                status: intent.status,
                amount: intent.amount.value(),
                reference: intent.reference.clone(),
            };
            state
                .delivered
                .insert(gateway_txn_id.to_string(), callback.clone());
            callback
        };
        info!(txn = gateway_txn_id, status = %outcome, "Payment settled");
        self.deliver(callback).await
    }

    /// Sends the last settlement callback for `gateway_txn_id` again.
    pub async fn redeliver(&self, gateway_txn_id: &str) -> Result<Option<CallbackOutcome>> {
        let callback = self
            .state
            .lock()
            .delivered
            .get(gateway_txn_id)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownTransaction(gateway_txn_id.to_string()))?;
        debug!(txn = gateway_txn_id, "Redelivering settlement callback");
        self.deliver(callback).await
    }

    async fn deliver(&self, callback: PaymentCallback) -> Result<Option<CallbackOutcome>> {
        match &self.callbacks {
            Some(handler) => Ok(Some(handler.on_payment_settled(callback).await?)),
            None => Ok(None),
        }
    }

    fn snapshot(intent: &PaymentIntent) -> VerifySnapshot {
        let transaction = (intent.status == IntentStatus::Success).then(|| SettledTransaction {
            gateway_txn_id: intent.gateway_txn_id.clone(),
            amount: intent.amount.value(),
            payment_type: Some(intent.reference.payment_type()),
            reference_id: match &intent.reference {
                PaymentReference::Existing { reference_id, .. } => Some(*reference_id),
                PaymentReference::PendingOrder { .. } => None,
            },
            paid_at: Some(Utc::now()),
        });
        VerifySnapshot {
            status: intent.status,
            transaction,
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn initiate(
        &self,
        request: &InitiateRequest,
    ) -> std::result::Result<InitiatedPayment, GatewayError> {
        let mut state = self.state.lock();
        if let Some(error) = &state.refuse_initiate {
            return Err(error.clone());
        }
        state.next_txn += 1;
        let gateway_txn_id = format!("{}{}", self.txn_prefix, state.next_txn);
        let payment_url = format!("{}/pay/{}", self.checkout_base, gateway_txn_id);
        state.intents.insert(
            gateway_txn_id.clone(),
            PaymentIntent {
                gateway_txn_id: gateway_txn_id.clone(),
                reference: request.reference.clone(),
                amount: request.amount,
                status: IntentStatus::Created,
                redirect_url: payment_url.clone(),
                created_at: Utc::now(),
            },
        );
        debug!(txn = %gateway_txn_id, amount = %request.amount.value(), "Intent created");
        Ok(InitiatedPayment {
            payment_url,
            gateway_txn_id,
        })
    }

    async fn verify(&self, gateway_txn_id: &str) -> std::result::Result<VerifySnapshot, GatewayError> {
        let next = {
            let mut state = self.state.lock();
            if !state.intents.contains_key(gateway_txn_id) {
                return Err(GatewayError::UnknownTransaction(gateway_txn_id.to_string()));
            }
            let next = state
                .scripts
                .get_mut(gateway_txn_id)
                .and_then(VecDeque::pop_front);
            if let Some(status) = next.filter(|s| !s.is_terminal())
                && let Some(intent) = state.intents.get_mut(gateway_txn_id)
            {
                intent.advance(status);
            }
            next.filter(IntentStatus::is_terminal)
        };
        if let Some(outcome) = next {
            self.settle(gateway_txn_id, outcome)
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        }
        let state = self.state.lock();
        state
            .intents
            .get(gateway_txn_id)
            .map(Self::snapshot)
            .ok_or_else(|| GatewayError::UnknownTransaction(gateway_txn_id.to_string()))
    }
}
