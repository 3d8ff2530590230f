use crate::application::payment_client::{PaymentGatewayClient, PollPolicy, PollProgress};
use crate::application::shutdown::Shutdown;
use crate::domain::order::{Customer, LineItem, OrderPayload};
use crate::domain::payment::{IntentStatus, PayerDetails, PaymentReference, PollOutcome};
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, instrument};

/// Where the customer has to go to pay. Handing this out ends the
/// orchestrator's involvement: settlement and order creation happen out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRedirect {
    pub payment_url: String,
    pub gateway_txn_id: String,
}

/// What the payment-status view tells the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementReport {
    Paid { gateway_txn_id: String },
    Failed { gateway_txn_id: String },
    /// Not settled yet. The customer should check again later.
    Undetermined {
        gateway_txn_id: String,
        last_status: IntentStatus,
    },
}

impl SettlementReport {
    pub fn message(&self) -> &'static str {
        match self {
            SettlementReport::Paid { .. } => "Payment received, your order has been placed",
            SettlementReport::Failed { .. } => "Payment could not be completed",
            SettlementReport::Undetermined { .. } => {
                "Payment is still being confirmed, please check again shortly"
            }
        }
    }
}

/// Turns a cart into a payment. The order itself only appears once the
/// gateway reports the payment as settled to the order store.
pub struct OrderCreationOrchestrator {
    payments: Arc<PaymentGatewayClient>,
}

impl OrderCreationOrchestrator {
    pub fn new(payments: Arc<PaymentGatewayClient>) -> Self {
        Self { payments }
    }

    /// Validates the cart, starts a payment carrying it, and returns the
    /// redirect. Invalid carts never reach the network.
    #[instrument(skip_all, fields(vendor_id = vendor_id, items = cart.len()))]
    pub async fn submit_order(
        &self,
        cart: Vec<LineItem>,
        customer: Customer,
        vendor_id: u64,
    ) -> Result<CheckoutRedirect> {
        let customer = Customer {
            name: customer.name.trim().to_string(),
            phone: customer.phone.trim().to_string(),
            ..customer
        };
        let payload = OrderPayload {
            vendor_id,
            customer,
            items: cart,
        };
        payload.validate()?;

        let amount = payload.total()?;
        let payer = PayerDetails {
            name: payload.customer.name.clone(),
            mobile: payload.customer.phone.clone(),
            email: payload.customer.email.clone(),
        };
        let initiated = self
            .payments
            .initiate(PaymentReference::PendingOrder { payload }, amount, payer)
            .await?;

        info!(gateway_txn_id = %initiated.gateway_txn_id, %amount, "Checkout handed to payment gateway");
        Ok(CheckoutRedirect {
            payment_url: initiated.payment_url,
            gateway_txn_id: initiated.gateway_txn_id,
        })
    }

    /// Follows a payment after the customer returns from the gateway.
    pub async fn observe_settlement<F>(
        &self,
        gateway_txn_id: &str,
        policy: PollPolicy,
        shutdown: Shutdown,
        on_update: F,
    ) -> Result<SettlementReport>
    where
        F: FnMut(&PollProgress) + Send,
    {
        let outcome = self
            .payments
            .poll_until_settled_with(gateway_txn_id, policy, shutdown, on_update)
            .await?;
        let gateway_txn_id = gateway_txn_id.to_string();
        Ok(match outcome {
            PollOutcome::Settled(s) if s.status == IntentStatus::Success => {
                SettlementReport::Paid { gateway_txn_id }
            }
            PollOutcome::Settled(_) => SettlementReport::Failed { gateway_txn_id },
            PollOutcome::TimedOut { last_status, .. } | PollOutcome::Cancelled { last_status, .. } => {
                SettlementReport::Undetermined {
                    gateway_txn_id,
                    last_status,
                }
            }
        })
    }
}
