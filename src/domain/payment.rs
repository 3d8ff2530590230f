use super::order::{Amount, OrderPayload};
use crate::error::OrderFlowError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a payment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Order,
    Dues,
    Subscription,
    QrStand,
}

/// Links a payment intent to the thing being paid for.
///
/// Orders do not exist before their payment settles, so an order payment
/// carries the full creation payload instead of an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentReference {
    Existing {
        payment_type: PaymentType,
        reference_id: u64,
    },
    PendingOrder {
        payload: OrderPayload,
    },
}

impl PaymentReference {
    pub fn existing(payment_type: PaymentType, reference_id: u64) -> Result<Self, OrderFlowError> {
        if payment_type == PaymentType::Order {
            return Err(OrderFlowError::Validation(
                "Order payments must carry the cart, not an id".to_string(),
            ));
        }
        Ok(PaymentReference::Existing {
            payment_type,
            reference_id,
        })
    }

    pub fn payment_type(&self) -> PaymentType {
        match self {
            PaymentReference::Existing { payment_type, .. } => *payment_type,
            PaymentReference::PendingOrder { .. } => PaymentType::Order,
        }
    }
}

/// Gateway-side status of an intent. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Created,
    Scanning,
    Pending,
    Success,
    Failure,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentStatus::Success | IntentStatus::Failure)
    }

    fn rank(&self) -> u8 {
        match self {
            IntentStatus::Unknown => 0,
            IntentStatus::Created => 1,
            IntentStatus::Scanning | IntentStatus::Pending => 2,
            IntentStatus::Success | IntentStatus::Failure => 3,
        }
    }

    /// Whether moving to `next` keeps the intent moving forward.
    pub fn can_advance_to(&self, next: IntentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank() && next != IntentStatus::Unknown
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntentStatus::Created => "created",
            IntentStatus::Scanning => "scanning",
            IntentStatus::Pending => "pending",
            IntentStatus::Success => "success",
            IntentStatus::Failure => "failure",
            IntentStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerDetails {
    pub name: String,
    pub mobile: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitiateRequest {
    pub reference: PaymentReference,
    pub amount: Amount,
    pub payer: PayerDetails,
}

/// Wire body of `POST /payment/initiate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiateBody {
    pub payment_type: PaymentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart: Option<OrderPayload>,
    pub amount: Decimal,
    pub customer_name: String,
    pub customer_mobile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

impl From<&InitiateRequest> for InitiateBody {
    fn from(req: &InitiateRequest) -> Self {
        let (reference_id, cart) = match &req.reference {
            PaymentReference::Existing { reference_id, .. } => (Some(*reference_id), None),
            PaymentReference::PendingOrder { payload } => (None, Some(payload.clone())),
        };
        Self {
            payment_type: req.reference.payment_type(),
            reference_id,
            cart,
            amount: req.amount.value(),
            customer_name: req.payer.name.clone(),
            customer_mobile: req.payer.mobile.clone(),
            customer_email: req.payer.email.clone(),
        }
    }
}

/// A started, not yet settled payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiatedPayment {
    pub payment_url: String,
    pub gateway_txn_id: String,
}

/// Settled transaction record returned by `verify` on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledTransaction {
    pub gateway_txn_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub payment_type: Option<PaymentType>,
    #[serde(default)]
    pub reference_id: Option<u64>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Result of a single `verify` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifySnapshot {
    pub status: IntentStatus,
    #[serde(default)]
    pub transaction: Option<SettledTransaction>,
}

/// Outcome of `poll_until_settled`. Only `Settled` is conclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Settled(VerifySnapshot),
    /// Attempts ran out. The payment may still settle later.
    TimedOut {
        last_status: IntentStatus,
        attempts: u32,
    },
    Cancelled {
        last_status: IntentStatus,
        attempts: u32,
    },
}

impl PollOutcome {
    pub fn last_status(&self) -> IntentStatus {
        match self {
            PollOutcome::Settled(snapshot) => snapshot.status,
            PollOutcome::TimedOut { last_status, .. } | PollOutcome::Cancelled { last_status, .. } => {
                *last_status
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Settled(s) if s.status == IntentStatus::Success)
    }
}

/// What the gateway tells the order store once an intent settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub gateway_txn_id: String,
    pub status: IntentStatus,
    pub amount: Decimal,
    pub reference: PaymentReference,
}

/// What an order store should do with a payment callback.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackDisposition {
    Create(OrderPayload),
    Ignore(String),
}

impl PaymentCallback {
    /// Only a successful order payment whose amount matches its cart creates an order.
    pub fn disposition(&self) -> Result<CallbackDisposition, OrderFlowError> {
        if self.status != IntentStatus::Success {
            return Ok(CallbackDisposition::Ignore(format!(
                "payment {} is {}",
                self.gateway_txn_id, self.status
            )));
        }
        let payload = match &self.reference {
            PaymentReference::PendingOrder { payload } => payload,
            PaymentReference::Existing { payment_type, .. } => {
                return Ok(CallbackDisposition::Ignore(format!(
                    "{payment_type:?} payment does not create orders"
                )));
            }
        };
        let total = payload.total()?;
        if total != self.amount {
            return Err(OrderFlowError::Validation(format!(
                "paid amount {} does not match cart total {total}",
                self.amount
            )));
        }
        Ok(CallbackDisposition::Create(payload.clone()))
    }
}

/// A gateway-side intent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub gateway_txn_id: String,
    pub reference: PaymentReference,
    pub amount: Amount,
    pub status: IntentStatus,
    pub redirect_url: String,
    pub created_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Moves the intent forward. Terminal intents are immutable.
    pub fn advance(&mut self, next: IntentStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Customer, LineItem};
    use rust_decimal_macros::dec;

    fn cart() -> OrderPayload {
        OrderPayload {
            vendor_id: 1,
            customer: Customer {
                name: "Ravi".to_string(),
                phone: "9811111111".to_string(),
                email: Some("ravi@example.com".to_string()),
                table_number: None,
            },
            items: vec![LineItem {
                product_id: 3,
                product_name: "Thali".to_string(),
                variant: None,
                unit_price: dec!(250.00),
                quantity: 1,
            }],
        }
    }

    #[test]
    fn test_existing_reference_rejects_order_type() {
        assert!(PaymentReference::existing(PaymentType::Order, 1).is_err());
        let dues = PaymentReference::existing(PaymentType::Dues, 9).unwrap();
        assert_eq!(dues.payment_type(), PaymentType::Dues);
    }

    #[test]
    fn test_initiate_body_carries_cart_for_orders() {
        let request = InitiateRequest {
            reference: PaymentReference::PendingOrder { payload: cart() },
            amount: Amount::new(dec!(250.00)).unwrap(),
            payer: PayerDetails {
                name: "Ravi".to_string(),
                mobile: "9811111111".to_string(),
                email: None,
            },
        };
        let body = InitiateBody::from(&request);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["payment_type"], "order");
        assert!(json.get("reference_id").is_none());
        assert_eq!(json["cart"]["customer"]["name"], "Ravi");
        assert!(json.get("customer_email").is_none());
    }

    #[test]
    fn test_initiate_body_carries_id_for_existing_entities() {
        let request = InitiateRequest {
            reference: PaymentReference::existing(PaymentType::QrStand, 12).unwrap(),
            amount: Amount::new(dec!(1500)).unwrap(),
            payer: PayerDetails {
                name: "Vendor".to_string(),
                mobile: "9800000001".to_string(),
                email: None,
            },
        };
        let json = serde_json::to_value(InitiateBody::from(&request)).unwrap();
        assert_eq!(json["payment_type"], "qr_stand");
        assert_eq!(json["reference_id"], 12);
        assert!(json.get("cart").is_none());
    }

    #[test]
    fn test_unknown_status_deserializes() {
        let snapshot: VerifySnapshot =
            serde_json::from_str(r#"{"status":"refunded"}"#).unwrap();
        assert_eq!(snapshot.status, IntentStatus::Unknown);
        assert!(snapshot.transaction.is_none());
    }

    #[test]
    fn test_intent_moves_forward_only() {
        let mut intent = PaymentIntent {
            gateway_txn_id: "TX1".to_string(),
            reference: PaymentReference::PendingOrder { payload: cart() },
            amount: Amount::new(dec!(250.00)).unwrap(),
            status: IntentStatus::Created,
            redirect_url: "https://pay.example/TX1".to_string(),
            created_at: Utc::now(),
        };
        assert!(intent.advance(IntentStatus::Scanning));
        assert!(intent.advance(IntentStatus::Pending));
        assert!(!intent.advance(IntentStatus::Created));
        assert!(intent.advance(IntentStatus::Failure));
        assert!(!intent.advance(IntentStatus::Success));
        assert_eq!(intent.status, IntentStatus::Failure);
    }

    fn callback(status: IntentStatus, amount: Decimal) -> PaymentCallback {
        PaymentCallback {
            gateway_txn_id: "TX1".to_string(),
            status,
            amount,
            reference: PaymentReference::PendingOrder { payload: cart() },
        }
    }

    #[test]
    fn test_callback_disposition() {
        assert_eq!(
            callback(IntentStatus::Success, dec!(250.00)).disposition().unwrap(),
            CallbackDisposition::Create(cart())
        );
        assert!(matches!(
            callback(IntentStatus::Failure, dec!(250.00)).disposition().unwrap(),
            CallbackDisposition::Ignore(_)
        ));
        assert!(matches!(
            callback(IntentStatus::Success, dec!(10.00)).disposition(),
            Err(OrderFlowError::Validation(_))
        ));

        let dues = PaymentCallback {
            reference: PaymentReference::existing(PaymentType::Dues, 4).unwrap(),
            ..callback(IntentStatus::Success, dec!(10.00))
        };
        assert!(matches!(dues.disposition().unwrap(), CallbackDisposition::Ignore(_)));
    }
}
