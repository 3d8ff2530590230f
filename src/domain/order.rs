use crate::error::{OrderFlowError, TransitionError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned order identity. Only exists once a payment has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strictly positive monetary amount.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, OrderFlowError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(OrderFlowError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = OrderFlowError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Lifecycle of an order once it exists.
///
/// ```text
/// pending -> accepted -> running -> ready -> completed
///    |           |
///    +-----------+--> rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Running,
    Ready,
    Completed,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Running => "running",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Rejected)
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_move_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Accepted, Rejected)
                | (Accepted, Running)
                | (Running, Ready)
                | (Ready, Completed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "accepted" => Ok(OrderStatus::Accepted),
            "running" => Ok(OrderStatus::Running),
            "ready" => Ok(OrderStatus::Ready),
            "completed" => Ok(OrderStatus::Completed),
            "rejected" => Ok(OrderStatus::Rejected),
            other => Err(OrderFlowError::Validation(format!(
                "Unknown order status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

/// Commands a vendor can issue against an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorAction {
    Accept,
    Reject { reason: String },
    Start,
    Ready,
    Complete,
}

impl VendorAction {
    pub fn target(&self) -> OrderStatus {
        match self {
            VendorAction::Accept => OrderStatus::Accepted,
            VendorAction::Reject { .. } => OrderStatus::Rejected,
            VendorAction::Start => OrderStatus::Running,
            VendorAction::Ready => OrderStatus::Ready,
            VendorAction::Complete => OrderStatus::Completed,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VendorAction::Accept => "accept",
            VendorAction::Reject { .. } => "reject",
            VendorAction::Start => "start",
            VendorAction::Ready => "ready",
            VendorAction::Complete => "complete",
        }
    }

    /// Parses an action name as typed by a vendor. A rejection takes its reason separately.
    pub fn parse(name: &str, reason: Option<String>) -> Result<Self, OrderFlowError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(VendorAction::Accept),
            "reject" => Ok(VendorAction::Reject {
                reason: reason.unwrap_or_default(),
            }),
            "start" => Ok(VendorAction::Start),
            "ready" => Ok(VendorAction::Ready),
            "complete" => Ok(VendorAction::Complete),
            other => Err(OrderFlowError::Validation(format!(
                "Unknown action '{other}'"
            ))),
        }
    }

    /// Validates the action locally and turns it into the wire command.
    pub fn into_command(self) -> Result<TransitionCommand, TransitionError> {
        let status = self.target();
        let reject_reason = match self {
            VendorAction::Reject { reason } => {
                let reason = reason.trim().to_string();
                if reason.is_empty() {
                    return Err(TransitionError::MissingReason);
                }
                Some(reason)
            }
            _ => None,
        };
        Ok(TransitionCommand {
            status,
            reject_reason,
        })
    }
}

/// Body of `POST /orders/{id}/edit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCommand {
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

/// One purchased product inside a cart or order. Immutable once the order exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: u64,
    pub product_name: String,
    #[serde(default)]
    pub variant: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl LineItem {
    /// `None` when the subtotal does not fit in a `Decimal`.
    pub fn subtotal(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub table_number: Option<String>,
}

/// Everything the store needs to materialize an order after payment.
///
/// Travels inside the payment intent because no order id exists yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub vendor_id: u64,
    pub customer: Customer,
    pub items: Vec<LineItem>,
}

impl OrderPayload {
    pub fn total(&self) -> Result<Decimal, OrderFlowError> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| {
                item.subtotal().and_then(|subtotal| total.checked_add(subtotal))
            })
            .ok_or_else(|| OrderFlowError::Validation("Cart total is too large".to_string()))
    }

    /// Rejects carts that must never reach the gateway.
    pub fn validate(&self) -> Result<(), OrderFlowError> {
        if self.items.is_empty() {
            return Err(OrderFlowError::Validation("Cart is empty".to_string()));
        }
        if self.customer.name.trim().is_empty() {
            return Err(OrderFlowError::Validation(
                "Customer name is required".to_string(),
            ));
        }
        if self.customer.phone.trim().is_empty() {
            return Err(OrderFlowError::Validation(
                "Customer phone is required".to_string(),
            ));
        }
        if let Some(item) = self
            .items
            .iter()
            .find(|i| i.quantity == 0 || i.unit_price < Decimal::ZERO)
        {
            return Err(OrderFlowError::Validation(format!(
                "Invalid quantity or price for '{}'",
                item.product_name
            )));
        }
        self.total()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub vendor_id: u64,
    pub customer_name: String,
    pub phone: String,
    #[serde(default)]
    pub table_number: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<LineItem>,
    pub total: Decimal,
    #[serde(default)]
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a freshly paid order. Orders always start out `pending`.
    pub fn from_payload(
        id: OrderId,
        payload: OrderPayload,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderFlowError> {
        let total = payload.total()?;
        Ok(Self {
            id,
            vendor_id: payload.vendor_id,
            customer_name: payload.customer.name,
            phone: payload.customer.phone,
            table_number: payload.customer.table_number,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Paid,
            items: payload.items,
            total,
            reject_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Orders are only shown to vendors once paid.
    pub fn is_visible(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Applies a command. Returns `false` when the order is already in the
    /// requested state, in which case nothing changes.
    pub fn apply(
        &mut self,
        command: &TransitionCommand,
        now: DateTime<Utc>,
    ) -> Result<bool, TransitionError> {
        if command.status == OrderStatus::Rejected
            && command
                .reject_reason
                .as_deref()
                .is_none_or(|r| r.trim().is_empty())
        {
            return Err(TransitionError::MissingReason);
        }
        if self.status == command.status {
            return Ok(false);
        }
        if !self.status.can_move_to(command.status) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: command.status,
            });
        }
        self.status = command.status;
        if command.status == OrderStatus::Rejected {
            self.reject_reason = command.reject_reason.clone();
        }
        self.updated_at = now;
        Ok(true)
    }
}
