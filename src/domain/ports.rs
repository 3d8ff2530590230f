use super::access::VendorStanding;
use super::notification::Notification;
use super::order::{Order, OrderId, OrderStatus, TransitionCommand};
use super::payment::{InitiateRequest, InitiatedPayment, PaymentCallback, VerifySnapshot};
use crate::error::{GatewayError, Result, TransitionError};
use async_trait::async_trait;
use std::sync::Arc;

/// Filter for a store listing. Mirrors `GET /orders/?status=&page_size=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    pub vendor_id: u64,
    pub status: OrderStatus,
    pub page_size: usize,
}

/// Read and command side of the order store.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Paid orders of one vendor in one status, in no particular order.
    async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>>;
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;
    /// Applies a status change. Repeating an already applied command is a no-op.
    async fn transition(
        &self,
        id: OrderId,
        command: &TransitionCommand,
    ) -> std::result::Result<Order, TransitionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Created(Order),
    /// Redelivery of a callback that already produced an order.
    AlreadyCreated(Order),
    Ignored(String),
}

impl CallbackOutcome {
    pub fn order(&self) -> Option<&Order> {
        match self {
            CallbackOutcome::Created(o) | CallbackOutcome::AlreadyCreated(o) => Some(o),
            CallbackOutcome::Ignored(_) => None,
        }
    }
}

/// Store side of the payment-success callback.
#[async_trait]
pub trait PaymentCallbackHandler: Send + Sync {
    /// Materializes at most one order per gateway transaction.
    async fn on_payment_settled(&self, callback: PaymentCallback) -> Result<CallbackOutcome>;
}

/// Transport to the remote payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(
        &self,
        request: &InitiateRequest,
    ) -> std::result::Result<InitiatedPayment, GatewayError>;
    async fn verify(&self, gateway_txn_id: &str) -> std::result::Result<VerifySnapshot, GatewayError>;
}

/// Device notification surface. Implementations coalesce by tag.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show(&self, notification: Notification) -> Result<()>;
}

pub type WindowId = u64;

/// Application windows visible to the background receiver.
#[async_trait]
pub trait ClientWindows: Send + Sync {
    async fn list(&self) -> Result<Vec<WindowId>>;
    async fn focus(&self, window: WindowId) -> Result<()>;
    async fn open(&self, url: &str) -> Result<WindowId>;
}

/// Where KYC, subscription and dues information comes from.
#[async_trait]
pub trait VendorStandingSource: Send + Sync {
    async fn standing(&self, vendor_id: u64) -> Result<VendorStanding>;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type PaymentCallbackRef = Arc<dyn PaymentCallbackHandler>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
pub type ClientWindowsRef = Arc<dyn ClientWindows>;
pub type VendorStandingBox = Box<dyn VendorStandingSource>;
