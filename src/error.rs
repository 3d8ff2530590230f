use crate::domain::order::{OrderId, OrderStatus};
use thiserror::Error;

/// Failures raised while starting or verifying a payment.
///
/// Any of these guarantees that no order exists for the attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Network(String),
    #[error("gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
    #[error("unknown gateway transaction '{0}'")]
    UnknownTransaction(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::InvalidResponse(e.to_string())
        } else {
            GatewayError::Network(e.to_string())
        }
    }
}

/// A vendor-issued status change that did not take effect.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("a rejection reason is required")]
    MissingReason,
    #[error("order cannot move from {from} to {to}")]
    Illegal { from: OrderStatus, to: OrderStatus },
    #[error("order {0} not found")]
    NotFound(OrderId),
    #[error("a command for order {0} is already in flight")]
    InFlight(OrderId),
    #[error("order store refused the change: {0}")]
    Rejected(String),
    #[error("order store unreachable: {0}")]
    Network(String),
    #[error("order storage failed: {0}")]
    Storage(String),
}

#[derive(Error, Debug)]
pub enum OrderFlowError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Payment could not be completed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Action failed: {0}")]
    Transition(#[from] TransitionError),
    #[error("Notification dropped: {0}")]
    NotificationDecode(String),
    #[error("Order store error: {0}")]
    Store(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
}

impl OrderFlowError {
    /// Short message suitable for showing to the person who triggered the failure.
    pub fn user_message(&self) -> String {
        match self {
            OrderFlowError::Validation(m) => m.clone(),
            OrderFlowError::Gateway(_) => "Payment could not be completed".to_string(),
            OrderFlowError::Transition(TransitionError::MissingReason) => {
                "Please give a reason for rejecting this order".to_string()
            }
            OrderFlowError::Transition(_) => "The order could not be updated".to_string(),
            OrderFlowError::NotificationDecode(_) => "Notification could not be read".to_string(),
            _ => "Something went wrong, please try again".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrderFlowError>;
