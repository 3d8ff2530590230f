use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    NotSubmitted,
    Pending,
    Approved,
    Rejected,
}

/// Snapshot of a vendor's eligibility inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorStanding {
    pub kyc_status: KycStatus,
    #[serde(default)]
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub due_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DenyReason {
    KycNotApproved(KycStatus),
    NoSubscription,
    SubscriptionExpired(DateTime<Utc>),
    DuesOverLimit { due: Decimal, limit: Decimal },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    Granted,
    Denied(DenyReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }
}
