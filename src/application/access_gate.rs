use crate::domain::access::{AccessDecision, DenyReason, KycStatus, VendorStanding};
use crate::domain::ports::VendorStandingBox;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateConfig {
    /// Highest unpaid balance a vendor may carry and still manage orders.
    pub due_threshold: Decimal,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            due_threshold: dec!(5000.00),
        }
    }
}

/// Decides whether a vendor may reach the order screens at all.
pub struct AccessGate {
    source: VendorStandingBox,
    config: GateConfig,
}

impl AccessGate {
    pub fn new(source: VendorStandingBox, config: GateConfig) -> Self {
        Self { source, config }
    }

    pub async fn check(&self, vendor_id: u64, now: DateTime<Utc>) -> Result<AccessDecision> {
        let standing = self.source.standing(vendor_id).await?;
        let decision = evaluate(&standing, &self.config, now);
        info!(vendor_id, granted = decision.is_granted(), "Access gate evaluated");
        Ok(decision)
    }
}

/// Checks run in order and the first failure wins.
pub fn evaluate(standing: &VendorStanding, config: &GateConfig, now: DateTime<Utc>) -> AccessDecision {
    if standing.kyc_status != KycStatus::Approved {
        return AccessDecision::Denied(DenyReason::KycNotApproved(standing.kyc_status));
    }
    match standing.subscription_expires_at {
        None => return AccessDecision::Denied(DenyReason::NoSubscription),
        Some(expires_at) if expires_at <= now => {
            return AccessDecision::Denied(DenyReason::SubscriptionExpired(expires_at));
        }
        Some(_) => {}
    }
    if standing.due_balance > config.due_threshold {
        return AccessDecision::Denied(DenyReason::DuesOverLimit {
            due: standing.due_balance,
            limit: config.due_threshold,
        });
    }
    AccessDecision::Granted
}
