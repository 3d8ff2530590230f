use chrono::{Duration, Utc};
use menuflow::application::access_gate::{AccessGate, GateConfig};
use menuflow::domain::access::{AccessDecision, DenyReason, KycStatus, VendorStanding};
use menuflow::infrastructure::in_memory::InMemoryStandingSource;
use rust_decimal_macros::dec;

async fn gate(standing: VendorStanding) -> AccessGate {
    let source = InMemoryStandingSource::new();
    source.set(1, standing).await;
    AccessGate::new(Box::new(source), GateConfig::default())
}

#[tokio::test]
async fn test_vendor_in_good_standing_is_admitted() {
    let gate = gate(VendorStanding {
        kyc_status: KycStatus::Approved,
        subscription_expires_at: Some(Utc::now() + Duration::days(10)),
        due_balance: dec!(5000.00),
    })
    .await;

    assert_eq!(gate.check(1, Utc::now()).await.unwrap(), AccessDecision::Granted);
}

#[tokio::test]
async fn test_dues_over_default_threshold_are_denied() {
    let gate = gate(VendorStanding {
        kyc_status: KycStatus::Approved,
        subscription_expires_at: Some(Utc::now() + Duration::days(10)),
        due_balance: dec!(5000.01),
    })
    .await;

    assert!(matches!(
        gate.check(1, Utc::now()).await.unwrap(),
        AccessDecision::Denied(DenyReason::DuesOverLimit { .. })
    ));
}

#[tokio::test]
async fn test_subscription_expiry_is_checked_against_now() {
    let expires = Utc::now() + Duration::days(1);
    let gate = gate(VendorStanding {
        kyc_status: KycStatus::Approved,
        subscription_expires_at: Some(expires),
        due_balance: dec!(0),
    })
    .await;

    assert!(gate.check(1, Utc::now()).await.unwrap().is_granted());
    assert_eq!(
        gate.check(1, expires + Duration::seconds(1)).await.unwrap(),
        AccessDecision::Denied(DenyReason::SubscriptionExpired(expires))
    );
}

#[tokio::test]
async fn test_unknown_vendor_is_an_error() {
    let gate = gate(VendorStanding {
        kyc_status: KycStatus::NotSubmitted,
        subscription_expires_at: None,
        due_balance: dec!(0),
    })
    .await;

    assert!(gate.check(2, Utc::now()).await.is_err());
    assert_eq!(
        gate.check(1, Utc::now()).await.unwrap(),
        AccessDecision::Denied(DenyReason::KycNotApproved(KycStatus::NotSubmitted))
    );
}
