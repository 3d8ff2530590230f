#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use menuflow::application::orchestrator::OrderCreationOrchestrator;
use menuflow::application::payment_client::PaymentGatewayClient;
use menuflow::domain::order::{Customer, LineItem, Order, OrderId, OrderPayload};
use menuflow::domain::payment::IntentStatus;
use menuflow::infrastructure::in_memory::InMemoryOrderStore;
use menuflow::infrastructure::simulated_gateway::SimulatedGateway;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub const VENDOR: u64 = 1;

pub fn customer() -> Customer {
    Customer {
        name: "Ravi Kumar".to_string(),
        phone: "9811111111".to_string(),
        email: Some("ravi@example.com".to_string()),
        table_number: Some("4".to_string()),
    }
}

/// Two thalis, 250.00 in total.
pub fn thali_cart() -> Vec<LineItem> {
    vec![LineItem {
        product_id: 3,
        product_name: "Veg Thali".to_string(),
        variant: None,
        unit_price: dec!(125.00),
        quantity: 2,
    }]
}

pub fn created_at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap() + Duration::minutes(minutes)
}

/// A paid order for `VENDOR`, created `minutes` after a fixed instant.
pub fn paid_order(minutes: i64) -> Order {
    let payload = OrderPayload {
        vendor_id: VENDOR,
        customer: customer(),
        items: thali_cart(),
    };
    Order::from_payload(OrderId(0), payload, created_at(minutes)).unwrap()
}

/// Checkout wired end to end: simulated gateway settling into an in-memory store.
pub struct Pipeline {
    pub store: Arc<InMemoryOrderStore>,
    pub gateway: SimulatedGateway,
    pub payments: Arc<PaymentGatewayClient>,
    pub orchestrator: OrderCreationOrchestrator,
}

pub fn pipeline() -> Pipeline {
    let store = Arc::new(InMemoryOrderStore::new());
    let gateway = SimulatedGateway::new("https://pay.example").with_callback_handler(store.clone());
    let payments = Arc::new(PaymentGatewayClient::new(Box::new(gateway.clone())));
    let orchestrator = OrderCreationOrchestrator::new(payments.clone());
    Pipeline {
        store,
        gateway,
        payments,
        orchestrator,
    }
}

impl Pipeline {
    /// Submits the thali cart and settles it with `outcome`. Returns the transaction id.
    pub async fn checkout(&self, outcome: IntentStatus) -> String {
        let redirect = self
            .orchestrator
            .submit_order(thali_cart(), customer(), VENDOR)
            .await
            .unwrap();
        self.gateway
            .settle(&redirect.gateway_txn_id, outcome)
            .await
            .unwrap();
        redirect.gateway_txn_id
    }
}
