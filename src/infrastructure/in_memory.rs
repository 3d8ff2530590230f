use crate::domain::access::VendorStanding;
use crate::domain::notification::Notification;
use crate::domain::order::{Order, OrderId, OrderStatus, TransitionCommand};
use crate::domain::payment::{CallbackDisposition, PaymentCallback};
use crate::domain::ports::{
    CallbackOutcome, ClientWindows, NotificationSink, OrderQuery, OrderStore,
    PaymentCallbackHandler, VendorStandingSource, WindowId,
};
use crate::error::{OrderFlowError, Result, TransitionError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Default)]
struct OrderTable {
    orders: BTreeMap<OrderId, Order>,
    by_txn: HashMap<String, OrderId>,
    next_id: u64,
    unavailable: HashSet<OrderStatus>,
    list_delay: Option<Duration>,
}

/// A thread-safe in-memory order store.
///
/// Orders live in a `BTreeMap` keyed by id; a second index maps each
/// gateway transaction to the order it produced so that callback redelivery
/// never creates a duplicate.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an order as-is, assigning the next id. Used to seed fixtures.
    pub async fn insert(&self, mut order: Order) -> Order {
        let mut table = self.table.write().await;
        table.next_id += 1;
        order.id = OrderId(table.next_id);
        table.orders.insert(order.id, order.clone());
        order
    }

    /// Makes listings of `status` fail until cleared. Simulates a flaky backend.
    pub async fn set_unavailable(&self, status: OrderStatus, unavailable: bool) {
        let mut table = self.table.write().await;
        if unavailable {
            table.unavailable.insert(status);
        } else {
            table.unavailable.remove(&status);
        }
    }

    /// Delays every listing. Simulates a slow backend.
    pub async fn set_list_delay(&self, delay: Option<Duration>) {
        self.table.write().await.list_delay = delay;
    }

    pub async fn order_for_txn(&self, gateway_txn_id: &str) -> Option<Order> {
        let table = self.table.read().await;
        table
            .by_txn
            .get(gateway_txn_id)
            .and_then(|id| table.orders.get(id))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let delay = self.table.read().await.list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let table = self.table.read().await;
        if table.unavailable.contains(&query.status) {
            return Err(OrderFlowError::Store(format!(
                "listing '{}' orders is unavailable",
                query.status
            )));
        }
        Ok(table
            .orders
            .values()
            .filter(|o| o.vendor_id == query.vendor_id && o.status == query.status)
            .filter(|o| o.is_visible())
            .take(query.page_size)
            .cloned()
            .collect())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.table.read().await.orders.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: OrderId,
        command: &TransitionCommand,
    ) -> std::result::Result<Order, TransitionError> {
        let mut table = self.table.write().await;
        let order = table
            .orders
            .get_mut(&id)
            .ok_or(TransitionError::NotFound(id))?;
        let changed = order.apply(command, Utc::now())?;
        debug!(order_id = %id, status = %order.status, changed, "Order transition applied");
        Ok(order.clone())
    }
}

#[async_trait]
impl PaymentCallbackHandler for InMemoryOrderStore {
    async fn on_payment_settled(&self, callback: PaymentCallback) -> Result<CallbackOutcome> {
        let mut table = self.table.write().await;
        if let Some(existing) = table
            .by_txn
            .get(&callback.gateway_txn_id)
            .and_then(|id| table.orders.get(id))
        {
            debug!(txn = %callback.gateway_txn_id, order_id = %existing.id, "Callback redelivered");
            return Ok(CallbackOutcome::AlreadyCreated(existing.clone()));
        }
        let payload = match callback.disposition()? {
            CallbackDisposition::Create(payload) => payload,
            CallbackDisposition::Ignore(reason) => {
                debug!(txn = %callback.gateway_txn_id, %reason, "Callback ignored");
                return Ok(CallbackOutcome::Ignored(reason));
            }
        };
        let order = Order::from_payload(OrderId(table.next_id + 1), payload, Utc::now())?;
        table.next_id += 1;
        table
            .by_txn
            .insert(callback.gateway_txn_id.clone(), order.id);
        table.orders.insert(order.id, order.clone());
        info!(txn = %callback.gateway_txn_id, order_id = %order.id, total = %order.total, "Order created from settled payment");
        Ok(CallbackOutcome::Created(order))
    }
}

/// Notification tray that keeps one entry per tag, newest content wins.
#[derive(Default, Clone)]
pub struct InMemoryNotificationCenter {
    displayed: Arc<RwLock<Vec<Notification>>>,
    shows: Arc<RwLock<usize>>,
}

impl InMemoryNotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn displayed(&self) -> Vec<Notification> {
        self.displayed.read().await.clone()
    }

    /// Number of `show` calls, including ones that replaced an entry.
    pub async fn show_count(&self) -> usize {
        *self.shows.read().await
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationCenter {
    async fn show(&self, notification: Notification) -> Result<()> {
        let mut displayed = self.displayed.write().await;
        match displayed.iter_mut().find(|n| n.tag == notification.tag) {
            Some(slot) => *slot = notification,
            None => displayed.push(notification),
        }
        *self.shows.write().await += 1;
        Ok(())
    }
}

#[derive(Default)]
struct WindowTable {
    open: Vec<(WindowId, String)>,
    next_id: WindowId,
    focused: Option<WindowId>,
}

/// Window registry for running the receiver without a real client.
#[derive(Default, Clone)]
pub struct InMemoryWindows {
    table: Arc<RwLock<WindowTable>>,
}

impl InMemoryWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with one window already open at each url.
    pub async fn with_open(urls: &[&str]) -> Self {
        let windows = Self::new();
        for url in urls {
            windows.push(url).await;
        }
        windows
    }

    async fn push(&self, url: &str) -> WindowId {
        let mut table = self.table.write().await;
        table.next_id += 1;
        let id = table.next_id;
        table.open.push((id, url.to_string()));
        id
    }

    pub async fn urls(&self) -> Vec<String> {
        let table = self.table.read().await;
        table.open.iter().map(|(_, url)| url.clone()).collect()
    }

    pub async fn focused(&self) -> Option<WindowId> {
        self.table.read().await.focused
    }
}

#[async_trait]
impl ClientWindows for InMemoryWindows {
    async fn list(&self) -> Result<Vec<WindowId>> {
        let table = self.table.read().await;
        Ok(table.open.iter().map(|(id, _)| *id).collect())
    }

    async fn focus(&self, window: WindowId) -> Result<()> {
        let mut table = self.table.write().await;
        if !table.open.iter().any(|(id, _)| *id == window) {
            return Err(OrderFlowError::Store(format!("window {window} is not open")));
        }
        table.focused = Some(window);
        Ok(())
    }

    async fn open(&self, url: &str) -> Result<WindowId> {
        let id = self.push(url).await;
        self.table.write().await.focused = Some(id);
        Ok(id)
    }
}

/// Fixed vendor standings, keyed by vendor id.
#[derive(Default, Clone)]
pub struct InMemoryStandingSource {
    standings: Arc<RwLock<HashMap<u64, VendorStanding>>>,
}

impl InMemoryStandingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, vendor_id: u64, standing: VendorStanding) {
        self.standings.write().await.insert(vendor_id, standing);
    }
}

#[async_trait]
impl VendorStandingSource for InMemoryStandingSource {
    async fn standing(&self, vendor_id: u64) -> Result<VendorStanding> {
        self.standings
            .read()
            .await
            .get(&vendor_id)
            .cloned()
            .ok_or_else(|| OrderFlowError::Store(format!("no standing for vendor {vendor_id}")))
    }
}
