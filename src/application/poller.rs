//! Vendor-facing live view of the order queues.
//!
//! Each status bucket is fetched independently on a fixed interval and shown
//! oldest first. A failed fetch leaves that bucket's previous list in place.
//! Vendor commands go straight to the store and are confirmed by re-fetching,
//! never by editing the local copy.

use crate::application::shutdown::{self, Shutdown, ShutdownTrigger};
use crate::domain::order::{Order, OrderId, OrderStatus, VendorAction};
use crate::domain::ports::{OrderQuery, OrderStoreRef};
use crate::error::TransitionError;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as FetchLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The queues a vendor works from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Pending,
    Accepted,
    Running,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Pending, Bucket::Accepted, Bucket::Running];

    pub fn status(&self) -> OrderStatus {
        match self {
            Bucket::Pending => OrderStatus::Pending,
            Bucket::Accepted => OrderStatus::Accepted,
            Bucket::Running => OrderStatus::Running,
        }
    }

    pub fn for_status(status: OrderStatus) -> Option<Bucket> {
        match status {
            OrderStatus::Pending => Some(Bucket::Pending),
            OrderStatus::Accepted => Some(Bucket::Accepted),
            OrderStatus::Running => Some(Bucket::Running),
            _ => None,
        }
    }

    /// Commands offered on orders shown in this bucket.
    pub fn actions(&self) -> &'static [ActionKind] {
        match self {
            Bucket::Pending => &[ActionKind::Accept, ActionKind::Reject],
            Bucket::Accepted => &[ActionKind::Start, ActionKind::Reject],
            Bucket::Running => &[ActionKind::Ready],
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status().as_str())
    }
}

impl std::str::FromStr for Bucket {
    type Err = crate::error::OrderFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status: OrderStatus = s.parse()?;
        Bucket::for_status(status).ok_or_else(|| {
            crate::error::OrderFlowError::Validation(format!("'{s}' is not a live queue"))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Accept,
    Reject,
    Start,
    Ready,
}

impl ActionKind {
    pub fn of(action: &VendorAction) -> Option<ActionKind> {
        match action {
            VendorAction::Accept => Some(ActionKind::Accept),
            VendorAction::Reject { .. } => Some(ActionKind::Reject),
            VendorAction::Start => Some(ActionKind::Start),
            VendorAction::Ready => Some(ActionKind::Ready),
            VendorAction::Complete => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Accept => "accept",
            ActionKind::Reject => "reject",
            ActionKind::Start => "start",
            ActionKind::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub vendor_id: u64,
    pub interval: Duration,
    pub page_size: usize,
    pub buckets: Vec<Bucket>,
}

impl PollerConfig {
    pub fn new(vendor_id: u64) -> Self {
        Self {
            vendor_id,
            interval: Duration::from_secs(10),
            page_size: 50,
            buckets: Bucket::ALL.to_vec(),
        }
    }
}

/// One order as displayed, with the commands currently allowed on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedOrder {
    pub order: Order,
    pub actions: Vec<ActionKind>,
    /// A command for this order is awaiting the store; actions are disabled.
    pub in_flight: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketView {
    pub orders: Vec<QueuedOrder>,
    pub last_error: Option<String>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub generation: u64,
    pub buckets: BTreeMap<Bucket, BucketView>,
}

impl QueueSnapshot {
    pub fn bucket(&self, bucket: Bucket) -> Option<&BucketView> {
        self.buckets.get(&bucket)
    }

    pub fn order_ids(&self, bucket: Bucket) -> Vec<OrderId> {
        self.bucket(bucket)
            .map(|b| b.orders.iter().map(|q| q.order.id).collect())
            .unwrap_or_default()
    }

    fn locate(&self, id: OrderId) -> Option<Bucket> {
        self.buckets
            .iter()
            .find(|(_, view)| view.orders.iter().any(|q| q.order.id == id))
            .map(|(bucket, _)| *bucket)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(usize),
    /// A timer tick found the previous fetch for this bucket still outstanding.
    Skipped,
    Failed(String),
}

#[derive(Debug, Default)]
struct BucketState {
    orders: Vec<Order>,
    last_error: Option<String>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Releases the order when dropped, so an abandoned command never leaves it locked.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<OrderId>>,
    id: OrderId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

pub struct LiveStatusPoller {
    store: OrderStoreRef,
    config: PollerConfig,
    buckets: Mutex<HashMap<Bucket, BucketState>>,
    /// Held for the duration of each fetch of a bucket.
    fetching: HashMap<Bucket, FetchLock<()>>,
    in_flight: Mutex<HashSet<OrderId>>,
    generation: Mutex<u64>,
    snapshots: watch::Sender<QueueSnapshot>,
}

impl LiveStatusPoller {
    pub fn new(store: OrderStoreRef, config: PollerConfig) -> Self {
        let buckets = config
            .buckets
            .iter()
            .map(|b| (*b, BucketState::default()))
            .collect();
        let fetching = config
            .buckets
            .iter()
            .map(|b| (*b, FetchLock::new(())))
            .collect();
        let (snapshots, _) = watch::channel(QueueSnapshot::default());
        Self {
            store,
            config,
            buckets: Mutex::new(buckets),
            fetching,
            in_flight: Mutex::new(HashSet::new()),
            generation: Mutex::new(0),
            snapshots,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Receives a fresh snapshot after every refresh and every command.
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let in_flight = self.in_flight.lock().clone();
        let buckets = self.buckets.lock();
        let views = buckets
            .iter()
            .map(|(bucket, state)| {
                let orders = state
                    .orders
                    .iter()
                    .map(|order| QueuedOrder {
                        order: order.clone(),
                        actions: bucket.actions().to_vec(),
                        in_flight: in_flight.contains(&order.id),
                    })
                    .collect();
                (
                    *bucket,
                    BucketView {
                        orders,
                        last_error: state.last_error.clone(),
                        refreshed_at: state.refreshed_at,
                    },
                )
            })
            .collect();
        QueueSnapshot {
            generation: *self.generation.lock(),
            buckets: views,
        }
    }

    fn publish(&self) {
        *self.generation.lock() += 1;
        self.snapshots.send_replace(self.snapshot());
    }

    /// Timer refresh of one bucket. Skipped while the previous fetch for the
    /// bucket is still outstanding.
    pub async fn refresh_bucket(&self, bucket: Bucket) -> RefreshOutcome {
        let Some(lock) = self.fetching.get(&bucket) else {
            return RefreshOutcome::Skipped;
        };
        let Ok(_fetching) = lock.try_lock() else {
            debug!(%bucket, "Previous fetch still outstanding, skipping");
            return RefreshOutcome::Skipped;
        };
        self.fetch(bucket).await
    }

    /// Re-fetches one bucket after a mutation. Waits for an outstanding fetch
    /// to land first, so the list it publishes is never older than the mutation.
    pub async fn refetch_bucket(&self, bucket: Bucket) -> RefreshOutcome {
        let Some(lock) = self.fetching.get(&bucket) else {
            return RefreshOutcome::Skipped;
        };
        let _fetching = lock.lock().await;
        self.fetch(bucket).await
    }

    /// Fetches one bucket and replaces its list, oldest order first.
    async fn fetch(&self, bucket: Bucket) -> RefreshOutcome {
        let query = OrderQuery {
            vendor_id: self.config.vendor_id,
            status: bucket.status(),
            page_size: self.config.page_size,
        };
        let result = self.store.list(&query).await;

        let outcome = {
            let mut buckets = self.buckets.lock();
            let state = buckets.entry(bucket).or_default();
            match result {
                Ok(mut orders) => {
                    orders.retain(|o| o.is_visible() && o.status == bucket.status());
                    orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                    let count = orders.len();
                    state.orders = orders;
                    state.last_error = None;
                    state.refreshed_at = Some(Utc::now());
                    RefreshOutcome::Refreshed(count)
                }
                Err(e) => {
                    warn!(%bucket, error = %e, "Failed to fetch orders, keeping previous list");
                    state.last_error = Some(e.user_message());
                    RefreshOutcome::Failed(e.to_string())
                }
            }
        };
        self.publish();
        outcome
    }

    /// Refreshes every configured bucket concurrently. One bucket failing
    /// does not hold back the others.
    pub async fn refresh_all(&self) -> Vec<(Bucket, RefreshOutcome)> {
        let buckets = self.config.buckets.clone();
        let outcomes = join_all(buckets.iter().map(|b| self.refresh_bucket(*b))).await;
        buckets.into_iter().zip(outcomes).collect()
    }

    /// Re-fetches every configured bucket after a mutation.
    pub async fn refetch_all(&self) -> Vec<(Bucket, RefreshOutcome)> {
        let buckets = self.config.buckets.clone();
        let outcomes = join_all(buckets.iter().map(|b| self.refetch_bucket(*b))).await;
        buckets.into_iter().zip(outcomes).collect()
    }

    /// Sends a vendor command for one order, then re-fetches immediately.
    ///
    /// A second command for the same order is refused until the first resolves.
    pub async fn apply(&self, id: OrderId, action: VendorAction) -> Result<Order, TransitionError> {
        if let Some(bucket) = self.snapshot().locate(id) {
            let allowed = ActionKind::of(&action).is_some_and(|k| bucket.actions().contains(&k));
            if !allowed {
                return Err(TransitionError::Illegal {
                    from: bucket.status(),
                    to: action.target(),
                });
            }
        }
        let name = action.name();
        let command = action.into_command()?;

        if !self.in_flight.lock().insert(id) {
            return Err(TransitionError::InFlight(id));
        }
        let guard = InFlightGuard {
            set: &self.in_flight,
            id,
        };
        self.publish();

        let result = self.store.transition(id, &command).await;
        drop(guard);

        match result {
            Ok(order) => {
                info!(order_id = %id, action = name, status = %order.status, "Order updated");
                self.refetch_all().await;
                Ok(order)
            }
            Err(e) => {
                warn!(order_id = %id, action = name, error = %e, "Order update failed");
                self.publish();
                Err(e)
            }
        }
    }

    /// Refreshes on every tick until `shutdown` fires. The first tick is immediate.
    pub async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            vendor_id = self.config.vendor_id,
            interval_secs = self.config.interval.as_secs(),
            "Live order polling started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh_all().await;
                }
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Live order polling stopped");
    }

    /// Starts polling on its own task. Polling stops when the handle is
    /// stopped or dropped.
    pub fn spawn(self: Arc<Self>) -> PollerHandle {
        let (trigger, shutdown) = shutdown::channel();
        let join = tokio::spawn(self.run(shutdown));
        PollerHandle { trigger, join }
    }
}

pub struct PollerHandle {
    trigger: ShutdownTrigger,
    join: JoinHandle<()>,
}

impl PollerHandle {
    pub async fn stop(self) {
        self.trigger.trigger();
        if let Err(e) = self.join.await {
            warn!(error = %e, "Poller task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_actions_match_state_machine() {
        for bucket in Bucket::ALL {
            for kind in bucket.actions() {
                let action = match kind {
                    ActionKind::Accept => VendorAction::Accept,
                    ActionKind::Reject => VendorAction::Reject {
                        reason: "x".to_string(),
                    },
                    ActionKind::Start => VendorAction::Start,
                    ActionKind::Ready => VendorAction::Ready,
                };
                assert!(bucket.status().can_move_to(action.target()));
            }
        }
    }

    #[test]
    fn test_bucket_parsing() {
        assert_eq!("pending".parse::<Bucket>().unwrap(), Bucket::Pending);
        assert_eq!("RUNNING".parse::<Bucket>().unwrap(), Bucket::Running);
        assert!("completed".parse::<Bucket>().is_err());
        assert!("nope".parse::<Bucket>().is_err());
    }
}
