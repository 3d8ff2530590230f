use crate::domain::order::{Order, OrderId, TransitionCommand};
use crate::domain::payment::{CallbackDisposition, PaymentCallback};
use crate::domain::ports::{CallbackOutcome, OrderQuery, OrderStore, PaymentCallbackHandler};
use crate::error::{OrderFlowError, Result, TransitionError};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Column Family for order records, keyed by big-endian order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family mapping gateway transaction ids to the order they created.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for counters.
pub const CF_META: &str = "meta";

const NEXT_ORDER_ID: &[u8] = b"next_order_id";

/// A persistent order store backed by RocksDB.
///
/// Order creation and the transaction index are written in one batch, so a
/// crash never leaves an order without its index entry or the reverse.
/// Writers are serialized through a single async mutex; readers go straight
/// to the database.
#[derive(Clone)]
pub struct RocksDbOrderStore {
    db: Arc<DB>,
    writes: Arc<Mutex<()>>,
}

impl RocksDbOrderStore {
    /// Opens or creates a RocksDB instance at `path` with the required column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ORDERS, CF_PAYMENTS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            writes: Arc::default(),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| OrderFlowError::Store(format!("Column family '{name}' not found")))
    }

    fn read_order(&self, id: OrderId) -> Result<Option<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        match self.db.get_cf(cf, id.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn order_for_txn(&self, gateway_txn_id: &str) -> Result<Option<Order>> {
        let cf = self.cf(CF_PAYMENTS)?;
        match self.db.get_cf(cf, gateway_txn_id.as_bytes())? {
            Some(bytes) => self.read_order(decode_id(&bytes)?),
            None => Ok(None),
        }
    }

    fn next_id(&self) -> Result<OrderId> {
        let cf = self.cf(CF_META)?;
        let last = match self.db.get_cf(cf, NEXT_ORDER_ID)? {
            Some(bytes) => decode_id(&bytes)?.0,
            None => 0,
        };
        Ok(OrderId(last + 1))
    }

    fn write_order(&self, order: &Order) -> Result<()> {
        let cf = self.cf(CF_ORDERS)?;
        self.db
            .put_cf(cf, order.id.0.to_be_bytes(), serde_json::to_vec(order)?)?;
        Ok(())
    }

    fn create(&self, gateway_txn_id: &str, order: &Order) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_ORDERS)?,
            order.id.0.to_be_bytes(),
            serde_json::to_vec(order)?,
        );
        batch.put_cf(
            self.cf(CF_PAYMENTS)?,
            gateway_txn_id.as_bytes(),
            order.id.0.to_be_bytes(),
        );
        batch.put_cf(self.cf(CF_META)?, NEXT_ORDER_ID, order.id.0.to_be_bytes());
        self.db.write(batch)?;
        Ok(())
    }
}

fn decode_id(bytes: &[u8]) -> Result<OrderId> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| OrderFlowError::Store(format!("Corrupt order id of {} bytes", bytes.len())))?;
    Ok(OrderId(u64::from_be_bytes(raw)))
}

fn storage(e: OrderFlowError) -> TransitionError {
    TransitionError::Storage(e.to_string())
}

#[async_trait]
impl OrderStore for RocksDbOrderStore {
    async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let order: Order = serde_json::from_slice(&value)?;
            if order.vendor_id == query.vendor_id
                && order.status == query.status
                && order.is_visible()
            {
                orders.push(order);
                if orders.len() == query.page_size {
                    break;
                }
            }
        }
        Ok(orders)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.read_order(id)
    }

    async fn transition(
        &self,
        id: OrderId,
        command: &TransitionCommand,
    ) -> std::result::Result<Order, TransitionError> {
        let _guard = self.writes.lock().await;
        let mut order = self
            .read_order(id)
            .map_err(storage)?
            .ok_or(TransitionError::NotFound(id))?;
        if order.apply(command, Utc::now())? {
            self.write_order(&order).map_err(storage)?;
        }
        debug!(order_id = %id, status = %order.status, "Order transition persisted");
        Ok(order)
    }
}

#[async_trait]
impl PaymentCallbackHandler for RocksDbOrderStore {
    async fn on_payment_settled(&self, callback: PaymentCallback) -> Result<CallbackOutcome> {
        let _guard = self.writes.lock().await;
        if let Some(existing) = self.order_for_txn(&callback.gateway_txn_id)? {
            debug!(txn = %callback.gateway_txn_id, order_id = %existing.id, "Callback redelivered");
            return Ok(CallbackOutcome::AlreadyCreated(existing));
        }
        let payload = match callback.disposition()? {
            CallbackDisposition::Create(payload) => payload,
            CallbackDisposition::Ignore(reason) => return Ok(CallbackOutcome::Ignored(reason)),
        };
        let order = Order::from_payload(self.next_id()?, payload, Utc::now())?;
        self.create(&callback.gateway_txn_id, &order)?;
        info!(txn = %callback.gateway_txn_id, order_id = %order.id, "Order persisted from settled payment");
        Ok(CallbackOutcome::Created(order))
    }
}
