use crate::application::poller::{Bucket, QueueSnapshot};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct QueueRow<'a> {
    bucket: Bucket,
    id: u64,
    customer: &'a str,
    phone: &'a str,
    table: Option<&'a str>,
    total: Decimal,
    status: &'a str,
    created_at: DateTime<Utc>,
    actions: String,
}

/// Writes a queue snapshot as CSV, one row per displayed order.
///
/// Buckets keep their display order; allowed actions are joined with `|`
/// and left empty while a command is in flight.
pub struct QueueWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> QueueWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_snapshot(&mut self, snapshot: &QueueSnapshot) -> Result<()> {
        for (bucket, view) in &snapshot.buckets {
            for queued in &view.orders {
                let actions = if queued.in_flight {
                    String::new()
                } else {
                    queued
                        .actions
                        .iter()
                        .map(|a| a.as_str())
                        .collect::<Vec<_>>()
                        .join("|")
                };
                let order = &queued.order;
                self.writer.serialize(QueueRow {
                    bucket: *bucket,
                    id: order.id.0,
                    customer: &order.customer_name,
                    phone: &order.phone,
                    table: order.table_number.as_deref(),
                    total: order.total,
                    status: order.status.as_str(),
                    created_at: order.created_at,
                    actions,
                })?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}
