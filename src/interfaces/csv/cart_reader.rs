use crate::domain::order::LineItem;
use crate::error::{OrderFlowError, Result};
use std::io::Read;

/// Reads cart lines from a CSV source.
///
/// Expected header: `product_id,product_name,variant,unit_price,quantity`.
/// Whitespace is trimmed and an empty `variant` reads as none.
pub struct CartReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CartReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes one line item per record.
    pub fn items(self) -> impl Iterator<Item = Result<LineItem>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(OrderFlowError::from))
    }

    /// Reads the whole cart, stopping at the first bad record.
    pub fn read_cart(self) -> Result<Vec<LineItem>> {
        self.items().collect()
    }
}
