//! CSV adapters used by the command line: carts in, order queues out.

pub mod cart_reader;
pub mod queue_writer;
