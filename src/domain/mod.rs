//! Domain types and the ports the application layer talks through.

pub mod access;
pub mod notification;
pub mod order;
pub mod payment;
pub mod ports;
