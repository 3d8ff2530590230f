//! Application layer: the services that drive the order lifecycle.
//!
//! Every service is an explicitly constructed value owned by whoever runs it.
//! Background loops (live polling, payment polling, push receiving) are tied
//! to a [`shutdown::ShutdownTrigger`] or channel handle held by that owner.

pub mod access_gate;
pub mod orchestrator;
pub mod payment_client;
pub mod poller;
pub mod receiver;
pub mod shutdown;
