//! Server side of the transfer protocol.

pub mod engine;

pub use engine::{TransferEngine, TransferJob};
