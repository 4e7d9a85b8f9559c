//! Bridging between the telephony and assistant connections.

pub mod classifier;
pub mod connection;
pub mod frame;
pub mod session;
