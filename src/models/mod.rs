//! Domain models shared by the supervisor, store, and transports.

pub mod order;
pub mod status;
