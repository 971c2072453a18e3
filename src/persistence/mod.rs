//! File-backed persistence for order records and CSV exchange.

pub mod csv;
pub mod order_store;

pub use order_store::OrderStore;
