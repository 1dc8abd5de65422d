//! Write support: the per-call transaction that turns a byte-range write
//! into page mutations plus size and dirty-flag updates.

mod transaction;

pub use transaction::{TxState, WriteTransaction};
