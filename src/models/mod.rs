pub mod address_set;
pub mod block;
pub mod transaction;

pub use address_set::WatchedAddressSet;
pub use block::{Block, HeightRange};
pub use transaction::{Prevout, Transaction, TransactionPage, TxInput, TxOutput, TxStatus};
