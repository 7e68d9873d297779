pub(crate) mod connection;
pub(crate) mod session;

pub use connection::{OptimisticStore, StoreConfig};
pub use session::{Change, Session, SessionTxn};
