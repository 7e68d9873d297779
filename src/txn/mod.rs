pub mod conflict;
pub mod coordinator;
pub mod delta;
pub mod notify;
pub mod trace;
pub mod transaction;

pub use conflict::affects;
pub use coordinator::{ConflictMark, LockCoordinator, MembershipHold, PreparationHold, TxnSlot};
pub use delta::Delta;
pub use notify::{ChangeEvent, ChangeListener, ListenerId, ObserverList};
pub use trace::{ReadOperation, ReadTrace};
pub use transaction::{EscalationPolicy, IsolationLevel, Transaction, TxnState, LARGE_BLOCK};

pub type TxnId = u64;
pub const TXN_NONE: TxnId = 0;
