//! The DPA transaction engine: the sole owner of the coordinator channel,
//! responsible for serializing transactions, arbitrating exclusive access,
//! and discovering coordinator identity at startup.

mod domain_types;
mod engine_impl;
mod lease;
mod traits;
mod transaction;

pub use domain_types::{BondedBitmap, CoordinatorParameters, McuType, RfMode, TimeoutMs, TimingParams};
pub use engine_impl::{AsyncHandler, DpaEngineImpl};
pub use lease::ExclusiveLease;
pub use traits::{DpaEngine, EngineError};
pub use transaction::{PendingTransaction, TransactionState};
