//! Liquidation selection and proceeds reconciliation.
//!
//! When the liquidation wakeup fires, every vault below the collateralization
//! criteria is moved into a single custody seat in one atomic transfer. Once
//! the auction reports what it recovered, the batch is settled against its
//! total debt.

pub mod custody;
pub mod engine;
pub mod proceeds;
pub mod vault;

pub use custody::*;
pub use engine::*;
pub use proceeds::*;
pub use vault::*;
