//! Wallet Ledger Common Types
//!
//! Shared types used across the wallet ledger crates: account and
//! transaction identifiers, amount validation and the error taxonomy.

pub mod error;
pub mod identifiers;
pub mod monetary;

pub use error::*;
pub use identifiers::*;
pub use monetary::*;
