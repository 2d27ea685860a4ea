//! Batch swap orchestration.

pub mod swap;

pub use swap::{SwapEngine, BatchReport, SellSkip, WalletHolding};
