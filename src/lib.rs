//! # Solana Bonk Bundler
//!
//! Multi-wallet swap execution for BonkFun launchpad tokens, with automatic
//! venue resolution and Jito-style bundle submission.
//!
//! ## Architecture
//!
//! - `dex`: venue integrations (the BonkFun bonding curve and the Raydium
//!   CPMM pool a token migrates to), with pricing and instruction encoding
//! - `engine`: batch orchestration (sell-all, buy-all, delayed sells,
//!   consolidation into the main wallet)
//! - `block_engine`: bundle construction and relay submission
//! - `common`: configuration, caching, wallets, logging, and errors
//!
//! ## Safety
//!
//! This software moves real funds and carries significant financial risk.
//! Always test thoroughly on devnet before mainnet deployment.

pub mod block_engine;
pub mod common;
pub mod dex;
pub mod engine;

// Re-export commonly used types
pub use common::config::Config;
pub use common::error::SwapError;
pub use engine::SwapEngine;
