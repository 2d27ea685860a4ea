//! Bundle construction and relay submission.

pub mod bundle;
pub mod jito;

pub use bundle::{build_bundles, BundleGroup, WalletJob};
pub use jito::{send_bundles, BundleResult};
