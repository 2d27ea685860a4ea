use anchor_client::solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Error taxonomy for the swap/bundle pipeline.
///
/// `Network` is transient and the whole operation may be retried by the
/// caller. `PoolNotFound` is terminal for the mint. `Decode` means the
/// on-chain account layout no longer matches what we expect and must
/// propagate. `SizeExceeded` and `InsufficientBalance` are per-wallet:
/// the wallet is skipped and the batch continues.
#[derive(Debug, Clone, Error)]
pub enum SwapError {
    #[error("network error: {0}")]
    Network(String),

    #[error("no pool found for mint {0}")]
    PoolNotFound(Pubkey),

    #[error("account data did not match the expected layout: {0}")]
    Decode(String),

    #[error("serialized transaction is {0} bytes, over the packet limit")]
    SizeExceeded(usize),

    #[error("no balance to trade")]
    InsufficientBalance,
}

impl SwapError {
    /// Whether retrying the whole operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SwapError::Network(_))
    }
}
