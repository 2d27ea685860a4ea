//! Venue integrations.
//!
//! A mint trades on exactly one of two venues at any time: the BonkFun
//! bonding curve before migration, the Raydium CPMM pool after. Both are
//! opaque on-chain programs addressed only through their account layouts
//! and instruction encodings.

pub mod bonk_fun;
pub mod raydium_cpmm;

use std::sync::Arc;
use solana_sdk::pubkey::Pubkey;

use crate::common::cache::POOL_CACHE;
use crate::common::error::SwapError;
use bonk_fun::CurvePool;
use raydium_cpmm::CpmmPool;

pub const TEN_THOUSAND: u64 = 10_000;
pub const MAX_SLIPPAGE_BPS: u64 = 9_999;

/// Normalized on-chain pool state, tagged by venue. Exactly one variant
/// exists per mint; which one is decided solely by migration status.
#[derive(Debug, Clone)]
pub enum PoolDescriptor {
    BondingCurve(CurvePool),
    ConstantProduct(CpmmPool),
}

impl PoolDescriptor {
    pub fn address(&self) -> Pubkey {
        match self {
            PoolDescriptor::BondingCurve(pool) => pool.address,
            PoolDescriptor::ConstantProduct(pool) => pool.address,
        }
    }
}

/// Slippage-bounded parameters for one swap instruction. Ephemeral:
/// created and consumed within a single sell/buy call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    pub input_amount: u64,
    pub minimum_out: u64,
    pub slippage_bps: u64,
}

/// Slippage floor shared by both venues:
/// `floor(amount * (10000 - slippage_bps) / 10000)`.
pub fn min_amount_with_slippage(amount: u64, slippage_bps: u64) -> u64 {
    let slippage_bps = slippage_bps.min(MAX_SLIPPAGE_BPS);
    ((amount as u128) * ((TEN_THOUSAND - slippage_bps) as u128) / (TEN_THOUSAND as u128)) as u64
}

/// Resolve the active venue for `mint` and fetch its pool state.
///
/// The resolved descriptor is cached for five minutes; a failed swap
/// invalidates it so the next call re-reads the chain.
pub async fn get_pool_descriptor(
    rpc_client: Arc<anchor_client::solana_client::rpc_client::RpcClient>,
    rpc_nonblocking_client: &anchor_client::solana_client::nonblocking::rpc_client::RpcClient,
    mint: &Pubkey,
) -> Result<PoolDescriptor, SwapError> {
    if let Some(pool) = POOL_CACHE.get(mint) {
        return Ok(pool);
    }

    let migrated = raydium_cpmm::check_migration(rpc_nonblocking_client, mint).await;
    let pool = if migrated {
        PoolDescriptor::ConstantProduct(
            raydium_cpmm::fetch_cpmm_pool(rpc_nonblocking_client, mint).await?,
        )
    } else {
        PoolDescriptor::BondingCurve(bonk_fun::fetch_curve_pool(rpc_client, mint)?)
    };

    POOL_CACHE.insert(*mint, pool.clone(), None);
    Ok(pool)
}

/// Drop cached venue and pool state for `mint`, forcing a fresh resolve.
pub fn invalidate_pool(mint: &Pubkey) {
    POOL_CACHE.invalidate(mint);
    crate::common::cache::MIGRATION_CACHE.invalidate(mint);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slippage_floor_is_exact_at_zero_bps() {
        assert_eq!(min_amount_with_slippage(1_000_000, 0), 1_000_000);
    }

    #[test]
    fn slippage_floor_is_monotonically_non_increasing() {
        let estimate = 987_654_321u64;
        let mut last = u64::MAX;
        for bps in [0u64, 1, 50, 500, 2_500, 9_999] {
            let out = min_amount_with_slippage(estimate, bps);
            assert!(out <= last, "min_out grew when slippage rose to {} bps", bps);
            last = out;
        }
    }

    #[test]
    fn slippage_floor_rounds_down() {
        // 10_001 * 9950 / 10000 = 9950.995 -> 9950
        assert_eq!(min_amount_with_slippage(10_001, 50), 9_950);
    }
}
