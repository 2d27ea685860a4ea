use std::str::FromStr;
use lazy_static::lazy_static;
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig},
    rpc_filter::{Memcmp, RpcFilterType},
};
use solana_sdk::{
    account::Account,
    commitment_config::CommitmentConfig,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::common::cache::MIGRATION_CACHE;
use crate::common::error::SwapError;
use crate::common::logger::Logger;
use crate::dex::{min_amount_with_slippage, SwapQuote};

pub const RAYDIUM_CPMM_PROGRAM: &str = "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C";
pub const RAYDIUM_AUTHORITY: &str = "GpMZbSM2GgvTKHJirzeGfMFoaZ8UR2X7F4v8vHTvxFbL";

pub const CPMM_SWAP_METHOD: u64 = u64::from_le_bytes([143, 190, 90, 218, 196, 30, 51, 222]);

/// Fixed pool account span and field offsets. Migrated pools are found by
/// matching the traded mint at `CPMM_MINT0_OFFSET`.
pub const CPMM_POOL_SPAN: u64 = 680;
pub const CPMM_CONFIG_OFFSET: usize = 8;
pub const CPMM_VAULT0_OFFSET: usize = 72;
pub const CPMM_VAULT1_OFFSET: usize = 104;
pub const CPMM_MINT0_OFFSET: usize = 264;
pub const CPMM_MINT1_OFFSET: usize = 296;
pub const CPMM_OBSERVATION_OFFSET: usize = 424;

lazy_static! {
    static ref RAYDIUM_CPMM_PROGRAM_ID: Pubkey = Pubkey::from_str(RAYDIUM_CPMM_PROGRAM).unwrap();
    static ref RAYDIUM_AUTHORITY_ID: Pubkey = Pubkey::from_str(RAYDIUM_AUTHORITY).unwrap();
    static ref TOKEN_PROGRAM_ID: Pubkey = Pubkey::from_str(super::bonk_fun::TOKEN_PROGRAM).unwrap();
}

/// Constant-product pool state normalized for instruction building. Mints
/// and vaults keep the pool's own ordering, which is not token-first.
#[derive(Debug, Clone)]
pub struct CpmmPool {
    pub address: Pubkey,
    pub amm_config: Pubkey,
    pub token0_vault: Pubkey,
    pub token1_vault: Pubkey,
    pub token0_mint: Pubkey,
    pub token1_mint: Pubkey,
    pub observation_key: Pubkey,
}

async fn scan_pool_accounts(
    rpc_client: &anchor_client::solana_client::nonblocking::rpc_client::RpcClient,
    mint: &Pubkey,
) -> Result<Vec<(Pubkey, Account)>, SwapError> {
    let filters = vec![
        RpcFilterType::DataSize(CPMM_POOL_SPAN),
        RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
            CPMM_MINT0_OFFSET,
            mint.to_bytes().to_vec(),
        )),
    ];
    let config = RpcProgramAccountsConfig {
        filters: Some(filters),
        account_config: RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            commitment: Some(CommitmentConfig::processed()),
            ..Default::default()
        },
        ..Default::default()
    };

    rpc_client
        .get_program_accounts_with_config(&RAYDIUM_CPMM_PROGRAM_ID, config)
        .await
        .map_err(|e| SwapError::Network(e.to_string()))
}

/// Whether `mint` has migrated off the bonding curve onto the CPMM venue.
///
/// A network failure resolves to `false` (the curve keeps working either
/// way) and is never cached, so the next call probes again. Successful
/// answers are cached for five minutes.
pub async fn check_migration(
    rpc_client: &anchor_client::solana_client::nonblocking::rpc_client::RpcClient,
    mint: &Pubkey,
) -> bool {
    if let Some(migrated) = MIGRATION_CACHE.get(mint) {
        return migrated;
    }

    match scan_pool_accounts(rpc_client, mint).await {
        Ok(pools) => {
            let migrated = !pools.is_empty();
            MIGRATION_CACHE.insert(*mint, migrated, None);
            migrated
        }
        Err(e) => {
            let logger = Logger::new("[MIGRATION-CHECK] => ".to_string());
            logger.error(format!("probe failed for {}: {}", mint, e));
            false
        }
    }
}

/// Fetch and decode the CPMM pool hosting `mint`.
pub async fn fetch_cpmm_pool(
    rpc_client: &anchor_client::solana_client::nonblocking::rpc_client::RpcClient,
    mint: &Pubkey,
) -> Result<CpmmPool, SwapError> {
    let pools = scan_pool_accounts(rpc_client, mint).await?;
    let (address, account) = pools.into_iter().next().ok_or(SwapError::PoolNotFound(*mint))?;
    decode_cpmm_pool(address, &account.data)
}

fn read_pubkey(data: &[u8], offset: usize) -> Result<Pubkey, SwapError> {
    let bytes: [u8; 32] = data[offset..offset + 32]
        .try_into()
        .map_err(|_| SwapError::Decode(format!("pubkey at offset {}", offset)))?;
    Ok(Pubkey::new_from_array(bytes))
}

pub fn decode_cpmm_pool(address: Pubkey, data: &[u8]) -> Result<CpmmPool, SwapError> {
    if data.len() < CPMM_POOL_SPAN as usize {
        return Err(SwapError::Decode(format!(
            "cpmm pool account is {} bytes, layout needs {}",
            data.len(),
            CPMM_POOL_SPAN
        )));
    }

    Ok(CpmmPool {
        address,
        amm_config: read_pubkey(data, CPMM_CONFIG_OFFSET)?,
        token0_vault: read_pubkey(data, CPMM_VAULT0_OFFSET)?,
        token1_vault: read_pubkey(data, CPMM_VAULT1_OFFSET)?,
        token0_mint: read_pubkey(data, CPMM_MINT0_OFFSET)?,
        token1_mint: read_pubkey(data, CPMM_MINT1_OFFSET)?,
        observation_key: read_pubkey(data, CPMM_OBSERVATION_OFFSET)?,
    })
}

/// Local slippage floor for a CPMM swap. The program enforces the real
/// curve on-chain; this value only bounds the instruction's minimum-out
/// field and is not a price estimate.
pub fn swap_quote(amount_in: u64, slippage_bps: u64) -> SwapQuote {
    SwapQuote {
        input_amount: amount_in,
        minimum_out: min_amount_with_slippage(amount_in, slippage_bps),
        slippage_bps,
    }
}

fn build_swap_instruction(
    owner: &Pubkey,
    input_mint: &Pubkey,
    output_mint: &Pubkey,
    input_account: &Pubkey,
    output_account: &Pubkey,
    pool: &CpmmPool,
    amount_in: u64,
    slippage_bps: u64,
) -> Result<Instruction, SwapError> {
    if amount_in == 0 {
        return Err(SwapError::InsufficientBalance);
    }
    let quote = swap_quote(amount_in, slippage_bps);

    let (input_vault, output_vault) = if pool.token0_mint == *input_mint {
        (pool.token0_vault, pool.token1_vault)
    } else {
        (pool.token1_vault, pool.token0_vault)
    };

    let accounts = vec![
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new_readonly(*RAYDIUM_AUTHORITY_ID, false),
        AccountMeta::new_readonly(pool.amm_config, false),
        AccountMeta::new(pool.address, false),
        AccountMeta::new(*input_account, false),
        AccountMeta::new(*output_account, false),
        AccountMeta::new(input_vault, false),
        AccountMeta::new(output_vault, false),
        AccountMeta::new_readonly(*TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(*TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(*input_mint, false),
        AccountMeta::new_readonly(*output_mint, false),
        AccountMeta::new(pool.observation_key, false),
    ];

    Ok(Instruction::new_with_bincode(
        *RAYDIUM_CPMM_PROGRAM_ID,
        &(CPMM_SWAP_METHOD, quote.input_amount, quote.minimum_out),
        accounts,
    ))
}

/// Sell `token_amount` of `mint` into the pool for wrapped SOL.
pub fn build_sell_instruction(
    owner: &Pubkey,
    mint: &Pubkey,
    token_account: &Pubkey,
    wsol_account: &Pubkey,
    pool: &CpmmPool,
    token_amount: u64,
    slippage_bps: u64,
) -> Result<Instruction, SwapError> {
    build_swap_instruction(
        owner,
        mint,
        &spl_token::native_mint::ID,
        token_account,
        wsol_account,
        pool,
        token_amount,
        slippage_bps,
    )
}

/// Buy `mint` with `lamports_in` of wrapped SOL.
pub fn build_buy_instruction(
    owner: &Pubkey,
    mint: &Pubkey,
    token_account: &Pubkey,
    wsol_account: &Pubkey,
    pool: &CpmmPool,
    lamports_in: u64,
    slippage_bps: u64,
) -> Result<Instruction, SwapError> {
    build_swap_instruction(
        owner,
        &spl_token::native_mint::ID,
        mint,
        wsol_account,
        token_account,
        pool,
        lamports_in,
        slippage_bps,
    )
}
