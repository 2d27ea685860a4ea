use std::str::FromStr;
use std::sync::Arc;
use borsh_derive::{BorshDeserialize, BorshSerialize};
use lazy_static::lazy_static;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};

use crate::common::error::SwapError;
use crate::dex::{min_amount_with_slippage, SwapQuote};

pub const BONK_FUN_PROGRAM: &str = "BFUNm9sH9RP3iKxwbJXVQjvTqDxj8YpvngCBvqxoWZRz";
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

// Anchor-style instruction discriminators, little-endian as u64 so the
// payload serializes as discriminator || amount || minimum_out.
pub const CURVE_SELL_METHOD: u64 = u64::from_le_bytes([51, 230, 133, 164, 1, 127, 131, 173]);
pub const CURVE_BUY_METHOD: u64 = u64::from_le_bytes([66, 0, 225, 24, 214, 117, 224, 36]);

pub const POOL_SEED: &[u8] = b"pool";
pub const CURVE_SEED: &[u8] = b"bonding_curve";
pub const GLOBAL_SEED: &[u8] = b"global";

lazy_static! {
    static ref BONK_FUN_PROGRAM_ID: Pubkey = Pubkey::from_str(BONK_FUN_PROGRAM).unwrap();
    static ref TOKEN_PROGRAM_ID: Pubkey = Pubkey::from_str(TOKEN_PROGRAM).unwrap();
}

/// On-chain layout of the launchpad pool account: an 8-byte discriminator
/// followed by little-endian reserve fields and the completion flag.
/// Accounts may carry trailing bytes beyond this prefix.
#[derive(Debug, BorshSerialize, BorshDeserialize)]
pub struct CurvePoolAccount {
    pub discriminator: u64,
    pub virtual_sol_reserves: u64,
    pub virtual_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
}

/// Bonding-curve pool state normalized for pricing and instruction building.
#[derive(Debug, Clone)]
pub struct CurvePool {
    pub address: Pubkey,
    pub virtual_sol_reserves: u64,
    pub virtual_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
}

pub fn get_pool_pda(mint: &Pubkey) -> Pubkey {
    let seeds = [POOL_SEED, mint.as_ref()];
    let (pool, _bump) = Pubkey::find_program_address(&seeds, &BONK_FUN_PROGRAM_ID);
    pool
}

pub fn get_curve_pda(mint: &Pubkey) -> Pubkey {
    let seeds = [CURVE_SEED, mint.as_ref()];
    let (curve, _bump) = Pubkey::find_program_address(&seeds, &BONK_FUN_PROGRAM_ID);
    curve
}

pub fn get_global_pda() -> Pubkey {
    let (global, _bump) = Pubkey::find_program_address(&[GLOBAL_SEED], &BONK_FUN_PROGRAM_ID);
    global
}

/// Fetch and decode the curve pool for `mint`.
///
/// A missing account means the mint never launched here (`PoolNotFound`);
/// data that does not decode means the program's layout moved under us and
/// the error propagates as [`SwapError::Decode`].
pub fn fetch_curve_pool(
    rpc_client: Arc<anchor_client::solana_client::rpc_client::RpcClient>,
    mint: &Pubkey,
) -> Result<CurvePool, SwapError> {
    let address = get_pool_pda(mint);
    let response = rpc_client
        .get_account_with_commitment(
            &address,
            anchor_client::solana_sdk::commitment_config::CommitmentConfig::processed(),
        )
        .map_err(|e| SwapError::Network(e.to_string()))?;

    let account = match response.value {
        Some(account) => account,
        None => return Err(SwapError::PoolNotFound(*mint)),
    };

    decode_curve_pool(address, &account.data)
}

pub fn decode_curve_pool(address: Pubkey, data: &[u8]) -> Result<CurvePool, SwapError> {
    let mut slice = data;
    let decoded = <CurvePoolAccount as borsh::BorshDeserialize>::deserialize(&mut slice)
        .map_err(|e| SwapError::Decode(format!("curve pool account: {}", e)))?;

    Ok(CurvePool {
        address,
        virtual_sol_reserves: decoded.virtual_sol_reserves,
        virtual_token_reserves: decoded.virtual_token_reserves,
        real_sol_reserves: decoded.real_sol_reserves,
        real_token_reserves: decoded.real_token_reserves,
        token_total_supply: decoded.token_total_supply,
        complete: decoded.complete,
    })
}

/// Estimated SOL out for selling `token_amount` into the curve, holding
/// `k = virtual_sol * virtual_token` invariant. The intermediate product is
/// computed in u128 and the division truncates toward zero, so rounding
/// always favors the pool.
pub fn sell_sol_out(
    virtual_sol_reserves: u64,
    virtual_token_reserves: u64,
    token_amount: u64,
) -> u64 {
    if virtual_sol_reserves == 0 || virtual_token_reserves == 0 || token_amount == 0 {
        return 0;
    }

    let k = (virtual_sol_reserves as u128) * (virtual_token_reserves as u128);
    let new_token_reserves = (virtual_token_reserves as u128) + (token_amount as u128);
    let new_sol_reserves = k / new_token_reserves;
    ((virtual_sol_reserves as u128) - new_sol_reserves) as u64
}

/// Estimated tokens out for buying with `lamports_in`, same invariant as
/// [`sell_sol_out`] with the sides exchanged.
pub fn buy_tokens_out(
    virtual_sol_reserves: u64,
    virtual_token_reserves: u64,
    lamports_in: u64,
) -> u64 {
    if virtual_sol_reserves == 0 || virtual_token_reserves == 0 || lamports_in == 0 {
        return 0;
    }

    let k = (virtual_sol_reserves as u128) * (virtual_token_reserves as u128);
    let new_sol_reserves = (virtual_sol_reserves as u128) + (lamports_in as u128);
    let new_token_reserves = k / new_sol_reserves;
    ((virtual_token_reserves as u128) - new_token_reserves) as u64
}

pub fn sell_quote(pool: &CurvePool, token_amount: u64, slippage_bps: u64) -> SwapQuote {
    let estimated = sell_sol_out(
        pool.virtual_sol_reserves,
        pool.virtual_token_reserves,
        token_amount,
    );
    SwapQuote {
        input_amount: token_amount,
        minimum_out: min_amount_with_slippage(estimated, slippage_bps),
        slippage_bps,
    }
}

pub fn buy_quote(pool: &CurvePool, lamports_in: u64, slippage_bps: u64) -> SwapQuote {
    let estimated = buy_tokens_out(
        pool.virtual_sol_reserves,
        pool.virtual_token_reserves,
        lamports_in,
    );
    SwapQuote {
        input_amount: lamports_in,
        minimum_out: min_amount_with_slippage(estimated, slippage_bps),
        slippage_bps,
    }
}

fn swap_accounts(owner: &Pubkey, mint: &Pubkey, token_account: &Pubkey, pool: &CurvePool) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new_readonly(get_global_pda(), false),
        AccountMeta::new(get_curve_pda(mint), false),
        AccountMeta::new_readonly(*mint, false),
        AccountMeta::new(*owner, true),
        AccountMeta::new(*token_account, false),
        AccountMeta::new(pool.address, false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(*TOKEN_PROGRAM_ID, false),
    ]
}

/// Sell `token_amount` of `mint` into the curve. Payload:
/// discriminator || amount (u64 LE) || min_sol_out (u64 LE).
pub fn build_sell_instruction(
    owner: &Pubkey,
    mint: &Pubkey,
    token_account: &Pubkey,
    pool: &CurvePool,
    token_amount: u64,
    slippage_bps: u64,
) -> Result<Instruction, SwapError> {
    if token_amount == 0 {
        return Err(SwapError::InsufficientBalance);
    }
    let quote = sell_quote(pool, token_amount, slippage_bps);

    Ok(Instruction::new_with_bincode(
        *BONK_FUN_PROGRAM_ID,
        &(CURVE_SELL_METHOD, quote.input_amount, quote.minimum_out),
        swap_accounts(owner, mint, token_account, pool),
    ))
}

/// Buy into the curve with `lamports_in`. Same account list as selling;
/// the program reads the direction from the discriminator.
pub fn build_buy_instruction(
    owner: &Pubkey,
    mint: &Pubkey,
    token_account: &Pubkey,
    pool: &CurvePool,
    lamports_in: u64,
    slippage_bps: u64,
) -> Result<Instruction, SwapError> {
    if lamports_in == 0 {
        return Err(SwapError::InsufficientBalance);
    }
    let quote = buy_quote(pool, lamports_in, slippage_bps);

    Ok(Instruction::new_with_bincode(
        *BONK_FUN_PROGRAM_ID,
        &(CURVE_BUY_METHOD, quote.input_amount, quote.minimum_out),
        swap_accounts(owner, mint, token_account, pool),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIRTUAL_SOL: u64 = 30_000_000_000;
    const VIRTUAL_TOKEN: u64 = 1_073_000_000_000_000;

    fn sample_pool() -> CurvePool {
        CurvePool {
            address: get_pool_pda(&Pubkey::new_unique()),
            virtual_sol_reserves: VIRTUAL_SOL,
            virtual_token_reserves: VIRTUAL_TOKEN,
            real_sol_reserves: 0,
            real_token_reserves: 793_100_000_000_000,
            token_total_supply: 1_000_000_000_000_000,
            complete: false,
        }
    }

    #[test]
    fn sell_never_drains_virtual_sol_and_rounding_favors_the_pool() {
        let k = (VIRTUAL_SOL as u128) * (VIRTUAL_TOKEN as u128);
        for amount in [1u64, 1_000_000, 5_000_000_000_000, VIRTUAL_TOKEN - 1] {
            let sol_out = sell_sol_out(VIRTUAL_SOL, VIRTUAL_TOKEN, amount);
            assert!(sol_out < VIRTUAL_SOL);

            let new_token = (VIRTUAL_TOKEN as u128) + (amount as u128);
            let new_sol = (VIRTUAL_SOL as u128) - (sol_out as u128);
            assert!(new_sol * new_token <= k, "invariant broke at amount {}", amount);
        }
    }

    #[test]
    fn sell_quote_matches_estimate_at_zero_slippage() {
        let pool = sample_pool();
        let amount = 2_500_000_000_000;
        let quote = sell_quote(&pool, amount, 0);
        assert_eq!(
            quote.minimum_out,
            sell_sol_out(VIRTUAL_SOL, VIRTUAL_TOKEN, amount)
        );
    }

    #[test]
    fn sell_quote_minimum_shrinks_with_slippage() {
        let pool = sample_pool();
        let amount = 2_500_000_000_000;
        let tight = sell_quote(&pool, amount, 50);
        let loose = sell_quote(&pool, amount, 2_000);
        assert!(loose.minimum_out < tight.minimum_out);
    }

    #[test]
    fn buy_output_grows_with_input_and_stays_bounded() {
        let small = buy_tokens_out(VIRTUAL_SOL, VIRTUAL_TOKEN, 100_000_000);
        let large = buy_tokens_out(VIRTUAL_SOL, VIRTUAL_TOKEN, 10_000_000_000);
        assert!(small > 0);
        assert!(small < large);
        assert!(large < VIRTUAL_TOKEN);
    }

    fn encode_pool_account(complete: u8) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&7u64.to_le_bytes());
        data.extend_from_slice(&VIRTUAL_SOL.to_le_bytes());
        data.extend_from_slice(&VIRTUAL_TOKEN.to_le_bytes());
        data.extend_from_slice(&12_345u64.to_le_bytes());
        data.extend_from_slice(&793_100_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&1_000_000_000_000_000u64.to_le_bytes());
        data.push(complete);
        data
    }

    #[test]
    fn decode_reads_little_endian_fields_at_fixed_offsets() {
        let address = Pubkey::new_unique();
        let mut data = encode_pool_account(1);
        // Trailing bytes past the known prefix are tolerated.
        data.extend_from_slice(&[0u8; 16]);

        let pool = decode_curve_pool(address, &data).unwrap();
        assert_eq!(pool.virtual_sol_reserves, VIRTUAL_SOL);
        assert_eq!(pool.virtual_token_reserves, VIRTUAL_TOKEN);
        assert_eq!(pool.real_sol_reserves, 12_345);
        assert_eq!(pool.token_total_supply, 1_000_000_000_000_000);
        assert!(pool.complete);
    }

    #[test]
    fn decode_rejects_undersized_buffers() {
        let data = encode_pool_account(0);
        let err = decode_curve_pool(Pubkey::new_unique(), &data[..20]).unwrap_err();
        assert!(matches!(err, SwapError::Decode(_)));
    }

    #[test]
    fn sell_instruction_has_fixed_payload_and_account_order() {
        let pool = sample_pool();
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let token_account = Pubkey::new_unique();
        let amount = 1_000_000_000_000u64;

        let ix = build_sell_instruction(&owner, &mint, &token_account, &pool, amount, 50).unwrap();
        assert_eq!(ix.program_id, *BONK_FUN_PROGRAM_ID);
        assert_eq!(ix.data.len(), 24);
        assert_eq!(ix.data[0..8], CURVE_SELL_METHOD.to_le_bytes());
        assert_eq!(ix.data[8..16], amount.to_le_bytes());
        let expected_min = sell_quote(&pool, amount, 50).minimum_out;
        assert_eq!(ix.data[16..24], expected_min.to_le_bytes());

        assert_eq!(ix.accounts.len(), 8);
        assert!(ix.accounts[3].is_signer);
        assert_eq!(ix.accounts[3].pubkey, owner);
        assert_eq!(ix.accounts[4].pubkey, token_account);
        assert_eq!(ix.accounts[5].pubkey, pool.address);
    }

    #[test]
    fn zero_amount_is_rejected_before_any_quote() {
        let pool = sample_pool();
        let err = build_sell_instruction(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &pool,
            0,
            50,
        )
        .unwrap_err();
        assert!(matches!(err, SwapError::InsufficientBalance));
    }
}
