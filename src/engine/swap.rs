use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, Result};
use colored::Colorize;
use rand::Rng;
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    system_instruction,
    transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use tokio::time::sleep;

use crate::block_engine::bundle::{build_bundles, WalletJob};
use crate::block_engine::jito::{send_bundles, BundleResult};
use crate::common::config::{AppState, BundleConfig, SwapConfig};
use crate::common::error::SwapError;
use crate::common::logger::Logger;
use crate::common::wallet::WalletSet;
use crate::dex::{self, PoolDescriptor};

// Lighter compute budget for the plain token transfers used when dumping
// positions to the main wallet.
const DUMP_UNIT_LIMIT: u32 = 100_000;
const DUMP_UNIT_PRICE: u64 = 50_000;

/// Fresh per-wallet token balance, read once per batch and never cached.
#[derive(Debug, Clone)]
pub struct WalletHolding {
    pub wallet: Pubkey,
    pub raw_amount: u64,
}

/// A wallet left out of the batch and why. `InsufficientBalance` skips are
/// expected and silent; the rest surface in the final report.
#[derive(Debug)]
pub struct SellSkip {
    pub wallet: Pubkey,
    pub reason: SwapError,
}

/// Aggregated outcome of one batch operation.
#[derive(Debug)]
pub struct BatchReport {
    pub submitted: Vec<BundleResult>,
    pub skipped: Vec<SellSkip>,
    pub bundled_wallets: usize,
}

impl BatchReport {
    fn empty(skipped: Vec<SellSkip>) -> Self {
        Self {
            submitted: Vec::new(),
            skipped,
            bundled_wallets: 0,
        }
    }
}

/// Split fresh holdings into sell amounts and silent skips. Pure; the
/// returned indices refer back to the holdings slice.
pub fn plan_sells(holdings: &[WalletHolding], percentage: u8) -> (Vec<(usize, u64)>, Vec<SellSkip>) {
    let percentage = percentage.min(100) as u128;
    let mut plans = Vec::new();
    let mut skips = Vec::new();

    for (index, holding) in holdings.iter().enumerate() {
        let amount = ((holding.raw_amount as u128) * percentage / 100) as u64;
        if amount == 0 {
            skips.push(SellSkip {
                wallet: holding.wallet,
                reason: SwapError::InsufficientBalance,
            });
        } else {
            plans.push((index, amount));
        }
    }

    (plans, skips)
}

fn close_account_instruction(account: &Pubkey, owner: &Pubkey) -> Result<Instruction, SwapError> {
    spl_token::instruction::close_account(&spl_token::id(), account, owner, owner, &[])
        .map_err(|e| SwapError::Decode(format!("close account: {}", e)))
}

/// Per-wallet sell instruction list: compute budget pair, venue swap, then
/// cleanup of the emptied token account (and of the wrapped-SOL account on
/// the CPMM venue when the caller observed one).
pub fn build_sell_instructions(
    owner: &Pubkey,
    mint: &Pubkey,
    pool: &PoolDescriptor,
    token_amount: u64,
    swap_config: &SwapConfig,
    wsol_exists: bool,
) -> Result<Vec<Instruction>, SwapError> {
    let token_account = get_associated_token_address(owner, mint);
    let mut instructions = vec![
        ComputeBudgetInstruction::set_compute_unit_limit(swap_config.compute_unit_limit),
        ComputeBudgetInstruction::set_compute_unit_price(swap_config.compute_unit_price),
    ];

    match pool {
        PoolDescriptor::BondingCurve(curve) => {
            instructions.push(dex::bonk_fun::build_sell_instruction(
                owner,
                mint,
                &token_account,
                curve,
                token_amount,
                swap_config.slippage_bps,
            )?);
            instructions.push(close_account_instruction(&token_account, owner)?);
        }
        PoolDescriptor::ConstantProduct(cpmm) => {
            let wsol_account = get_associated_token_address(owner, &spl_token::native_mint::ID);
            instructions.push(dex::raydium_cpmm::build_sell_instruction(
                owner,
                mint,
                &token_account,
                &wsol_account,
                cpmm,
                token_amount,
                swap_config.slippage_bps,
            )?);
            instructions.push(close_account_instruction(&token_account, owner)?);
            if wsol_exists {
                instructions.push(close_account_instruction(&wsol_account, owner)?);
            }
        }
    }

    Ok(instructions)
}

/// Per-wallet buy instruction list. The receiving token account is created
/// idempotently; on the CPMM venue the spent SOL is wrapped in place and
/// the temporary wrapped account closed afterwards.
pub fn build_buy_instructions(
    owner: &Pubkey,
    mint: &Pubkey,
    pool: &PoolDescriptor,
    lamports_in: u64,
    swap_config: &SwapConfig,
) -> Result<Vec<Instruction>, SwapError> {
    if lamports_in == 0 {
        return Err(SwapError::InsufficientBalance);
    }

    let token_account = get_associated_token_address(owner, mint);
    let mut instructions = vec![
        ComputeBudgetInstruction::set_compute_unit_limit(swap_config.compute_unit_limit),
        ComputeBudgetInstruction::set_compute_unit_price(swap_config.compute_unit_price),
        create_associated_token_account_idempotent(owner, owner, mint, &spl_token::id()),
    ];

    match pool {
        PoolDescriptor::BondingCurve(curve) => {
            instructions.push(dex::bonk_fun::build_buy_instruction(
                owner,
                mint,
                &token_account,
                curve,
                lamports_in,
                swap_config.slippage_bps,
            )?);
        }
        PoolDescriptor::ConstantProduct(cpmm) => {
            let wsol_account = get_associated_token_address(owner, &spl_token::native_mint::ID);
            instructions.push(create_associated_token_account_idempotent(
                owner,
                owner,
                &spl_token::native_mint::ID,
                &spl_token::id(),
            ));
            instructions.push(system_instruction::transfer(owner, &wsol_account, lamports_in));
            instructions.push(
                spl_token::instruction::sync_native(&spl_token::id(), &wsol_account)
                    .map_err(|e| SwapError::Decode(format!("sync native: {}", e)))?,
            );
            instructions.push(dex::raydium_cpmm::build_buy_instruction(
                owner,
                mint,
                &token_account,
                &wsol_account,
                cpmm,
                lamports_in,
                swap_config.slippage_bps,
            )?);
            instructions.push(close_account_instruction(&wsol_account, owner)?);
        }
    }

    Ok(instructions)
}

/// Sequential batch executor. All lookups and submissions are awaited one
/// at a time so every transaction in a bundle shares a single blockhash
/// and the relay request rate stays bounded.
pub struct SwapEngine {
    app_state: AppState,
    swap_config: SwapConfig,
    bundle_config: BundleConfig,
}

impl SwapEngine {
    pub fn new(app_state: AppState, swap_config: SwapConfig, bundle_config: BundleConfig) -> Self {
        Self {
            app_state,
            swap_config,
            bundle_config,
        }
    }

    async fn token_balance(&self, token_account: &Pubkey) -> u64 {
        match self
            .app_state
            .rpc_nonblocking_client
            .get_token_account_balance(token_account)
            .await
        {
            Ok(balance) => balance.amount.parse::<u64>().unwrap_or(0),
            Err(_) => 0,
        }
    }

    async fn account_exists(&self, address: &Pubkey) -> bool {
        self.app_state
            .rpc_nonblocking_client
            .get_account_with_commitment(
                address,
                anchor_client::solana_sdk::commitment_config::CommitmentConfig::processed(),
            )
            .await
            .map(|response| response.value.is_some())
            .unwrap_or(false)
    }

    async fn read_holdings(&self, wallets: &WalletSet, mint: &Pubkey) -> Vec<WalletHolding> {
        let mut holdings = Vec::with_capacity(wallets.len());
        for keypair in &wallets.wallets {
            let owner = keypair.pubkey();
            let token_account = get_associated_token_address(&owner, mint);
            holdings.push(WalletHolding {
                wallet: owner,
                raw_amount: self.token_balance(&token_account).await,
            });
        }
        holdings
    }

    async fn submit_jobs(&self, jobs: Vec<WalletJob>, mut skipped: Vec<SellSkip>, mint: &Pubkey, tip_lamports: u64) -> Result<BatchReport> {
        let bundled_wallets = jobs.len();
        let recent_blockhash = self
            .app_state
            .rpc_nonblocking_client
            .get_latest_blockhash()
            .await?;

        let (groups, rejected) = build_bundles(
            &jobs,
            self.bundle_config.bundle_size,
            tip_lamports,
            &self.bundle_config.tip_accounts,
            recent_blockhash,
        );
        for (wallet, reason) in rejected {
            skipped.push(SellSkip { wallet, reason });
        }

        let submitted = send_bundles(&self.bundle_config.block_engine_url, &groups).await;
        if submitted.iter().any(BundleResult::is_err) {
            // The pool may have moved (or migrated) under us.
            dex::invalidate_pool(mint);
        }

        Ok(BatchReport {
            submitted,
            skipped,
            bundled_wallets,
        })
    }

    /// Sell `percentage` of every wallet's position in `mint` as relay
    /// bundles. Per-wallet failures are recorded and never stop the batch;
    /// when no wallet holds anything, nothing is submitted.
    pub async fn sell_all(
        &self,
        wallets: &WalletSet,
        mint: &Pubkey,
        percentage: u8,
    ) -> Result<BatchReport> {
        let logger = Logger::new("[SELL-ALL] => ".blue().to_string());
        logger.log(format!(
            "selling {}% of {} across {} wallets",
            percentage.min(100),
            mint,
            wallets.len()
        ));

        let holdings = self.read_holdings(wallets, mint).await;
        let (plans, mut skipped) = plan_sells(&holdings, percentage);
        if plans.is_empty() {
            logger.log("nothing to sell across all wallets".to_string());
            return Ok(BatchReport::empty(skipped));
        }

        let pool = dex::get_pool_descriptor(
            self.app_state.rpc_client.clone(),
            &self.app_state.rpc_nonblocking_client,
            mint,
        )
        .await?;

        let mut jobs = Vec::with_capacity(plans.len());
        for (index, amount) in plans {
            let keypair = &wallets.wallets[index];
            let owner = keypair.pubkey();

            let wsol_exists = match &pool {
                PoolDescriptor::ConstantProduct(_) => {
                    let wsol_account =
                        get_associated_token_address(&owner, &spl_token::native_mint::ID);
                    self.account_exists(&wsol_account).await
                }
                PoolDescriptor::BondingCurve(_) => false,
            };

            match build_sell_instructions(&owner, mint, &pool, amount, &self.swap_config, wsol_exists)
            {
                Ok(instructions) => jobs.push(WalletJob {
                    keypair: keypair.clone(),
                    instructions,
                }),
                Err(reason) => {
                    logger.error(format!("wallet {} skipped: {}", owner, reason));
                    skipped.push(SellSkip {
                        wallet: owner,
                        reason,
                    });
                }
            }
        }

        if jobs.is_empty() {
            return Ok(BatchReport::empty(skipped));
        }
        self.submit_jobs(jobs, skipped, mint, self.bundle_config.tip_lamports)
            .await
    }

    /// Buy `mint` with `lamports_per_wallet` from every wallet, bundled.
    pub async fn buy_all(
        &self,
        wallets: &WalletSet,
        mint: &Pubkey,
        lamports_per_wallet: u64,
    ) -> Result<BatchReport> {
        let logger = Logger::new("[BUY-ALL] => ".blue().to_string());
        logger.log(format!(
            "buying {} with {} lamports from each of {} wallets",
            mint,
            lamports_per_wallet,
            wallets.len()
        ));

        let pool = dex::get_pool_descriptor(
            self.app_state.rpc_client.clone(),
            &self.app_state.rpc_nonblocking_client,
            mint,
        )
        .await?;

        let mut skipped = Vec::new();
        let mut jobs = Vec::with_capacity(wallets.len());
        for keypair in &wallets.wallets {
            let owner = keypair.pubkey();
            match build_buy_instructions(&owner, mint, &pool, lamports_per_wallet, &self.swap_config)
            {
                Ok(instructions) => jobs.push(WalletJob {
                    keypair: keypair.clone(),
                    instructions,
                }),
                Err(reason) => {
                    logger.error(format!("wallet {} skipped: {}", owner, reason));
                    skipped.push(SellSkip {
                        wallet: owner,
                        reason,
                    });
                }
            }
        }

        if jobs.is_empty() {
            return Ok(BatchReport::empty(skipped));
        }
        self.submit_jobs(jobs, skipped, mint, self.bundle_config.tip_lamports)
            .await
    }

    /// Sell one wallet's position with a plain RPC transaction, no bundle.
    pub async fn individual_sell(
        &self,
        keypair: &Arc<Keypair>,
        mint: &Pubkey,
        percentage: u8,
    ) -> Result<String> {
        let owner = keypair.pubkey();
        let token_account = get_associated_token_address(&owner, mint);
        let balance = self.token_balance(&token_account).await;
        let amount = ((balance as u128) * (percentage.min(100) as u128) / 100) as u64;
        if amount == 0 {
            return Err(anyhow!(SwapError::InsufficientBalance));
        }

        let pool = dex::get_pool_descriptor(
            self.app_state.rpc_client.clone(),
            &self.app_state.rpc_nonblocking_client,
            mint,
        )
        .await?;

        let wsol_exists = match &pool {
            PoolDescriptor::ConstantProduct(_) => {
                let wsol_account = get_associated_token_address(&owner, &spl_token::native_mint::ID);
                self.account_exists(&wsol_account).await
            }
            PoolDescriptor::BondingCurve(_) => false,
        };
        let instructions =
            build_sell_instructions(&owner, mint, &pool, amount, &self.swap_config, wsol_exists)?;

        let recent_blockhash = self
            .app_state
            .rpc_nonblocking_client
            .get_latest_blockhash()
            .await?;
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&owner),
            &vec![keypair.as_ref()],
            recent_blockhash,
        );

        let signature = self
            .app_state
            .rpc_nonblocking_client
            .send_transaction(&transaction)
            .await?;
        Ok(signature.to_string())
    }

    /// Sell wallet by wallet with a random pause between each, trading
    /// atomicity for a less correlated footprint.
    pub async fn delayed_sell(
        &self,
        wallets: &WalletSet,
        mint: &Pubkey,
        min_delay_secs: u64,
        max_delay_secs: u64,
        percentage: u8,
    ) -> Vec<(Pubkey, Result<String>)> {
        let logger = Logger::new("[DELAYED-SELL] => ".yellow().to_string());
        let max_delay_secs = max_delay_secs.max(min_delay_secs);
        let mut results = Vec::with_capacity(wallets.len());

        for (index, keypair) in wallets.wallets.iter().enumerate() {
            let delay = {
                let mut rng = rand::thread_rng();
                rng.gen_range(min_delay_secs..=max_delay_secs)
            };
            sleep(Duration::from_secs(delay)).await;

            let outcome = self.individual_sell(keypair, mint, percentage).await;
            match &outcome {
                Ok(signature) => logger.log(format!(
                    "sold from wallet {}/{}: {}",
                    index + 1,
                    wallets.len(),
                    signature
                )),
                Err(e) => logger.error(format!(
                    "wallet {}/{} failed: {}",
                    index + 1,
                    wallets.len(),
                    e
                )),
            };
            results.push((keypair.pubkey(), outcome));
        }

        results
    }

    /// Move `percentage` of every wallet's position to the main wallet as
    /// untipped bundles, then sell the consolidated position from there.
    pub async fn dump_to_main(
        &self,
        wallets: &WalletSet,
        mint: &Pubkey,
        percentage: u8,
    ) -> Result<BatchReport> {
        let logger = Logger::new("[DUMP] => ".magenta().to_string());
        let main = wallets.main.clone();
        let main_token_account = get_associated_token_address(&main.pubkey(), mint);

        let holdings = self.read_holdings(wallets, mint).await;
        let (plans, skipped) = plan_sells(&holdings, percentage);

        let mut jobs = Vec::with_capacity(plans.len());
        for (index, amount) in plans {
            let keypair = &wallets.wallets[index];
            let owner = keypair.pubkey();
            let token_account = get_associated_token_address(&owner, mint);

            #[allow(deprecated)]
            let transfer_instruction = spl_token::instruction::transfer(
                &spl_token::id(),
                &token_account,
                &main_token_account,
                &owner,
                &[],
                amount,
            )
            .map_err(|e| SwapError::Decode(format!("token transfer: {}", e)))?;

            jobs.push(WalletJob {
                keypair: keypair.clone(),
                instructions: vec![
                    ComputeBudgetInstruction::set_compute_unit_limit(DUMP_UNIT_LIMIT),
                    ComputeBudgetInstruction::set_compute_unit_price(DUMP_UNIT_PRICE),
                    create_associated_token_account_idempotent(
                        &owner,
                        &main.pubkey(),
                        mint,
                        &spl_token::id(),
                    ),
                    transfer_instruction,
                ],
            });
        }

        if !jobs.is_empty() {
            logger.log(format!("consolidating {} wallets into {}", jobs.len(), main.pubkey()));
            self.submit_jobs(jobs, Vec::new(), mint, 0).await?;
            // Give the transfers a moment to land before selling.
            sleep(Duration::from_secs(2)).await;
        } else {
            logger.log("no positions to consolidate".to_string());
            return Ok(BatchReport::empty(skipped));
        }

        let main_only = WalletSet::new(main.clone(), vec![main]);
        self.sell_all(&main_only, mint, percentage).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::bonk_fun::CurvePool;
    use crate::dex::raydium_cpmm::CpmmPool;

    fn swap_config() -> SwapConfig {
        SwapConfig {
            slippage_bps: 50,
            compute_unit_limit: 400_000,
            compute_unit_price: 100_000,
        }
    }

    fn curve_pool() -> PoolDescriptor {
        PoolDescriptor::BondingCurve(CurvePool {
            address: Pubkey::new_unique(),
            virtual_sol_reserves: 30_000_000_000,
            virtual_token_reserves: 1_073_000_000_000_000,
            real_sol_reserves: 0,
            real_token_reserves: 793_100_000_000_000,
            token_total_supply: 1_000_000_000_000_000,
            complete: false,
        })
    }

    fn cpmm_pool(mint: &Pubkey) -> PoolDescriptor {
        PoolDescriptor::ConstantProduct(CpmmPool {
            address: Pubkey::new_unique(),
            amm_config: Pubkey::new_unique(),
            token0_vault: Pubkey::new_unique(),
            token1_vault: Pubkey::new_unique(),
            token0_mint: *mint,
            token1_mint: spl_token::native_mint::ID,
            observation_key: Pubkey::new_unique(),
        })
    }

    #[test]
    fn zero_balances_plan_nothing_and_skip_everything() {
        let holdings: Vec<WalletHolding> = (0..7)
            .map(|_| WalletHolding {
                wallet: Pubkey::new_unique(),
                raw_amount: 0,
            })
            .collect();

        let (plans, skips) = plan_sells(&holdings, 100);
        assert!(plans.is_empty());
        assert_eq!(skips.len(), 7);
        assert!(skips
            .iter()
            .all(|s| matches!(s.reason, SwapError::InsufficientBalance)));
    }

    #[test]
    fn plans_take_the_requested_percentage_in_order() {
        let holdings = vec![
            WalletHolding {
                wallet: Pubkey::new_unique(),
                raw_amount: 1_000,
            },
            WalletHolding {
                wallet: Pubkey::new_unique(),
                raw_amount: 0,
            },
            WalletHolding {
                wallet: Pubkey::new_unique(),
                raw_amount: 7,
            },
        ];

        let (plans, skips) = plan_sells(&holdings, 50);
        assert_eq!(plans, vec![(0, 500), (2, 3)]);
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].wallet, holdings[1].wallet);
    }

    #[test]
    fn one_token_at_one_percent_rounds_to_a_skip() {
        let holdings = vec![WalletHolding {
            wallet: Pubkey::new_unique(),
            raw_amount: 1,
        }];
        let (plans, skips) = plan_sells(&holdings, 1);
        assert!(plans.is_empty());
        assert_eq!(skips.len(), 1);
    }

    #[test]
    fn curve_sell_orders_budget_swap_then_cleanup() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let pool = curve_pool();

        let instructions =
            build_sell_instructions(&owner, &mint, &pool, 1_000_000, &swap_config(), false)
                .unwrap();

        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[0].program_id, solana_sdk::compute_budget::id());
        assert_eq!(instructions[1].program_id, solana_sdk::compute_budget::id());
        assert_eq!(
            instructions[2].program_id.to_string(),
            crate::dex::bonk_fun::BONK_FUN_PROGRAM
        );
        assert_eq!(instructions[3].program_id, spl_token::id());
    }

    #[test]
    fn cpmm_sell_also_closes_an_existing_wsol_account() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let pool = cpmm_pool(&mint);

        let without_wsol =
            build_sell_instructions(&owner, &mint, &pool, 1_000_000, &swap_config(), false)
                .unwrap();
        assert_eq!(without_wsol.len(), 4);

        let with_wsol =
            build_sell_instructions(&owner, &mint, &pool, 1_000_000, &swap_config(), true).unwrap();
        assert_eq!(with_wsol.len(), 5);
        assert_eq!(with_wsol[4].program_id, spl_token::id());
        let wsol_account = get_associated_token_address(&owner, &spl_token::native_mint::ID);
        assert_eq!(with_wsol[4].accounts[0].pubkey, wsol_account);
    }

    #[test]
    fn zero_sell_amount_is_rejected_by_the_builder() {
        let err = build_sell_instructions(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &curve_pool(),
            0,
            &swap_config(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, SwapError::InsufficientBalance));
    }

    #[test]
    fn curve_buy_creates_the_token_account_first() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let instructions =
            build_buy_instructions(&owner, &mint, &curve_pool(), 1_000_000_000, &swap_config())
                .unwrap();

        assert_eq!(instructions.len(), 4);
        assert_eq!(
            instructions[2].program_id,
            spl_associated_token_account::id()
        );
        assert_eq!(
            instructions[3].program_id.to_string(),
            crate::dex::bonk_fun::BONK_FUN_PROGRAM
        );
    }

    #[test]
    fn cpmm_buy_wraps_sol_and_unwraps_after_the_swap() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let pool = cpmm_pool(&mint);

        let instructions =
            build_buy_instructions(&owner, &mint, &pool, 1_000_000_000, &swap_config()).unwrap();

        // budget x2, token ata, wsol ata, fund, sync, swap, close
        assert_eq!(instructions.len(), 8);
        assert_eq!(instructions[4].program_id, solana_sdk::system_program::id());
        assert_eq!(
            instructions[6].program_id.to_string(),
            crate::dex::raydium_cpmm::RAYDIUM_CPMM_PROGRAM
        );
        assert_eq!(instructions[7].program_id, spl_token::id());
    }
}
