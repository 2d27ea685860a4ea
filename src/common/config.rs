use anyhow::{anyhow, Result};
use colored::Colorize;
use dotenv::dotenv;
use anchor_client::solana_sdk::{
    commitment_config::CommitmentConfig,
    native_token::sol_to_lamports,
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
};
use tokio::sync::{Mutex, OnceCell};
use std::{env, str::FromStr, sync::Arc, time::Duration};

use crate::common::logger::Logger;
use crate::block_engine::jito::DEFAULT_TIP_ACCOUNTS;

static GLOBAL_CONFIG: OnceCell<Mutex<Config>> = OnceCell::const_new();

pub struct Config {
    pub app_state: AppState,
    pub swap_config: SwapConfig,
    pub bundle_config: BundleConfig,
    pub wallet_keys_path: String,
}

impl Config {
    pub async fn new() -> &'static Mutex<Config> {
        GLOBAL_CONFIG
            .get_or_init(|| async {
                dotenv().ok(); // Load .env file

                let logger = Logger::new("[INIT] => ".blue().bold().to_string());

                let slippage_input = import_env_var("SLIPPAGE")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(50);
                let slippage_bps = slippage_input.min(crate::dex::MAX_SLIPPAGE_BPS);

                let bundle_size = import_env_var("BUNDLE_SIZE")
                    .ok()
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(5)
                    .max(1);
                let jito_tip_sol = import_env_var("JITO_TIP")
                    .ok()
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.001);
                let block_engine_url = import_env_var("BLOCK_ENGINE_URL")
                    .unwrap_or_else(|_| "https://mainnet.block-engine.jito.wtf".to_string());

                let compute_unit_limit = import_env_var("COMPUTE_UNIT_LIMIT")
                    .ok()
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(400_000);
                let compute_unit_price = import_env_var("COMPUTE_UNIT_PRICE")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(100_000);

                let wallet_keys_path = import_env_var("WALLET_KEYS_PATH")
                    .unwrap_or_else(|_| "currentKeypair.json".to_string());

                let rpc_client = create_rpc_client().unwrap();
                let rpc_nonblocking_client = create_nonblocking_rpc_client().await.unwrap();
                let wallet = import_wallet().unwrap();

                let balance = match rpc_nonblocking_client.get_account(&wallet.pubkey()).await {
                    Ok(account) => account.lamports,
                    Err(err) => {
                        logger.error(format!("Failed to get wallet balance: {}", err));
                        0
                    }
                };

                let tip_accounts = DEFAULT_TIP_ACCOUNTS
                    .iter()
                    .filter_map(|s| Pubkey::from_str(s).ok())
                    .collect::<Vec<_>>();

                let swap_config = SwapConfig {
                    slippage_bps,
                    compute_unit_limit,
                    compute_unit_price,
                };
                let bundle_config = BundleConfig {
                    bundle_size,
                    tip_lamports: sol_to_lamports(jito_tip_sol),
                    tip_accounts,
                    block_engine_url,
                };

                let app_state = AppState {
                    rpc_client,
                    rpc_nonblocking_client,
                    wallet: wallet.clone(),
                };

                logger.log(
                    format!(
                        "[BUNDLER ENVIRONMENT]: \n\t\t\t\t * [Wallet]: {:?}, * [Balance]: {} Sol, \n\t\t\t\t * [Slippage]: {} bps, * [Bundle size]: {}, * [Tip]: {} Sol",
                        wallet.pubkey(),
                        balance as f64 / 1_000_000_000_f64,
                        slippage_bps,
                        bundle_size,
                        jito_tip_sol,
                    )
                    .purple()
                    .italic()
                    .to_string(),
                );

                Mutex::new(Config {
                    app_state,
                    swap_config,
                    bundle_config,
                    wallet_keys_path,
                })
            })
            .await
    }

    pub async fn get() -> tokio::sync::MutexGuard<'static, Config> {
        GLOBAL_CONFIG
            .get()
            .expect("Config not initialized")
            .lock()
            .await
    }
}

#[derive(Clone)]
pub struct AppState {
    pub rpc_client: Arc<anchor_client::solana_client::rpc_client::RpcClient>,
    pub rpc_nonblocking_client: Arc<anchor_client::solana_client::nonblocking::rpc_client::RpcClient>,
    pub wallet: Arc<Keypair>,
}

/// Per-swap parameters shared by every wallet in a batch.
#[derive(Clone, Debug)]
pub struct SwapConfig {
    pub slippage_bps: u64,
    pub compute_unit_limit: u32,
    pub compute_unit_price: u64,
}

/// Bundle grouping and relay parameters.
#[derive(Clone, Debug)]
pub struct BundleConfig {
    pub bundle_size: usize,
    pub tip_lamports: u64,
    pub tip_accounts: Vec<Pubkey>,
    pub block_engine_url: String,
}

pub fn import_env_var(key: &str) -> Result<String> {
    env::var(key).map_err(|e| anyhow!("{}: {}", e, key))
}

pub fn create_rpc_client() -> Result<Arc<anchor_client::solana_client::rpc_client::RpcClient>> {
    let rpc_http = import_env_var("RPC_HTTP")?;
    let timeout = Duration::from_secs(30);
    let rpc_client = anchor_client::solana_client::rpc_client::RpcClient::new_with_timeout_and_commitment(
        rpc_http,
        timeout,
        CommitmentConfig::processed(),
    );
    Ok(Arc::new(rpc_client))
}

pub async fn create_nonblocking_rpc_client(
) -> Result<Arc<anchor_client::solana_client::nonblocking::rpc_client::RpcClient>> {
    let rpc_http = import_env_var("RPC_HTTP")?;
    let timeout = Duration::from_secs(30);
    let rpc_client =
        anchor_client::solana_client::nonblocking::rpc_client::RpcClient::new_with_timeout_and_commitment(
            rpc_http,
            timeout,
            CommitmentConfig::processed(),
        );
    Ok(Arc::new(rpc_client))
}

pub fn import_wallet() -> Result<Arc<Keypair>> {
    let priv_key = import_env_var("PRIVATE_KEY")?;
    if priv_key.len() < 85 {
        return Err(anyhow!(
            "Please check wallet priv key: Invalid length => {}",
            priv_key.len()
        ));
    }
    let wallet: Keypair = Keypair::from_base58_string(priv_key.as_str());

    Ok(Arc::new(wallet))
}
