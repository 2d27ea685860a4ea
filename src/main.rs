use std::str::FromStr;
use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use solana_sdk::{native_token::sol_to_lamports, pubkey::Pubkey};

use bonk_bundler::common::config::Config;
use bonk_bundler::common::logger::Logger;
use bonk_bundler::common::wallet::WalletSet;
use bonk_bundler::engine::{BatchReport, SwapEngine};

#[derive(Parser)]
#[command(
    name = "solana-bonk-bundler",
    version,
    about = "Multi-wallet swap bundler for BonkFun launchpad tokens"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sell every wallet's position as relay bundles
    Sell {
        mint: String,
        #[arg(long, default_value_t = 100)]
        percentage: u8,
    },
    /// Buy from every wallet as relay bundles
    Buy {
        mint: String,
        /// SOL to spend per wallet
        #[arg(long)]
        sol: f64,
    },
    /// Sell wallet by wallet with a random delay between sells
    DelayedSell {
        mint: String,
        #[arg(long, default_value_t = 5)]
        min_delay: u64,
        #[arg(long, default_value_t = 30)]
        max_delay: u64,
        #[arg(long, default_value_t = 100)]
        percentage: u8,
    },
    /// Consolidate positions into the main wallet, then sell from there
    Dump {
        mint: String,
        #[arg(long, default_value_t = 100)]
        percentage: u8,
    },
}

fn print_report(logger: &Logger, report: &BatchReport) {
    logger.log(format!(
        "bundled {} wallets, skipped {}, submitted {} groups",
        report.bundled_wallets,
        report.skipped.len(),
        report.submitted.len()
    ));
    for result in &report.submitted {
        match &result.outcome {
            Ok(body) => logger.log(format!(
                "group {} ({} txs): {}",
                result.group, result.transactions, body
            )),
            Err(e) => logger.error(format!("group {}: {}", result.group, e)),
        };
    }
    for skip in &report.skipped {
        logger.debug(format!("skipped {}: {}", skip.wallet, skip.reason));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let logger = Logger::new("[BONK-BUNDLER] => ".cyan().bold().to_string());

    let config = Config::new().await.lock().await;
    let wallets = WalletSet::load(&config.wallet_keys_path, config.app_state.wallet.clone())?;
    logger.log(format!("loaded {} sub-wallets", wallets.len()));

    let engine = SwapEngine::new(
        config.app_state.clone(),
        config.swap_config.clone(),
        config.bundle_config.clone(),
    );
    drop(config);

    match cli.command {
        Command::Sell { mint, percentage } => {
            let mint = Pubkey::from_str(&mint)?;
            let report = engine.sell_all(&wallets, &mint, percentage).await?;
            print_report(&logger, &report);
        }
        Command::Buy { mint, sol } => {
            let mint = Pubkey::from_str(&mint)?;
            let report = engine
                .buy_all(&wallets, &mint, sol_to_lamports(sol))
                .await?;
            print_report(&logger, &report);
        }
        Command::DelayedSell {
            mint,
            min_delay,
            max_delay,
            percentage,
        } => {
            let mint = Pubkey::from_str(&mint)?;
            let results = engine
                .delayed_sell(&wallets, &mint, min_delay, max_delay, percentage)
                .await;
            let sold = results.iter().filter(|(_, r)| r.is_ok()).count();
            logger.log(format!("sold from {}/{} wallets", sold, results.len()));
        }
        Command::Dump { mint, percentage } => {
            let mint = Pubkey::from_str(&mint)?;
            let report = engine.dump_to_main(&wallets, &mint, percentage).await?;
            print_report(&logger, &report);
        }
    }

    Ok(())
}
