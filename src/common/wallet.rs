use std::fs;
use std::sync::Arc;
use anyhow::{anyhow, Context, Result};
use anchor_client::solana_sdk::{signature::Keypair, signer::Signer};
use serde::Deserialize;

/// One record of the wallet file written by the wallet-management tooling.
/// Only the secret key is consumed here; the stored public key, when
/// present, is checked against the derived one.
#[derive(Deserialize)]
struct WalletRecord {
    #[serde(rename = "secretKey")]
    secret_key: String,
    #[serde(rename = "publicKey")]
    public_key: Option<String>,
}

/// Materialized signing keys for a batch: the funding/main wallet plus the
/// sub-wallets that hold positions. Key generation, mnemonics and encrypted
/// export live in the wallet-management tooling; this type only ever sees
/// ready-made keypairs.
pub struct WalletSet {
    pub main: Arc<Keypair>,
    pub wallets: Vec<Arc<Keypair>>,
}

impl WalletSet {
    pub fn new(main: Arc<Keypair>, wallets: Vec<Arc<Keypair>>) -> Self {
        Self { main, wallets }
    }

    /// Load sub-wallets from a JSON file containing an array of
    /// `{ "publicKey": ..., "secretKey": <base58> }` records.
    pub fn load(path: &str, main: Arc<Keypair>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read wallet file {}", path))?;
        let records: Vec<WalletRecord> =
            serde_json::from_str(&raw).with_context(|| format!("malformed wallet file {}", path))?;

        let mut wallets = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let bytes = bs58::decode(&record.secret_key)
                .into_vec()
                .map_err(|e| anyhow!("wallet #{}: bad base58 secret key: {}", index, e))?;
            let keypair = Keypair::from_bytes(&bytes)
                .map_err(|e| anyhow!("wallet #{}: bad secret key: {}", index, e))?;
            if let Some(expected) = &record.public_key {
                if keypair.pubkey().to_string() != *expected {
                    return Err(anyhow!("wallet #{}: key verification failed", index));
                }
            }
            wallets.push(Arc::new(keypair));
        }

        Ok(Self { main, wallets })
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
