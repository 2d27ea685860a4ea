use std::sync::Arc;
use rand::Rng;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    system_instruction,
    transaction::VersionedTransaction,
};

use crate::common::error::SwapError;

/// One wallet's instruction set, waiting to be signed into a bundle.
pub struct WalletJob {
    pub keypair: Arc<Keypair>,
    pub instructions: Vec<Instruction>,
}

/// A relay-ready group: at most `bundle_size` swap transactions plus, when
/// tipping, one tip transfer appended last. `wire` holds the serialized
/// bytes, already checked against the packet ceiling.
pub struct BundleGroup {
    pub transactions: Vec<VersionedTransaction>,
    pub wire: Vec<Vec<u8>>,
}

impl BundleGroup {
    fn new() -> Self {
        Self {
            transactions: Vec::new(),
            wire: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

fn compile_and_sign(
    keypair: &Keypair,
    instructions: &[Instruction],
    recent_blockhash: Hash,
) -> Result<(VersionedTransaction, Vec<u8>), SwapError> {
    let payer = keypair.pubkey();
    let message = v0::Message::try_compile(&payer, instructions, &[], recent_blockhash)
        .map_err(|e| SwapError::Decode(format!("compile message: {}", e)))?;
    let transaction = VersionedTransaction::try_new(VersionedMessage::V0(message), &vec![keypair])
        .map_err(|e| SwapError::Decode(format!("sign transaction: {}", e)))?;
    let bytes = bincode::serialize(&transaction)
        .map_err(|e| SwapError::Decode(format!("serialize transaction: {}", e)))?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(SwapError::SizeExceeded(bytes.len()));
    }
    Ok((transaction, bytes))
}

/// Partition `jobs` into contiguous groups of at most `bundle_size`,
/// preserving input order, every transaction signed against the one
/// `recent_blockhash` so the group is relay-eligible together.
///
/// A transaction over the packet ceiling is rejected per-wallet and
/// reported back; the rest of its group still builds. When
/// `tip_lamports > 0` each group gets one extra transfer from the group's
/// first wallet to a randomly drawn member of `tip_accounts`.
pub fn build_bundles(
    jobs: &[WalletJob],
    bundle_size: usize,
    tip_lamports: u64,
    tip_accounts: &[Pubkey],
    recent_blockhash: Hash,
) -> (Vec<BundleGroup>, Vec<(Pubkey, SwapError)>) {
    let mut groups = Vec::new();
    let mut rejected = Vec::new();

    for chunk in jobs.chunks(bundle_size.max(1)) {
        let mut group = BundleGroup::new();
        for job in chunk {
            match compile_and_sign(&job.keypair, &job.instructions, recent_blockhash) {
                Ok((transaction, bytes)) => {
                    group.transactions.push(transaction);
                    group.wire.push(bytes);
                }
                Err(e) => rejected.push((job.keypair.pubkey(), e)),
            }
        }
        if group.is_empty() {
            continue;
        }

        if tip_lamports > 0 && !tip_accounts.is_empty() {
            let payer = &chunk[0].keypair;
            let tip_account = tip_accounts[rand::thread_rng().gen_range(0..tip_accounts.len())];
            let tip_instruction =
                system_instruction::transfer(&payer.pubkey(), &tip_account, tip_lamports);
            match compile_and_sign(payer, &[tip_instruction], recent_blockhash) {
                Ok((transaction, bytes)) => {
                    group.transactions.push(transaction);
                    group.wire.push(bytes);
                }
                Err(e) => rejected.push((payer.pubkey(), e)),
            }
        }

        groups.push(group);
    }

    (groups, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_instruction() -> Instruction {
        Instruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![],
            data: vec![1, 2, 3],
        }
    }

    fn make_jobs(count: usize) -> Vec<WalletJob> {
        (0..count)
            .map(|_| WalletJob {
                keypair: Arc::new(Keypair::new()),
                instructions: vec![noop_instruction()],
            })
            .collect()
    }

    fn fee_payer(tx: &VersionedTransaction) -> Pubkey {
        tx.message.static_account_keys()[0]
    }

    #[test]
    fn seven_jobs_at_capacity_five_make_two_groups_with_one_tip_each() {
        let jobs = make_jobs(7);
        let tip_accounts = vec![Pubkey::new_unique()];
        let (groups, rejected) =
            build_bundles(&jobs, 5, 10_000, &tip_accounts, Hash::default());

        assert!(rejected.is_empty());
        assert_eq!(groups.len(), 2);
        // 5 + tip, 2 + tip
        assert_eq!(groups[0].len(), 6);
        assert_eq!(groups[1].len(), 3);

        for (index, group) in groups.iter().enumerate() {
            let tip_tx = group.transactions.last().unwrap();
            assert!(
                tip_tx.message.static_account_keys().contains(&tip_accounts[0]),
                "group {} does not end with the tip transfer",
                index
            );
        }
    }

    #[test]
    fn partitioning_preserves_order_and_covers_every_wallet_once() {
        let jobs = make_jobs(10);
        let (groups, rejected) = build_bundles(&jobs, 3, 0, &[], Hash::default());

        assert!(rejected.is_empty());
        assert_eq!(groups.len(), 4); // ceil(10 / 3)
        assert_eq!(
            groups.iter().map(BundleGroup::len).collect::<Vec<_>>(),
            vec![3, 3, 3, 1]
        );

        let payers: Vec<Pubkey> = groups
            .iter()
            .flat_map(|g| g.transactions.iter().map(fee_payer))
            .collect();
        let expected: Vec<Pubkey> = jobs.iter().map(|j| j.keypair.pubkey()).collect();
        assert_eq!(payers, expected);
    }

    #[test]
    fn no_tip_transaction_without_a_tip() {
        let jobs = make_jobs(7);
        let (groups, _) = build_bundles(&jobs, 5, 0, &[Pubkey::new_unique()], Hash::default());
        assert_eq!(groups[0].len(), 5);
        assert_eq!(groups[1].len(), 2);
    }

    #[test]
    fn oversized_transaction_is_rejected_without_failing_its_group() {
        let mut jobs = make_jobs(2);
        jobs.insert(
            1,
            WalletJob {
                keypair: Arc::new(Keypair::new()),
                instructions: vec![Instruction {
                    program_id: Pubkey::new_unique(),
                    accounts: vec![],
                    data: vec![0u8; PACKET_DATA_SIZE],
                }],
            },
        );

        let (groups, rejected) = build_bundles(&jobs, 5, 0, &[], Hash::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(rejected.len(), 1);
        assert!(matches!(rejected[0].1, SwapError::SizeExceeded(_)));
        assert_eq!(rejected[0].0, jobs[1].keypair.pubkey());
    }

    #[test]
    fn every_transaction_in_a_group_shares_the_blockhash() {
        let jobs = make_jobs(3);
        let blockhash = Hash::new_unique();
        let (groups, _) = build_bundles(&jobs, 5, 1_000, &[Pubkey::new_unique()], blockhash);
        for tx in &groups[0].transactions {
            assert_eq!(*tx.message.recent_blockhash(), blockhash);
        }
    }
}
