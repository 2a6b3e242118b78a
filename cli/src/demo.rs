//! End-to-end walk through deposit, sync and withdrawal against the
//! in-process ledger and mock prover.

use std::sync::Arc;

use anyhow::{Result, bail};
use log::info;
use shroud_core::{
    Address, Confirmation, DepositConfig, DepositOrchestrator, InMemoryLedger, KeypairSigner,
    MockProver, NoteStore, SyncConfig, SyncEngine, WithdrawConfig, WithdrawalOrchestrator,
};

pub async fn run(amount: u128) -> Result<()> {
    let dir = std::env::temp_dir().join(format!("shroud-demo-{}", std::process::id()));
    let result = walk_through(&dir, amount).await;
    if let Err(e) = std::fs::remove_dir_all(&dir) {
        info!("could not clean up {}: {}", dir.display(), e);
    }
    result
}

async fn walk_through(dir: &std::path::Path, amount: u128) -> Result<()> {
    let store = Arc::new(NoteStore::open(dir)?);
    let ledger = Arc::new(InMemoryLedger::new());
    let signer = Arc::new(KeypairSigner::generate()?);
    let prover = Arc::new(MockProver::new());

    println!("🔐 Depositing {} into the pool...", amount);
    let deposits = DepositOrchestrator::new(
        store.clone(),
        ledger.clone(),
        signer.clone(),
        DepositConfig::default(),
    );
    let receipt = deposits.deposit(amount).await?;
    println!("   tx:         {}", receipt.tx_hash);
    println!("   commitment: {}", receipt.note.commitment());
    println!("   pending:    {}", store.pending_balance().await?);

    let block = ledger.mine();
    println!("⛏️  Mined block {}", block);

    match receipt.confirmation.await?? {
        Confirmation::Anchored(event) => {
            println!("   anchored at leaf {} (block {})", event.merkle_index, event.block)
        }
        other => bail!("deposit did not confirm: {:?}", other),
    }

    let report = SyncEngine::new(store.clone(), ledger.clone(), SyncConfig::default())
        .reconcile()
        .await;
    println!("🔄 Sync pass: {} updated, {} errors", report.updated, report.errors.len());
    println!("   spendable:  {}", store.balance().await?);

    let fee = amount / 100;
    let withdrawals = WithdrawalOrchestrator::new(
        store.clone(),
        ledger.clone(),
        prover,
        signer,
        WithdrawConfig::default(),
    );
    let withdrawal = withdrawals
        .withdraw(&receipt.note, Address([0x5A; 32]), fee)
        .await?;
    ledger.mine();

    println!("💸 Withdrew {} (fee {})", withdrawal.withdraw_amount, withdrawal.fee);
    println!("   tx:         {}", withdrawal.tx_hash);
    println!("   nullifier:  {}", withdrawal.nullifier_hash);

    let report = SyncEngine::new(store.clone(), ledger, SyncConfig::default())
        .reconcile()
        .await;
    println!("🔄 Sync pass: {} confirmed", report.confirmed);
    println!("   spendable:  {}", store.balance().await?);
    println!();
    println!("✅ Demo complete");
    Ok(())
}
