//! Module Wallet CLI
//!
//! Command-line tool for exercising module wallets on an in-process chain.

use alloy_primitives::{Address, Bytes, U256, address};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use k256::ecdsa::SigningKey;
use module_wallet_core::abi::selectors;
use module_wallet_core::module::guardian_manager::GuardianManager;
use module_wallet_core::module::lock_manager::LockManager;
use module_wallet_core::module::recovery_manager::RecoveryManager;
use module_wallet_core::module::transfer_manager::{NATIVE_TOKEN, TransferManager};
use module_wallet_core::relayer::Submission;
use module_wallet_core::types::signer_address;
use module_wallet_core::{
    AccountGateway, Chain, Config, Deployment, MetaTransaction, Relayer, SharedChain, Transaction,
    nonce_for_block, sign_hash,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "module-wallet")]
#[command(about = "Module wallet CLI", version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the full system and walk through transfer, lock and recovery
    Demo,

    /// Compute the digest signed for a relayed call
    SignHash {
        #[arg(long)]
        module: String,
        #[arg(long)]
        account: String,
        /// Hex call data
        #[arg(long)]
        data: String,
        #[arg(long, default_value = "0")]
        nonce: String,
        #[arg(long, default_value = "0")]
        gas_price: String,
        #[arg(long, default_value = "500000")]
        gas_limit: String,
    },

    /// List operation selectors
    Selectors,
}

const REGISTRY_OWNER: Address = address!("f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0");
const RELAYER: Address = address!("e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1e1");

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Demo => run_demo(config).await?,
        Commands::SignHash {
            module,
            account,
            data,
            nonce,
            gas_price,
            gas_limit,
        } => {
            let hash = sign_hash(
                parse_address(&module)?,
                parse_address(&account)?,
                &parse_hex(&data)?,
                parse_u256(&nonce)?,
                parse_u256(&gas_price)?,
                parse_u256(&gas_limit)?,
            );
            println!("{hash}");
        }
        Commands::Selectors => {
            for (signature, selector) in selectors::ALL {
                println!("{selector}  {signature}");
            }
        }
    }

    Ok(())
}

fn parse_address(value: &str) -> Result<Address> {
    value
        .parse()
        .with_context(|| format!("invalid address: {value}"))
}

fn parse_hex(value: &str) -> Result<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).with_context(|| format!("invalid hex: {value}"))
}

fn parse_u256(value: &str) -> Result<U256> {
    value
        .parse()
        .with_context(|| format!("invalid integer: {value}"))
}

fn demo_key(seed: u8) -> Result<SigningKey> {
    Ok(SigningKey::from_slice(&[seed; 32])?)
}

fn expect_success(receipt: module_wallet_core::Receipt, step: &str) -> Result<()> {
    if let Err(error) = receipt.result {
        bail!("{step} failed: {error}");
    }
    Ok(())
}

async fn run_demo(config: Config) -> Result<()> {
    let owner = demo_key(0x11)?;
    let guardians = [demo_key(0x21)?, demo_key(0x22)?, demo_key(0x23)?];
    let new_owner = signer_address(&demo_key(0x31)?);
    let recipient = Address::repeat_byte(0xb0);

    // ============ Bootstrap ============
    let mut chain = Chain::new(config.chain.clone());
    let system = Deployment::deploy(&mut chain, &config, REGISTRY_OWNER)?;
    let account = system.create_account(&mut chain, signer_address(&owner))?;
    chain.set_balance(account, U256::from(10u64).pow(U256::from(18)));
    chain.set_balance(RELAYER, U256::from(10u64).pow(U256::from(20)));

    for guardian in &guardians {
        let receipt = chain.transact(Transaction::new(
            signer_address(&owner),
            system.guardian_manager,
            GuardianManager::add_guardian_call(account, signer_address(guardian)),
        ));
        expect_success(receipt, "adding guardian")?;
    }
    info!(%account, guardians = guardians.len(), "Account ready");

    let block = chain.block_number();
    let chain: SharedChain = Arc::new(Mutex::new(chain));
    let relayer = Relayer::new(RELAYER, chain.clone());

    // ============ Owner-signed transfer ============
    let transfer = MetaTransaction::new(
        system.transfer_manager,
        account,
        TransferManager::transfer_token_call(
            account,
            NATIVE_TOKEN,
            recipient,
            U256::from(10u64).pow(U256::from(17)),
            Bytes::new(),
        ),
    )
    .with_nonce(nonce_for_block(block, 1));
    let signatures = transfer.sign(&[&owner])?;
    let outcome = relayer.submit(Submission::new(transfer, signatures)).await?;
    info!(success = outcome.success, "Transfer relayed");

    // ============ Guardian lock and unlock ============
    let lock = MetaTransaction::new(system.lock_manager, account, LockManager::lock_call(account))
        .with_nonce(nonce_for_block(block, 2));
    let signatures = lock.sign(&[&guardians[0]])?;
    let outcome = relayer.submit(Submission::new(lock, signatures)).await?;
    info!(success = outcome.success, "Lock relayed");

    let unlock = MetaTransaction::new(system.lock_manager, account, LockManager::unlock_call(account))
        .with_nonce(nonce_for_block(block, 3));
    let signatures = unlock.sign(&[&guardians[1]])?;
    let outcome = relayer.submit(Submission::new(unlock, signatures)).await?;
    info!(success = outcome.success, "Unlock relayed");

    // ============ Guardian-majority recovery ============
    let recovery = MetaTransaction::new(
        system.recovery_manager,
        account,
        RecoveryManager::execute_recovery_call(account, new_owner),
    )
    .with_nonce(nonce_for_block(block, 4))
    .with_gas_price(U256::from(1_000_000_000u64));
    let signers: Vec<&SigningKey> = guardians.iter().take(2).collect();
    let signatures = recovery.sign_sorted(&signers)?;
    let outcome = relayer.submit(Submission::new(recovery, signatures)).await?;
    info!(success = outcome.success, fee = %outcome.fee, "Recovery started");

    {
        let mut chain = chain.lock();
        chain.advance_time(config.security.recovery_period + 1);
        let receipt = chain.transact(Transaction::new(
            RELAYER,
            system.recovery_manager,
            RecoveryManager::finalize_recovery_call(account),
        ));
        expect_success(receipt, "finalizing recovery")?;
        info!(owner = %AccountGateway::owner(&chain, account), "Recovery finalized");
    }

    let chain = chain.lock();
    println!("{}", serde_json::to_string_pretty(chain.logs())?);
    Ok(())
}
