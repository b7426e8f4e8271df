//! inapp-wallet
//!
//! Command-line front end for the in-app wallet core. Approval requests are
//! shown on the terminal and answered from stdin.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Parser, Subcommand};
use inapp_wallet::adapter::{EnvHost, InAppWallet};
use inapp_wallet::approval::{ApprovalGate, ApprovalPayload, ApprovalView, PendingApproval, SimulationPreview};
use inapp_wallet::backend::HttpSigningBackend;
use inapp_wallet::broadcast::Broadcaster;
use inapp_wallet::cache::{CacheOptions, PersistentCache, SledStorage};
use inapp_wallet::config::Config;
use inapp_wallet::metrics::metrics;
use inapp_wallet::pipeline::WalletPipeline;
use inapp_wallet::portfolio::Portfolio;
use inapp_wallet::rpc::SolanaRpc;
use inapp_wallet::simulator::{AssetChange, BalanceDiffSimulator};
use inapp_wallet::transfer;
use inapp_wallet::tx_builder::TransactionBuilder;
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "INAPP_WALLET_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Override the chain RPC endpoint from the config file
    #[arg(long, env = "INAPP_WALLET_RPC")]
    rpc: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve (or provision) the account and print it
    Connect,
    /// List fungible holdings and their value
    Portfolio {
        /// Only show holdings whose name or symbol contains this
        #[arg(long)]
        search: Option<String>,
        /// Ignore the cached listing
        #[arg(long)]
        refresh: bool,
    },
    /// Send SOL
    SendSol {
        #[arg(long)]
        to: Pubkey,
        #[arg(long)]
        lamports: u64,
    },
    /// Send a token held in the portfolio
    SendToken {
        #[arg(long)]
        to: Pubkey,
        #[arg(long)]
        mint: Pubkey,
        /// Amount in base units
        #[arg(long)]
        amount: u64,
    },
    /// Sign an arbitrary message
    SignMessage {
        #[arg(long)]
        message: String,
    },
    /// Preview the balance changes of a base64-encoded transaction
    Simulate {
        #[arg(long)]
        tx: String,
        /// Whose balances to report (defaults to the fee payer)
        #[arg(long)]
        requester: Option<Pubkey>,
    },
    /// Drop one cache entry, or all of them
    CacheClear {
        #[arg(long)]
        key: Option<String>,
    },
    /// Print the metrics registry in text format
    Metrics,
}

struct App {
    config: Config,
    rpc: Arc<SolanaRpc>,
    cache: Arc<PersistentCache>,
    simulator: Arc<BalanceDiffSimulator>,
    wallet: Arc<InAppWallet>,
    pipeline: WalletPipeline,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(rpc) = args.rpc {
        config.wallet.rpc_endpoint = rpc;
    }
    config.validate().context("Invalid configuration")?;

    init_logging(&config, args.verbose)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting inapp-wallet");

    let app = build_app(config)?;
    let approver = tokio::spawn(console_approver(app.wallet.gate().clone()));

    let result = run(&app, args.command).await;
    approver.abort();

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

/// Initialize logging subsystem
fn init_logging(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        "inapp_wallet=debug,info".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(&level).context("Invalid log filter")?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    }
    .context("Failed to initialise tracing")
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    } else {
        // dotenv still applies without a file
        let _ = dotenvy::dotenv();
        eprintln!("Config file '{}' not found, using defaults", path.display());
        Ok(Config::default())
    }
}

fn build_app(config: Config) -> Result<App> {
    let rpc = Arc::new(SolanaRpc::new(config.wallet.rpc_endpoint.clone()).context("Invalid RPC endpoint")?);

    let cache = Arc::new(match &config.cache.path {
        Some(path) => {
            let storage = SledStorage::open(path)
                .with_context(|| format!("Failed to open cache at {}", path.display()))?;
            PersistentCache::load(
                Arc::new(storage),
                CacheOptions {
                    schema_version: config.cache.schema_version.clone(),
                    default_ttl: config.cache.default_ttl(),
                    ..Default::default()
                },
            )
        }
        None => PersistentCache::in_memory(),
    });

    let backend = Arc::new(
        HttpSigningBackend::new(config.wallet.backend_endpoint.clone())
            .context("Failed to create signing backend client")?,
    );
    let gate = Arc::new(ApprovalGate::new(config.approval.timeout()));
    let broadcaster = Arc::new(Broadcaster::new(rpc.clone(), config.broadcast.clone()));
    let simulator = Arc::new(BalanceDiffSimulator::new(
        rpc.clone(),
        cache.clone(),
        config.cache.metadata_ttl(),
    ));

    let wallet = Arc::new(
        InAppWallet::new(
            &EnvHost,
            backend,
            gate,
            broadcaster.clone(),
            cache.clone(),
            config.wallet.app_name.clone(),
        )
        .with_simulator(simulator.clone()),
    );

    let pipeline = WalletPipeline::new(
        TransactionBuilder::new(rpc.clone(), config.fees.clone()),
        wallet.clone(),
        broadcaster,
    );

    Ok(App {
        config,
        rpc,
        cache,
        simulator,
        wallet,
        pipeline,
    })
}

async fn connect(app: &App) -> Result<Pubkey> {
    app.wallet.connect().await.context("Failed to connect wallet")?;
    app.wallet
        .public_key()
        .context("Wallet reported connected without an account")
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Connect => {
            let account = connect(app).await?;
            println!("{}", account);
        }
        Command::Portfolio { search, refresh } => {
            let owner = connect(app).await?;
            if refresh {
                Portfolio::invalidate(&app.cache, &owner);
            }
            let portfolio =
                Portfolio::fetch(app.rpc.as_ref(), &app.cache, app.config.cache.asset_ttl(), &owner)
                    .await
                    .context("Failed to load portfolio")?;

            for holding in portfolio.search(search.as_deref().unwrap_or("")) {
                println!(
                    "{:>20} {:<8} ${:>12.2}  {}",
                    holding.ui_balance(),
                    holding.symbol.as_deref().unwrap_or("?"),
                    holding.value_usd(),
                    holding.name.as_deref().unwrap_or(&holding.id),
                );
            }
            println!("Total: ${:.2}", portfolio.total_value_usd());
        }
        Command::SendSol { to, lamports } => {
            let owner = connect(app).await?;
            let instructions = transfer::plan_native_transfer(&owner, &to, lamports)?;
            send(app, instructions).await?;
        }
        Command::SendToken { to, mint, amount } => {
            let owner = connect(app).await?;
            let portfolio =
                Portfolio::fetch(app.rpc.as_ref(), &app.cache, app.config.cache.asset_ttl(), &owner)
                    .await
                    .context("Failed to load portfolio")?;
            let Some(holding) = portfolio.find(&mint.to_string()) else {
                bail!("{} is not in this wallet's portfolio", mint);
            };
            if amount > holding.balance {
                bail!("Insufficient balance: have {}, asked for {}", holding.balance, amount);
            }
            let program = holding.program().context("Not a token holding")?;

            let instructions =
                transfer::plan_token_transfer(&owner, &to, &mint, program, amount, holding.decimals)?;
            send(app, instructions).await?;
            Portfolio::invalidate(&app.cache, &owner);
        }
        Command::SignMessage { message } => {
            connect(app).await?;
            let signature = app
                .wallet
                .sign_message(message.as_bytes())
                .await
                .context("Failed to sign message")?;
            println!("{}", BASE64.encode(signature));
        }
        Command::Simulate { tx, requester } => {
            let bytes = BASE64.decode(tx.trim()).context("Transaction is not valid base64")?;
            let tx: VersionedTransaction =
                bincode::deserialize(&bytes).context("Failed to decode transaction")?;
            let changes = match requester {
                Some(requester) => app.simulator.simulate_for(&tx, &requester).await,
                None => app.simulator.simulate(&tx).await,
            }
            .context("Simulation failed")?;
            print_changes(&changes);
        }
        Command::CacheClear { key } => {
            app.cache.clear(key.as_deref());
            println!("Cache cleared ({} entries left)", app.cache.len());
        }
        Command::Metrics => {
            print!("{}", metrics().encode_text().context("Failed to encode metrics")?);
        }
    }
    Ok(())
}

async fn send(app: &App, instructions: Vec<solana_sdk::instruction::Instruction>) -> Result<()> {
    match app.pipeline.build_and_send(instructions, &[], None).await {
        Ok(signature) => {
            println!("Confirmed: {}", signature);
            Ok(())
        }
        Err(e) if e.is_user_rejection() => {
            println!("Cancelled");
            Ok(())
        }
        Err(e) => Err(e).context("Transfer failed"),
    }
}

fn print_changes(changes: &[AssetChange]) {
    if changes.is_empty() {
        println!("  no balance changes");
    }
    for change in changes {
        let symbol = change
            .metadata
            .as_ref()
            .and_then(|m| m.symbol.clone())
            .unwrap_or_else(|| change.kind.mint().map(|m| m.to_string()).unwrap_or_default());
        match change.ui_amount() {
            Some(amount) => println!("  {:+} {}", amount, symbol),
            None => println!("  {:+} (base units) {}", change.delta, symbol),
        }
    }
}

fn print_request(pending: &PendingApproval) {
    println!();
    match &pending.payload {
        ApprovalPayload::Transactions(txs) => {
            println!("Approve {} transaction(s)?", txs.len());
        }
        ApprovalPayload::Message(bytes) => {
            println!("Sign message: {}", String::from_utf8_lossy(bytes));
        }
    }
    match &pending.preview {
        SimulationPreview::Changes(changes) => print_changes(changes),
        SimulationPreview::Failed(err) => println!("  WARNING: the chain rejects this transaction: {}", err),
        SimulationPreview::Unavailable => {}
    }
    println!("[y/N] ");
}

/// Answers approval requests from stdin
async fn console_approver(gate: Arc<ApprovalGate>) {
    let mut view = gate.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while view.changed().await.is_ok() {
        let pending = match &*view.borrow_and_update() {
            ApprovalView::Pending(pending) => pending.clone(),
            _ => continue,
        };
        print_request(&pending);

        let answer = tokio::time::timeout(gate.timeout(), lines.next_line()).await;
        let approved = matches!(
            answer,
            Ok(Ok(Some(ref line))) if line.trim().eq_ignore_ascii_case("y")
        );

        let resolved = if approved { gate.approve() } else { gate.cancel() };
        if !resolved {
            warn!(approval_id = pending.id, "Request already resolved");
        }
    }
}
