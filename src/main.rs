use clap::Parser;
use corebank::application::accounts::AccountService;
use corebank::application::settlement::SettlementCoordinator;
use corebank::config::LedgerConfig;
use corebank::domain::money::Amount;
use corebank::domain::ports::LedgerStoreRef;
use corebank::domain::user::UserId;
use corebank::error::LedgerError;
use corebank::infrastructure::credentials::{Argon2Verifier, hash_credential};
use corebank::infrastructure::in_memory::InMemoryLedger;
use corebank::infrastructure::notify::TracingNotifier;
use corebank::interfaces::csv::balance_writer::BalanceWriter;
use corebank::interfaces::csv::script_reader::{ScriptOp, ScriptReader, ScriptRow};
use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Credentials provisioned for every scripted user. Replay scripts carry
/// no secrets, so the CLI assigns fixed ones and presents them back on
/// each operation.
const SCRIPT_PASSWORD: &str = "script-password";
const SCRIPT_PIN: &str = "0000";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input settlement script CSV file
    script: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

/// Script aliases to ledger identities, persisted next to the database so
/// a later run against the same `--db-path` can keep using the same names.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AliasBook {
    aliases: BTreeMap<String, UserId>,
}

struct ScriptCredentials {
    password_hash: String,
    pin_hash: String,
}

impl ScriptCredentials {
    fn provision() -> Result<Self> {
        Ok(Self {
            password_hash: hash_credential(SCRIPT_PASSWORD).into_diagnostic()?,
            pin_hash: hash_credential(SCRIPT_PIN).into_diagnostic()?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let (store, persistent) = match &cli.db_path {
        Some(db_path) => open_store(db_path)?,
        None => (Arc::new(InMemoryLedger::new()) as LedgerStoreRef, false),
    };

    let config = LedgerConfig::default();
    let verifier = Arc::new(Argon2Verifier);
    let accounts = AccountService::new(store.clone(), verifier.clone(), config);
    let settlement = SettlementCoordinator::new(store.clone(), verifier, Arc::new(TracingNotifier));

    // The alias book only survives alongside a real database; replaying
    // against an in-memory store starts from a blank ledger anyway.
    let manifest = if persistent {
        cli.db_path.as_deref().map(manifest_path)
    } else {
        None
    };
    let mut book = load_aliases(manifest.as_deref())?;
    let credentials = ScriptCredentials::provision()?;

    // Replay the script in order; a failed row is reported and skipped.
    let file = File::open(&cli.script).into_diagnostic()?;
    let reader = ScriptReader::new(file);
    for row_result in reader.rows() {
        match row_result {
            Ok(row) => {
                if let Err(e) = apply(&row, &mut book, &accounts, &settlement, &credentials).await {
                    eprintln!("Error processing operation: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading script row: {}", e);
            }
        }
    }

    save_aliases(manifest.as_deref(), &book)?;

    // Output final balances, one row per known alias.
    let stdout = io::stdout();
    let mut writer = BalanceWriter::new(stdout.lock());
    for (alias, user) in &book.aliases {
        match accounts.account_of(*user).await {
            Ok(account) => writer.write(alias, &account).into_diagnostic()?,
            Err(e) => eprintln!("Error reading balance for {}: {}", alias, e),
        }
    }
    writer.flush().into_diagnostic()?;

    Ok(())
}

async fn apply(
    row: &ScriptRow,
    book: &mut AliasBook,
    accounts: &AccountService,
    settlement: &SettlementCoordinator,
    credentials: &ScriptCredentials,
) -> corebank::error::Result<()> {
    match row.op {
        ScriptOp::Open => {
            if book.aliases.contains_key(&row.user) {
                return Err(LedgerError::Conflict(format!(
                    "user {} already has an account",
                    row.user
                )));
            }
            let (profile, _) = accounts
                .open_account(
                    &row.user,
                    credentials.password_hash.clone(),
                    credentials.pin_hash.clone(),
                )
                .await?;
            book.aliases.insert(row.user.clone(), profile.id);
            Ok(())
        }
        ScriptOp::Deposit => {
            let user = resolve(book, &row.user)?;
            settlement
                .self_deposit(
                    user,
                    scripted_amount(row)?,
                    row.description.clone(),
                    SCRIPT_PIN,
                    None,
                )
                .await?;
            Ok(())
        }
        ScriptOp::Transfer => {
            let user = resolve(book, &row.user)?;
            let counterparty = row
                .counterparty
                .as_deref()
                .ok_or(LedgerError::AccountNotFound)?;
            let dest = resolve(book, counterparty)?;
            let to_number = accounts.account_of(dest).await?.number;
            settlement
                .transfer(
                    user,
                    &to_number,
                    scripted_amount(row)?,
                    row.description.clone(),
                    SCRIPT_PIN,
                    None,
                )
                .await?;
            Ok(())
        }
        ScriptOp::Freeze => {
            let user = resolve(book, &row.user)?;
            accounts.lock_account(user).await?;
            Ok(())
        }
        ScriptOp::Unfreeze => {
            let user = resolve(book, &row.user)?;
            accounts.unlock_account(user, SCRIPT_PASSWORD).await?;
            Ok(())
        }
    }
}

fn resolve(book: &AliasBook, alias: &str) -> corebank::error::Result<UserId> {
    book.aliases
        .get(alias)
        .copied()
        .ok_or(LedgerError::UserNotFound)
}

fn scripted_amount(row: &ScriptRow) -> corebank::error::Result<Amount> {
    let value = row.amount.ok_or(LedgerError::NonPositiveAmount)?;
    Amount::new(value)
}

fn manifest_path(db_path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.aliases.json", db_path.display()))
}

fn load_aliases(path: Option<&Path>) -> Result<AliasBook> {
    match path {
        Some(path) if path.exists() => {
            let file = File::open(path).into_diagnostic()?;
            serde_json::from_reader(file).into_diagnostic()
        }
        _ => Ok(AliasBook::default()),
    }
}

fn save_aliases(path: Option<&Path>, book: &AliasBook) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = File::create(path).into_diagnostic()?;
    serde_json::to_writer_pretty(file, book).into_diagnostic()?;
    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: &Path) -> Result<(LedgerStoreRef, bool)> {
    use corebank::infrastructure::rocksdb::RocksDbLedger;
    let store = RocksDbLedger::open(db_path).into_diagnostic()?;
    Ok((Arc::new(store), true))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(_db_path: &Path) -> Result<(LedgerStoreRef, bool)> {
    eprintln!(
        "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
    );
    Ok((Arc::new(InMemoryLedger::new()), false))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("corebank=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
