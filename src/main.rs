use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ledger_accounts::{
    config::AccountsConfig,
    contracts::verify_transition,
    identity::{Party, PartyDirectory},
    is_successor, project,
    schemas::project_all,
    supported_schemas,
    vault::{AccountCriteria, AccountVault, StateStatus},
    AccountInfo, AccountStatus, SchemaRef, UniqueIdentifier,
};

type CmdResult = Result<ExitCode, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "accounts", version, about = "Account info states: create, evolve, verify and project")]
struct Cli {
    /// Path to the TOML config
    #[arg(long, global = true, default_value = "accounts.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an ed25519 party keypair (sk.hex, pk.hex)
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Register a new account
    Create {
        #[arg(long)]
        name: String,
        /// Hosting party; defaults to the configured node
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        external_id: Option<String>,
        #[arg(long)]
        status: Option<AccountStatus>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Write a successor of an existing account
    Update {
        record: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        status: Option<AccountStatus>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Write the closed successor of an account
    Close {
        record: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Check that NEW is a valid successor of OLD
    Verify { old: PathBuf, new: PathBuf },
    /// List the schemas accounts project into
    Schemas,
    /// Project an account into a query row
    Project {
        record: PathBuf,
        /// Defaults to the first supported schema
        #[arg(long)]
        schema: Option<String>,
    },
    /// Replay account versions in order and print the indexed rows
    Index {
        records: Vec<PathBuf>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        status: Option<AccountStatus>,
        /// Include superseded versions
        #[arg(long)]
        all: bool,
    },
}

//==================== helpers ====================//

fn read_record(path: &Path) -> Result<AccountInfo, Box<dyn Error>> {
    let bytes = fs::read(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    let record = serde_json::from_slice(&bytes)
        .map_err(|e| format!("decoding {}: {e}", path.display()))?;
    Ok(record)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve_host(
    config: &AccountsConfig,
    directory: &PartyDirectory,
    host: Option<&str>,
) -> Result<Party, Box<dyn Error>> {
    let name = match (host, &config.node) {
        (Some(name), _) => name,
        (None, Some(node)) => node.name.as_str(),
        (None, None) => return Err("no --host given and no [node] configured".into()),
    };
    Ok(directory.resolve(name)?)
}

//==================== commands ====================//

fn keygen_cmd(out_dir: &Path) -> CmdResult {
    fs::create_dir_all(out_dir)?;
    let sk = SigningKey::generate(&mut OsRng);
    fs::write(out_dir.join("sk.hex"), hex::encode(sk.to_bytes()))?;
    fs::write(
        out_dir.join("pk.hex"),
        hex::encode(sk.verifying_key().as_bytes()),
    )?;
    println!("keypair written → {}", out_dir.display());
    Ok(ExitCode::SUCCESS)
}

fn create_cmd(
    config: &AccountsConfig,
    name: String,
    host: Option<&str>,
    external_id: Option<String>,
    status: Option<AccountStatus>,
    out: &Path,
) -> CmdResult {
    let directory = config.directory()?;
    let host = resolve_host(config, &directory, host)?;
    let mut builder = AccountInfo::builder()
        .name(name)
        .host(host)
        .id(UniqueIdentifier::new(external_id));
    if let Some(status) = status {
        builder = builder.status(status);
    }
    let record = builder.build()?;
    verify_transition(None, Some(&record))?;
    write_json(out, &record)?;
    info!(id = %record.id(), host = %record.host(), "account created");
    println!("{} → {}", record.id(), out.display());
    Ok(ExitCode::SUCCESS)
}

fn update_cmd(
    config: &AccountsConfig,
    record: &Path,
    name: Option<String>,
    host: Option<&str>,
    status: Option<AccountStatus>,
    out: &Path,
) -> CmdResult {
    let old = read_record(record)?;
    let mut new = old.clone();
    if let Some(name) = name {
        new = new.with_name(name)?;
    }
    if host.is_some() {
        let directory = config.directory()?;
        new = new.with_host(resolve_host(config, &directory, host)?)?;
    }
    if let Some(status) = status {
        new = new.with_status(status);
    }
    let transition = verify_transition(Some(&old), Some(&new))?;
    write_json(out, &new)?;
    info!(id = %new.id(), ?transition, "account updated");
    println!("{} ({}) → {}", new.id(), new.state_hash(), out.display());
    Ok(ExitCode::SUCCESS)
}

fn close_cmd(record: &Path, out: &Path) -> CmdResult {
    let old = read_record(record)?;
    let closed = old.close();
    verify_transition(Some(&old), Some(&closed))?;
    write_json(out, &closed)?;
    println!("{} closed → {}", closed.id(), out.display());
    Ok(ExitCode::SUCCESS)
}

fn verify_cmd(old: &Path, new: &Path) -> CmdResult {
    let old = read_record(old)?;
    let new = read_record(new)?;
    println!("successor: {}", is_successor(&old, &new));
    match verify_transition(Some(&old), Some(&new)) {
        Ok(transition) => {
            println!("transition: {transition:?}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            warn!(%err, "transition rejected");
            println!("rejected: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn schemas_cmd() -> CmdResult {
    for schema in supported_schemas() {
        println!("{schema}");
    }
    Ok(ExitCode::SUCCESS)
}

fn project_cmd(record: &Path, schema: Option<String>) -> CmdResult {
    let record = read_record(record)?;
    let row = match schema {
        Some(schema) => project(&record, &SchemaRef::new(schema))?,
        None => project_all(&record)?
            .into_iter()
            .next()
            .map(|(_, row)| row)
            .ok_or("no supported schemas")?,
    };
    print_json(&row)?;
    Ok(ExitCode::SUCCESS)
}

fn index_cmd(
    config: &AccountsConfig,
    records: &[PathBuf],
    host: Option<&str>,
    status: Option<AccountStatus>,
    all: bool,
) -> CmdResult {
    let mut vault = AccountVault::new();
    for path in records {
        let record = read_record(path)?;
        let transition = vault.record(&record)?;
        info!(path = %path.display(), ?transition, "indexed");
    }
    let mut criteria = AccountCriteria::default();
    if let Some(host) = host {
        criteria = criteria.host(config.directory()?.resolve(host)?);
    }
    if let Some(status) = status {
        criteria = criteria.status(status);
    }
    if all {
        criteria = criteria.state_status(StateStatus::All);
    }
    print_json(&vault.query(&criteria)?)?;
    let snapshot = vault.snapshot();
    println!(
        "height {} · unconsumed {} · root {}",
        snapshot.height,
        snapshot.unconsumed,
        hex::encode(snapshot.merkle_root)
    );
    Ok(ExitCode::SUCCESS)
}

//==================== main ====================//

fn run(cli: Cli) -> CmdResult {
    let config = AccountsConfig::load_or_default(&cli.config)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    if cli.config.exists() {
        info!(path = %cli.config.display(), "config loaded");
    } else {
        info!(path = %cli.config.display(), "config not found, using defaults");
    }

    match cli.command {
        Command::Keygen { out_dir } => keygen_cmd(&out_dir),
        Command::Create {
            name,
            host,
            external_id,
            status,
            out,
        } => create_cmd(&config, name, host.as_deref(), external_id, status, &out),
        Command::Update {
            record,
            name,
            host,
            status,
            out,
        } => update_cmd(&config, &record, name, host.as_deref(), status, &out),
        Command::Close { record, out } => close_cmd(&record, &out),
        Command::Verify { old, new } => verify_cmd(&old, &new),
        Command::Schemas => schemas_cmd(),
        Command::Project { record, schema } => project_cmd(&record, schema),
        Command::Index {
            records,
            host,
            status,
            all,
        } => index_cmd(&config, &records, host.as_deref(), status, all),
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
