//! `barbican-sdb` command-line entry point.
//!
//! ```text
//! barbican-sdb get sdb://pwd/user1
//! barbican-sdb set sdb://pwd/user1 '$5$0DZt7BTf$gjNPsFCJDpwUhLervVkOhbzrmSxNnfJw46V.h7eEaE.'
//! barbican-sdb delete sdb://pwd/user1
//! ```
//!
//! Results are printed as JSON on stdout; logs go to stderr.

use barbican_sdb::Sdb;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "barbican-sdb", version, about = "Read and write Barbican secrets through sdb:// URIs")]
struct Args {
    /// YAML file holding the connection profiles
    #[arg(
        short,
        long,
        default_value = "/etc/salt/master.d/passwords.conf",
        env = "BARBICAN_SDB_CONFIG"
    )]
    config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn", env = "BARBICAN_SDB_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the latest value of a key, or null
    Get { uri: String },
    /// Store a value if the key is free; prints the value, or false when taken
    Set { uri: String, value: String },
    /// Remove the latest value of a key; prints whether it existed
    Delete { uri: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("barbican_sdb={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let sdb = Sdb::from_path(&args.config).await?;
    let output = run(&sdb, &args.command).await?;

    sdb.close().await?;
    println!("{}", output);
    Ok(())
}

/// Runs one command and renders its result as JSON: the value or `null`
/// for `get`, the value or `false` for `set`, a boolean for `delete`.
async fn run(sdb: &Sdb, command: &Command) -> barbican_sdb::Result<Value> {
    let output = match command {
        Command::Get { uri } => sdb.get(uri).await?.map_or(Value::Null, Value::String),
        Command::Set { uri, value } => sdb
            .set(uri, value)
            .await?
            .map_or(Value::Bool(false), Value::String),
        Command::Delete { uri } => Value::Bool(sdb.delete(uri).await?),
    };
    Ok(output)
}
