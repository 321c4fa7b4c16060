use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use returns_core::domain::{
    Batch, BatchId, Order, OrderId, OrderLine, OrderStatus, ReturnDraft, ReturnId, ReturnItem,
    ReturnReason, ReturnStatus, UserId,
};
use returns_core::impls::SqliteReturnStore;
use returns_core::ports::{IdGenerator, ReturnStore, SystemClock, UlidGenerator};
use returns_core::{AppBuilder, ReturnService, ReturnsConfig};

/// 受注返品の CLI
#[derive(Debug, Parser)]
#[command(name = "returns", version, about = "Order return lifecycle")]
struct Cli {
    /// TOML config file; missing file means defaults
    #[arg(long, global = true, default_value = "returns.toml")]
    config: PathBuf,

    /// Overrides `database_path` from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Recorded as the actor on transitions and movements
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    /// Inventory batches
    #[command(subcommand)]
    Batch(BatchCommand),
    /// Orders returns are raised against
    #[command(subcommand)]
    Order(OrderCommand),
    /// Create a return in PENDING
    Create(CreateArgs),
    /// Move a return to another status
    Transition {
        id: ReturnId,
        status: ReturnStatus,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Print a return with its inventory movements
    Show { id: ReturnId },
    /// Print the number of returns per status
    Counts,
}

#[derive(Debug, Subcommand)]
enum BatchCommand {
    Add {
        #[arg(long)]
        code: String,
        #[arg(long, default_value = "0")]
        on_hand: Decimal,
    },
}

#[derive(Debug, Subcommand)]
enum OrderCommand {
    Add {
        /// Mark the order fulfilled (otherwise confirmed)
        #[arg(long)]
        fulfilled: bool,
        /// BATCH_ID=QTY, repeatable
        #[arg(long = "line", value_parser = parse_quantity, required = true)]
        lines: Vec<(BatchId, Decimal)>,
    },
}

#[derive(Debug, Args)]
struct CreateArgs {
    #[arg(long)]
    order: OrderId,
    #[arg(long)]
    reason: ReturnReason,
    /// BATCH_ID=QTY, repeatable
    #[arg(long = "item", value_parser = parse_quantity, required = true)]
    items: Vec<(BatchId, Decimal)>,
    /// Put the items back on hand immediately
    #[arg(long)]
    restock: bool,
    #[arg(long)]
    notes: Option<String>,
}

fn parse_quantity(raw: &str) -> Result<(BatchId, Decimal), String> {
    let (batch, qty) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected BATCH_ID=QTY, got {raw:?}"))?;
    let batch = batch.trim().parse::<BatchId>().map_err(|e| e.to_string())?;
    let qty = qty
        .trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid quantity {qty:?}: {e}"))?;
    if qty <= Decimal::ZERO {
        return Err(format!("quantity must be positive, got {qty}"));
    }
    Ok((batch, qty))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = ReturnsConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(db) = cli.db.clone() {
        config.database_path = db;
    }
    debug!(?config, "configuration loaded");

    let store = SqliteReturnStore::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let ids = UlidGenerator::new(SystemClock);
    let actor = UserId::new(cli.actor.clone());
    let service = AppBuilder::new()
        .store(store.clone())
        .config(config.clone())
        .build()?;

    run(cli.command, &service, &store, &ids, actor, &config).await
}

async fn run(
    command: Command,
    service: &ReturnService,
    store: &SqliteReturnStore,
    ids: &UlidGenerator<SystemClock>,
    actor: UserId,
    config: &ReturnsConfig,
) -> Result<()> {
    match command {
        Command::Init => {
            info!(path = %config.database_path.display(), "database ready");
        }
        Command::Batch(BatchCommand::Add { code, on_hand }) => {
            let batch = Batch::new(ids.generate_batch_id(), code, on_hand, Utc::now());
            batch.validate()?;
            store.insert_batch(batch.clone()).await?;
            print_json(&batch)?;
        }
        Command::Order(OrderCommand::Add { fulfilled, lines }) => {
            let status = if fulfilled {
                OrderStatus::Fulfilled
            } else {
                OrderStatus::Confirmed
            };
            let lines = lines
                .into_iter()
                .map(|(batch_id, quantity)| OrderLine { batch_id, quantity })
                .collect();
            let order = Order::new(ids.generate_order_id(), status, lines);
            order.validate()?;
            store.insert_order(order.clone()).await?;
            print_json(&order)?;
        }
        Command::Create(args) => {
            let items = args
                .items
                .into_iter()
                .map(|(batch, qty)| ReturnItem::new(batch, qty))
                .collect();
            let mut draft = ReturnDraft::new(args.order, items, args.reason, actor)
                .with_restock(args.restock);
            if let Some(notes) = args.notes {
                draft = draft.with_notes(notes);
            }
            let record = service
                .create_return(draft)
                .await
                .context("creating return")?;
            print_json(&record)?;
        }
        Command::Transition {
            id,
            status,
            comment,
        } => {
            let record = service
                .transition(id, status, &actor, comment.as_deref())
                .await
                .with_context(|| format!("moving {id} to {status}"))?;
            print_json(&record)?;
        }
        Command::Show { id } => {
            print_json(&service.history(id).await?)?;
        }
        Command::Counts => {
            print_json(&service.status_counts().await?)?;
        }
    }
    Ok(())
}
