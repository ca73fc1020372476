use std::{str::FromStr, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use client_core::{
    visible_orders, FeedState, HttpOrderStore, OrderDraft, OrderSession, OrderStore, SessionEvent,
    Statistics, Tab,
};
use shared::domain::{Order, OrderId};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(name = "bordados", about = "Track embroidery orders")]
struct Cli {
    /// Order store base url, overrides bordados.toml and APP__SERVER_URL.
    #[arg(long, global = true)]
    server_url: Option<String>,
    /// Days until delivery when an order is created without a date.
    #[arg(long, global = true)]
    delivery_days: Option<u32>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show orders of one tab, optionally filtered by text.
    List {
        #[arg(long, default_value_t = Tab::Pending)]
        tab: Tab,
        #[arg(long, default_value = "")]
        search: String,
    },
    Stats,
    Create {
        #[arg(long)]
        client: String,
        #[arg(long, default_value = "")]
        contact: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        #[arg(long)]
        price: f64,
        /// YYYY-MM-DD
        #[arg(long)]
        delivery: Option<NaiveDate>,
    },
    ToggleCompleted {
        id: String,
    },
    TogglePaid {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Re-render statistics and pending orders on every change until Ctrl-C.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(days) = cli.delivery_days {
        settings.default_delivery_days = days;
    }

    let store = HttpOrderStore::new(&settings.server_url)?;
    store
        .check_connection()
        .await
        .with_context(|| format!("order store at {} is not reachable", settings.server_url))?;
    let session = OrderSession::connect(Arc::new(store), settings.session())
        .await
        .with_context(|| format!("failed to subscribe to {}", settings.server_url))?;
    session
        .wait_until_loaded()
        .await
        .context("failed to load orders")?;
    info!(server_url = %settings.server_url, "orders loaded");

    let outcome = run(&session, cli.command).await;
    session.close();
    outcome
}

async fn run(session: &OrderSession, command: Command) -> Result<()> {
    let today = Local::now().date_naive();
    match command {
        Command::List { tab, search } => {
            let orders = session.snapshot().await;
            let visible = visible_orders(&orders, tab, &search);
            print!("{}", render::order_table(&visible, today));
            println!("{} of {} orders ({tab})", visible.len(), orders.len());
        }
        Command::Stats => {
            let orders = session.snapshot().await;
            print!(
                "{}",
                render::statistics(&Statistics::from_orders(&orders, today))
            );
        }
        Command::Create {
            client,
            contact,
            description,
            quantity,
            price,
            delivery,
        } => {
            let draft = OrderDraft {
                client_name: client,
                contact_number: contact,
                description,
                quantity,
                unit_price: price,
                delivery_date: delivery,
            };
            draft.validate()?;
            println!("total: {}", render::money(draft.total_price()));
            let order = session.create(draft).await?;
            print!("{}", render::order_detail(&order));
        }
        Command::ToggleCompleted { id } => {
            let order_id = resolve_order_id(&session.snapshot().await, &id)?;
            session.toggle_completed(order_id).await?;
            print_order(session, order_id).await;
        }
        Command::TogglePaid { id } => {
            let order_id = resolve_order_id(&session.snapshot().await, &id)?;
            session.toggle_paid(order_id).await?;
            print_order(session, order_id).await;
        }
        Command::Delete { id } => {
            let order_id = resolve_order_id(&session.snapshot().await, &id)?;
            session.delete(order_id).await?;
            println!("deleted {order_id}");
        }
        Command::Watch => watch(session, today).await?,
    }

    for notice in session.active_notices().await {
        eprintln!("{}", render::notice_line(&notice));
    }
    Ok(())
}

async fn print_order(session: &OrderSession, order_id: OrderId) {
    let orders = session.snapshot().await;
    if let Some(order) = orders.iter().find(|order| order.id == order_id) {
        print!("{}", render::order_detail(order));
    }
}

async fn watch(session: &OrderSession, today: NaiveDate) -> Result<()> {
    let mut events = session.subscribe();
    let mut feed_state = session.watch_feed_state();
    render_dashboard(&session.snapshot().await, today);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = feed_state.wait_for(|state| *state == FeedState::Closed) => {
                bail!("change feed closed; restart watch to resume")
            }
            event = events.recv() => match event {
                Ok(SessionEvent::SnapshotChanged(orders)) => render_dashboard(&orders, today),
                Ok(SessionEvent::Notice(notice)) => eprintln!("{}", render::notice_line(&notice)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dashboard fell behind; redrawing from snapshot");
                    render_dashboard(&session.snapshot().await, today);
                }
                Err(RecvError::Closed) => bail!("session closed"),
            },
        }
    }
    Ok(())
}

fn render_dashboard(orders: &[Order], today: NaiveDate) {
    println!();
    print!(
        "{}",
        render::statistics(&Statistics::from_orders(orders, today))
    );
    print!(
        "{}",
        render::order_table(&visible_orders(orders, Tab::Pending, ""), today)
    );
}

/// Accepts a full order id or a prefix that names exactly one order.
fn resolve_order_id(orders: &[Order], raw: &str) -> Result<OrderId> {
    let raw = raw.trim();
    if let Ok(order_id) = OrderId::from_str(raw) {
        return Ok(order_id);
    }
    if raw.is_empty() {
        bail!("order id is empty");
    }

    let prefix = raw.to_ascii_lowercase();
    let mut matches = orders
        .iter()
        .filter(|order| order.id.to_string().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(order), None) => Ok(order.id),
        (None, _) => Err(anyhow!("no order id starts with '{raw}'")),
        (Some(_), Some(_)) => Err(anyhow!("'{raw}' matches more than one order")),
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
