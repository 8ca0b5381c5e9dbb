use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ledger_core::TransactionKind;
use reqwest::{Client, Response, Url};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the audit ledger node")]
struct Cli {
    /// Node base URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record one order state transition
    Submit {
        /// Order the fact belongs to
        #[arg(long)]
        order: String,
        /// ORDER_CREATED, ORDER_PAID, MERCHANT_ACCEPTED, COURIER_ACCEPTED, ORDER_DELIVERED or ORDER_REFUNDED
        #[arg(long, value_parser = parse_kind)]
        kind: TransactionKind,
        /// Originating party
        #[arg(long)]
        actor: String,
        /// Receiving party
        #[arg(long)]
        counterparty: Option<String>,
        /// Opaque payload, e.g. a JSON document
        #[arg(long, default_value = "")]
        payload: String,
        /// Digest of off-chain data this fact attests to
        #[arg(long)]
        digest: Option<String>,
    },
    /// Print the audit trail of one order
    History {
        #[arg(long)]
        order: String,
    },
    /// Print the chain height and head hash
    Head,
    /// Re-verify every block on the node
    Validate,
    /// List blocks
    Blocks {
        #[arg(long, default_value_t = 0)]
        from: u64,
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
}

fn parse_kind(s: &str) -> Result<TransactionKind, String> {
    s.parse().map_err(|e: ledger_core::LedgerError| e.to_string())
}

/// `{node}/orders/{order}/history`, with the order id percent-encoded as one path segment.
fn history_url(node: &str, order: &str) -> Result<Url> {
    let mut url = Url::parse(node).with_context(|| format!("invalid node URL {node}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("node URL {node} cannot carry a path"))?
        .pop_if_empty()
        .extend(["orders", order, "history"]);
    Ok(url)
}

#[derive(Serialize)]
struct TxIn {
    order_id: String,
    kind: TransactionKind,
    actor: String,
    counterparty: Option<String>,
    payload: String,
    off_chain_digest: Option<String>,
}

#[derive(Serialize)]
struct AppendReq {
    transactions: Vec<TxIn>,
}

async fn print_response(res: Response) -> Result<()> {
    let status = res.status();
    let body: serde_json::Value = res.json().await.context("decoding response")?;
    println!("status: {status}");
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = Client::new();

    let res = match cli.cmd {
        Command::Submit {
            order,
            kind,
            actor,
            counterparty,
            payload,
            digest,
        } => {
            let req = AppendReq {
                transactions: vec![TxIn {
                    order_id: order,
                    kind,
                    actor,
                    counterparty,
                    payload,
                    off_chain_digest: digest,
                }],
            };
            debug!(%node, "submitting transaction");
            client
                .post(format!("{node}/transactions"))
                .json(&req)
                .send()
                .await?
        }
        Command::History { order } => client.get(history_url(node, &order)?).send().await?,
        Command::Head => client.get(format!("{node}/chain/head")).send().await?,
        Command::Validate => client.get(format!("{node}/chain/validate")).send().await?,
        Command::Blocks { from, limit } => {
            client
                .get(format!("{node}/chain/blocks"))
                .query(&[("from", from.to_string()), ("limit", limit.to_string())])
                .send()
                .await?
        }
    };
    print_response(res).await
}
