use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod cli;

use trade_ledger::context::Ctx;
use trade_ledger::model::RawTransaction;
use trade_ledger::reconcile::BrokerPosition;
use trade_ledger::store::ingest;
use trade_ledger::{crypto, db, pipeline, query, reconcile};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // A missing or broken key must fail loudly before anything touches
    // stored credentials.
    crypto::init_from_env().context("loading credential encryption key")?;

    let cli = cli::Cli::parse();
    let ctx = match &cli.user {
        Some(user) => Ctx::new(user.clone()),
        None => Ctx::single_user(),
    };

    match cli.command {
        cli::Command::Init => {
            db::open(&cli.db)?;
            println!("initialized {}", cli.db.display());
            Ok(())
        }

        cli::Command::Ingest { file, reprocess } => {
            let mut conn = db::open(&cli.db)?;
            ctx.ensure_user(&conn)?;

            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let values: Vec<serde_json::Value> =
                serde_json::from_str(&text).context("parsing transaction file")?;

            // Malformed records are dropped with a warning, never abort the batch.
            let mut rows: Vec<RawTransaction> = Vec::with_capacity(values.len());
            for value in values {
                match serde_json::from_value::<RawTransaction>(value) {
                    Ok(row) => rows.push(row),
                    Err(e) => warn!(error = %e, "skipping malformed transaction record"),
                }
            }

            let saved = ingest::save_raw_transactions(&conn, &ctx, &rows)?;
            println!("ingested {saved} new transactions ({} total in file)", rows.len());

            if reprocess {
                let raw = ingest::load_raw_transactions(&conn, &ctx)?;
                let result = pipeline::reprocess(&mut conn, &ctx, &raw, None)?;
                print_pipeline_result(&result);
            }
            Ok(())
        }

        cli::Command::Reprocess { underlying } => {
            let mut conn = db::open(&cli.db)?;
            let (raw, affected) = if underlying.is_empty() {
                (ingest::load_raw_transactions(&conn, &ctx)?, None)
            } else {
                (
                    ingest::load_raw_transactions_for_underlyings(&conn, &ctx, &underlying)?,
                    Some(underlying.as_slice()),
                )
            };
            let result = pipeline::reprocess(&mut conn, &ctx, &raw, affected)?;
            print_pipeline_result(&result);
            Ok(())
        }

        cli::Command::Ledger { account, underlying, json } => {
            let conn = db::open(&cli.db)?;
            let groups = query::ledger_view(&conn, &ctx, account.as_deref(), underlying.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                for group in &groups {
                    println!(
                        "{} {} [{}] {} lots ({} open) realized {}",
                        group.underlying,
                        group.strategy_label.as_deref().unwrap_or("-"),
                        group.status.as_str(),
                        group.lot_count,
                        group.open_lot_count,
                        group.realized_pnl,
                    );
                    for lot in &group.lots {
                        println!(
                            "  {} {} @ {} remaining {}/{} [{}] pnl {}",
                            lot.symbol,
                            lot.quantity,
                            lot.entry_price,
                            lot.remaining_quantity,
                            lot.original_quantity,
                            lot.status.as_str(),
                            lot.realized_pnl,
                        );
                    }
                }
            }
            Ok(())
        }

        cli::Command::Chains { account, underlying, json } => {
            let conn = db::open(&cli.db)?;
            let chains = query::chains_view(&conn, &ctx, account.as_deref(), underlying.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&chains)?);
            } else {
                for chain in &chains {
                    println!(
                        "{} [{}] {} orders, strategy {}, realized {}, total {}",
                        chain.chain_id,
                        chain.status.as_str(),
                        chain.order_count,
                        chain.strategy_type.as_deref().unwrap_or("Unknown"),
                        chain.realized_pnl,
                        chain.total_pnl,
                    );
                }
            }
            Ok(())
        }

        cli::Command::Reconcile { positions } => {
            let conn = db::open(&cli.db)?;
            let text = std::fs::read_to_string(&positions)
                .with_context(|| format!("reading {}", positions.display()))?;
            let snapshot: Vec<BrokerPosition> =
                serde_json::from_str(&text).context("parsing positions file")?;
            let summary = reconcile::reconcile_positions(&conn, &ctx, &snapshot)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn print_pipeline_result(result: &pipeline::PipelineResult) {
    println!(
        "reprocessed: {} orders, {} chains, {} group links, {} lots netted",
        result.orders_assembled,
        result.chains_derived,
        result.groups_processed,
        result.equity_lots_netted,
    );
}
