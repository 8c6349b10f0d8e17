//! Equity netting cleanup.
//!
//! The same `(account, symbol)` can end up holding both long and short open
//! equity lots (ACAT shares vs a call-assignment delivery). This pass closes
//! them against each other at the short lot's entry price: realized P&L is
//! booked on the long side, and the short lot is closed by a synthetic
//! zero-P&L closing.

use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::info;

use crate::context::Ctx;
use crate::model::{ClosingType, LotStatus};
use crate::store::lots::{self, FifoClose, NewClosing};

/// Synthetic order id carried by netting closings.
pub const EQUITY_NETTING_ORDER_ID: &str = "EQUITY_NETTING";

/// Net opposing open equity lots. Returns the number of lot sides closed.
pub fn net_opposing_equity_lots(conn: &Connection, ctx: &Ctx) -> Result<usize> {
    let mut netted = 0;

    for (account, symbol) in lots::nettable_equity_pairs(conn, ctx)? {
        for short_lot in lots::open_short_equity_lots(conn, ctx, &account, &symbol)? {
            let qty_to_close = short_lot.remaining_quantity.abs();

            // Closing date is the later of the two sides so closings never
            // predate the lots they close.
            let latest_long = lots::latest_long_equity_entry(conn, ctx, &account, &symbol)?;
            let closing_date = match latest_long {
                Some(d) if d > short_lot.entry_date => d,
                _ => short_lot.entry_date,
            };

            let outcome = lots::close_lot_fifo(
                conn,
                ctx,
                &FifoClose {
                    account_number: &account,
                    symbol: &symbol,
                    quantity_to_close: qty_to_close,
                    closing_price: short_lot.entry_price,
                    closing_order_id: EQUITY_NETTING_ORDER_ID,
                    closing_transaction_id: None,
                    closing_date,
                    closing_type: ClosingType::Manual,
                    close_long: Some(true),
                },
            )?;

            if outcome.lot_ids.is_empty() || outcome.quantity_closed <= Decimal::ZERO {
                continue;
            }

            // Close the short lot by the amount actually matched.
            let new_remaining = short_lot.remaining_quantity + outcome.quantity_closed;
            let status = if new_remaining == Decimal::ZERO {
                LotStatus::Closed
            } else {
                LotStatus::Partial
            };
            lots::update_lot_remaining(conn, ctx, short_lot.id, new_remaining, status)?;

            lots::insert_closing(
                conn,
                ctx,
                &NewClosing {
                    lot_id: short_lot.id,
                    closing_order_id: EQUITY_NETTING_ORDER_ID,
                    closing_transaction_id: None,
                    quantity_closed: outcome.quantity_closed,
                    closing_price: short_lot.entry_price,
                    closing_date,
                    closing_type: ClosingType::Manual,
                    realized_pnl: Decimal::ZERO,
                },
            )?;

            netted += outcome.lot_ids.len() + 1;
            info!(
                symbol = %symbol,
                shares = %outcome.quantity_closed,
                short_lot = short_lot.id,
                long_lots = outcome.lot_ids.len(),
                "netted opposing equity lots"
            );
        }
    }

    Ok(netted)
}
