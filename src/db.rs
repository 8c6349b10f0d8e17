use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Open (or create) the ledger database at `path` and bring the schema up
/// to date.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("creating db directory")?;
        }
    }

    let conn = Connection::open(path)
        .with_context(|| format!("opening sqlite at {}", path.display()))?;

    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;
    Ok(conn)
}

/// In-memory database with the full schema. Used by tests.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("opening in-memory sqlite")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            created_at  INTEGER DEFAULT (unixepoch())
        );

        CREATE TABLE IF NOT EXISTS user_credentials (
            user_id           TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            provider          TEXT NOT NULL,
            encrypted_secret  TEXT NOT NULL,
            created_at        INTEGER DEFAULT (unixepoch()),
            PRIMARY KEY (user_id, provider)
        );

        CREATE TABLE IF NOT EXISTS raw_transactions (
            id                    TEXT NOT NULL,
            user_id               TEXT NOT NULL,
            account_number        TEXT NOT NULL,
            order_id              TEXT,
            symbol                TEXT,
            underlying_symbol     TEXT,
            action                TEXT,
            instrument_type       TEXT,
            transaction_type      TEXT,
            transaction_sub_type  TEXT,
            quantity              TEXT NOT NULL,
            price                 TEXT,
            executed_at           TEXT NOT NULL,
            commission            TEXT NOT NULL DEFAULT '0',
            regulatory_fees       TEXT NOT NULL DEFAULT '0',
            clearing_fees         TEXT NOT NULL DEFAULT '0',
            value                 TEXT NOT NULL DEFAULT '0',
            description           TEXT,
            PRIMARY KEY (id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_raw_tx_user_underlying
            ON raw_transactions (user_id, underlying_symbol);

        CREATE TABLE IF NOT EXISTS position_lots (
            id                   INTEGER PRIMARY KEY,
            user_id              TEXT NOT NULL,
            transaction_id       TEXT NOT NULL,
            account_number       TEXT NOT NULL,
            symbol               TEXT NOT NULL,
            underlying           TEXT NOT NULL,
            instrument_type      TEXT NOT NULL,
            option_type          TEXT,
            strike               TEXT,
            expiration           TEXT,
            quantity             TEXT NOT NULL,
            entry_price          TEXT NOT NULL,
            entry_date           TEXT NOT NULL,
            remaining_quantity   TEXT NOT NULL,
            original_quantity    TEXT NOT NULL,
            chain_id             TEXT,
            leg_index            INTEGER NOT NULL DEFAULT 0,
            opening_order_id     TEXT,
            derived_from_lot_id  INTEGER,
            derivation_type      TEXT,
            status               TEXT NOT NULL DEFAULT 'OPEN',
            UNIQUE (user_id, transaction_id)
        );
        CREATE INDEX IF NOT EXISTS idx_lots_user_account_symbol
            ON position_lots (user_id, account_number, symbol);
        CREATE INDEX IF NOT EXISTS idx_lots_user_chain
            ON position_lots (user_id, chain_id);

        CREATE TABLE IF NOT EXISTS lot_closings (
            closing_id              INTEGER PRIMARY KEY,
            user_id                 TEXT NOT NULL,
            lot_id                  INTEGER NOT NULL REFERENCES position_lots(id) ON DELETE CASCADE,
            closing_order_id        TEXT NOT NULL,
            closing_transaction_id  TEXT,
            quantity_closed         TEXT NOT NULL,
            closing_price           TEXT NOT NULL,
            closing_date            TEXT NOT NULL,
            closing_type            TEXT NOT NULL,
            realized_pnl            TEXT NOT NULL,
            resulting_lot_id        INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_closings_user_lot
            ON lot_closings (user_id, lot_id);

        CREATE TABLE IF NOT EXISTS order_chains (
            chain_id          TEXT NOT NULL,
            user_id           TEXT NOT NULL,
            account_number    TEXT NOT NULL,
            underlying        TEXT NOT NULL,
            opening_order_id  TEXT,
            strategy_type     TEXT,
            opening_date      TEXT,
            closing_date      TEXT,
            chain_status      TEXT NOT NULL,
            order_count       INTEGER NOT NULL,
            realized_pnl      TEXT NOT NULL DEFAULT '0',
            unrealized_pnl    TEXT NOT NULL DEFAULT '0',
            total_pnl         TEXT NOT NULL DEFAULT '0',
            updated_at        INTEGER DEFAULT (unixepoch()),
            PRIMARY KEY (chain_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS order_chain_cache (
            chain_id    TEXT NOT NULL,
            order_id    TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            order_data  TEXT NOT NULL,
            PRIMARY KEY (chain_id, order_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS position_groups (
            group_id         TEXT NOT NULL,
            user_id          TEXT NOT NULL,
            account_number   TEXT NOT NULL,
            underlying       TEXT NOT NULL,
            strategy_label   TEXT,
            status           TEXT NOT NULL DEFAULT 'OPEN',
            source_chain_id  TEXT,
            opening_date     TEXT,
            closing_date     TEXT,
            created_at       INTEGER DEFAULT (unixepoch()),
            updated_at       INTEGER DEFAULT (unixepoch()),
            PRIMARY KEY (group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS position_group_lots (
            group_id        TEXT NOT NULL,
            transaction_id  TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            PRIMARY KEY (group_id, transaction_id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_group_lots_user_tx
            ON position_group_lots (user_id, transaction_id);
        ",
    )?;
    Ok(())
}
