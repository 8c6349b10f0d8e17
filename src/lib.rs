//! trade-ledger: reconstructs a queryable trading history from a broker's
//! raw transaction stream — per-lot cost basis, FIFO realized P&L, derived
//! assignment/exercise stock, cross-order chains, and strategy-labelled
//! position groups.

pub mod context;
pub mod crypto;
pub mod db;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod reconcile;
pub mod store;
pub mod strategy;
