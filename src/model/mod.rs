pub mod chain;
pub mod group;
pub mod lot;
pub mod order;
pub mod symbol;
pub mod transaction;

pub use chain::{Chain, ChainStatus, ChainSummary};
pub use group::{GroupStatus, PositionGroup};
pub use lot::{ClosingType, DerivationType, Lot, LotClosing, LotStatus};
pub use order::{Order, OrderType};
pub use symbol::{OptionDetails, OptionType};
pub use transaction::{Action, EventKind, InstrumentType, RawTransaction, Transaction};
