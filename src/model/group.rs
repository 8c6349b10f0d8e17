use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    Open,
    Closed,
    Assigned,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Open => "OPEN",
            GroupStatus::Closed => "CLOSED",
            GroupStatus::Assigned => "ASSIGNED",
        }
    }
}

impl std::str::FromStr for GroupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(GroupStatus::Open),
            "CLOSED" => Ok(GroupStatus::Closed),
            "ASSIGNED" => Ok(GroupStatus::Assigned),
            other => Err(format!("unknown group status `{other}`")),
        }
    }
}

/// The user-facing unit of the ledger view.
///
/// Seeded from chains, then owned by the user: strategy labels and lot
/// membership survive reprocessing, and only stale source-chain references
/// are corrected by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionGroup {
    pub group_id: String,
    pub account_number: String,
    pub underlying: String,
    pub strategy_label: Option<String>,
    pub status: GroupStatus,
    pub source_chain_id: Option<String>,
    pub opening_date: Option<DateTime<Utc>>,
    pub closing_date: Option<DateTime<Utc>>,
}

/// Label used for the per-`(account, underlying)` bucket that collects lots
/// with no chain.
pub const UNGROUPED_LABEL: &str = "Ungrouped";
