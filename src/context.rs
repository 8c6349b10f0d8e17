use anyhow::Result;
use rusqlite::Connection;

/// User id used when multi-tenant auth is disabled (single-user deployments).
pub const DEFAULT_USER_ID: &str = "default";

/// Tenant context threaded explicitly through every pipeline and store call.
///
/// Every row the pipeline writes carries this user id, and every read
/// filters by it. There is no implicit thread-local fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ctx {
    pub user_id: String,
}

impl Ctx {
    pub fn new(user_id: impl Into<String>) -> Self {
        Ctx {
            user_id: user_id.into(),
        }
    }

    /// Context for single-user deployments.
    pub fn single_user() -> Self {
        Ctx::new(DEFAULT_USER_ID)
    }

    /// Make sure the tenant row exists before the pipeline writes under it.
    pub fn ensure_user(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO users (id) VALUES (?1)",
            [&self.user_id],
        )?;
        Ok(())
    }
}
