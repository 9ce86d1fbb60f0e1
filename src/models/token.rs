//! API token model

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistent API token. Each user holds at most one.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthToken {
    /// 40 lowercase hex characters
    pub key: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// `None` means the token lives until logout or password change
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| at <= Utc::now())
    }
}
