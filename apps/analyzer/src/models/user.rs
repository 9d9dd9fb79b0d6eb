use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account that owns resume jobs. The analyzer only checks existence.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}
