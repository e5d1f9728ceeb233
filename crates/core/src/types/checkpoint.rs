use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable, restorable snapshot of a session's container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub session_id: String,
    /// Image the snapshot was committed to.
    pub image_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
