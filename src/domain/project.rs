use crate::domain::ids::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-owned project. Each project has exactly one board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Identity-provider subject of the owning user
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: String, owner_id: String) -> Self {
        Self {
            id: ProjectId::new(),
            name,
            owner_id,
            created_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}
