use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A team document. Wire field names match the legacy service; `_id` is
/// absent until the store assigns one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    pub mascot: String,
    #[serde(default)]
    pub players: Vec<Player>,
}

/// A player embedded in a team's `players` array. Identity is unique within
/// the owning team only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub salary: f64,
}
