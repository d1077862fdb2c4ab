use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A credential record. `Password` holds the salted hash, never the raw
/// password; the capitalized wire name is inherited from the legacy
/// schema and kept for compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "emailAddress", default)]
    pub email_address: Vec<String>,
}

/// The legacy schema declared `emailAddress` as an untyped array and
/// clients send either a single address or a list; both normalize to a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(address) => vec![address],
            OneOrMany::Many(addresses) => addresses,
        }
    }
}
