use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer document owning an embedded `invoices` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(default)]
    pub invoices: Vec<Invoice>,
}

/// An invoice embedded in a customer. Dates ride as opaque strings, exactly
/// as the legacy service stored them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub subtotal: f64,
    pub tax: f64,
    #[serde(rename = "dateCreated")]
    pub date_created: String,
    #[serde(rename = "dateShipped")]
    pub date_shipped: String,
    #[serde(rename = "lineItems", default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub price: f64,
    pub quantity: f64,
}
