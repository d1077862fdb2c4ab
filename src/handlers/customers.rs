use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::{repo_error, ApiJson, AppState};
use crate::database::models::{Customer, Invoice, LineItem};
use crate::database::store::Selector;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(rename = "userName")]
    pub user_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub subtotal: f64,
    pub tax: f64,
    #[serde(rename = "dateCreated")]
    pub date_created: String,
    #[serde(rename = "dateShipped")]
    pub date_shipped: String,
    #[serde(rename = "lineItems", default)]
    pub line_items: Vec<LineItem>,
}

/// POST /customers - plain insert; customers have no natural-key upsert.
pub async fn create_customer(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateCustomerRequest>,
) -> Result<Json<Customer>, ApiError> {
    let customer = Customer {
        id: None,
        first_name: body.first_name,
        last_name: body.last_name,
        user_name: body.user_name,
        invoices: Vec::new(),
    };

    let created = state
        .customers
        .insert(&customer)
        .await
        .map_err(|e| repo_error(e, "Invalid username: customer not found"))?;
    Ok(Json(created))
}

/// POST /customers/{username}/invoices - append an invoice to the customer
/// located by username and return the whole updated customer document.
pub async fn create_invoice(
    State(state): State<AppState>,
    Path(username): Path<String>,
    ApiJson(body): ApiJson<CreateInvoiceRequest>,
) -> Result<Json<Customer>, ApiError> {
    let invoice = Invoice {
        id: None,
        subtotal: body.subtotal,
        tax: body.tax,
        date_created: body.date_created,
        date_shipped: body.date_shipped,
        line_items: body.line_items,
    };

    let customer = state
        .invoices
        .append_returning_parent(&Selector::field("userName", username), &invoice)
        .await
        .map_err(|e| repo_error(e, "Invalid username: customer not found"))?;
    Ok(Json(customer))
}

/// GET /customers/{username}/invoices - the customer document, or JSON null
/// for an unknown username. The legacy read path performed no not-found
/// check and this one keeps that shape.
pub async fn find_invoices(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Option<Customer>>, ApiError> {
    let customer = state
        .customers
        .find_by_field("userName", &username)
        .await
        .map_err(|e| repo_error(e, "Invalid username: customer not found"))?;
    Ok(Json(customer))
}
