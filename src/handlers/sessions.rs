use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{repo_error, ApiJson, AppState};
use crate::database::models::user::OneOrMany;
use crate::database::models::User;
use crate::error::ApiError;
use crate::services::AccountError;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "emailAddress", default)]
    pub email_address: Option<OneOrMany>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "Password")]
    pub password: String,
}

fn account_error(err: AccountError) -> ApiError {
    match err {
        AccountError::UsernameTaken => ApiError::invalid_key("Username is already in use"),
        AccountError::InvalidCredentials => ApiError::invalid_key("Invalid password"),
        AccountError::Password(e) => ApiError::server(e),
        AccountError::Repository(e) => repo_error(e, "Invalid password"),
    }
}

/// POST /signup - create a credential record. The stored record carries the
/// hash in the `Password` field, never the raw password.
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignupRequest>,
) -> Result<Json<User>, ApiError> {
    let email_address = body.email_address.map(Vec::from).unwrap_or_default();

    let user = state
        .accounts
        .signup(&body.user_name, &body.password, email_address)
        .await
        .map_err(account_error)?;
    Ok(Json(user))
}

/// POST /login - one-shot password verification. Unknown username and wrong
/// password produce byte-identical failures.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .accounts
        .login(&body.user_name, &body.password)
        .await
        .map_err(account_error)?;
    Ok(Json(json!({ "message": "Login password is valid" })))
}
