use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::database::embedded::EmbeddedDocuments;
use crate::database::models::{Customer, Invoice, Player, Team};
use crate::database::repository::{ParentRepository, RepositoryError};
use crate::database::store::DocumentStore;
use crate::error::ApiError;
use crate::services::AccountService;

pub mod customers;
pub mod sessions;
pub mod teams;

/// Everything a request handler needs, built once at startup around the
/// injected store handle. No module-level store state exists.
#[derive(Clone)]
pub struct AppState {
    pub teams: ParentRepository<Team>,
    pub players: EmbeddedDocuments<Team, Player>,
    pub customers: ParentRepository<Customer>,
    pub invoices: EmbeddedDocuments<Customer, Invoice>,
    pub accounts: AccountService,
    pub store: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            teams: ParentRepository::new(store.clone(), "teams"),
            players: EmbeddedDocuments::new(store.clone(), "teams", "players"),
            customers: ParentRepository::new(store.clone(), "customers"),
            invoices: EmbeddedDocuments::new(store.clone(), "customers", "invoices"),
            accounts: AccountService::new(store.clone()),
            store,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let config = crate::config::config();

    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/teams", post(teams::create_team).get(teams::find_all_teams))
        .route("/teams/:id", delete(teams::delete_team))
        .route(
            "/teams/:id/players",
            post(teams::assign_player).get(teams::find_all_players),
        )
        .route("/teams/:id/players/:pid", delete(teams::delete_player))
        .route("/customers", post(customers::create_customer))
        .route(
            "/customers/:username/invoices",
            post(customers::create_invoice).get(customers::find_invoices),
        )
        .route("/signup", post(sessions::signup))
        .route("/login", post(sessions::login))
        .with_state(state);

    // Global middleware
    if config.api.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

/// JSON body extractor matching the inherited error taxonomy: anything wrong
/// with the body (unreadable JSON, fields that don't decode) is a failure
/// outside the store call and surfaces as 500, not 400.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::server(rejection.body_text()))?;
        let parsed = serde_json::from_value(value).map_err(ApiError::server)?;
        Ok(ApiJson(parsed))
    }
}

/// Translate a repository verdict to the wire, with the route's own 401
/// message for the not-found case.
pub(crate) fn repo_error(err: RepositoryError, invalid_key_message: &str) -> ApiError {
    match err {
        RepositoryError::InvalidKey => ApiError::invalid_key(invalid_key_message),
        RepositoryError::Store(e) => e.into(),
        RepositoryError::Shape(e) => ApiError::server(e),
    }
}

/// Path ids are opaque strings on the wire; one that does not parse can
/// never match a document, so it gets the same 401 as a miss.
pub(crate) fn parse_id(raw: &str, invalid_key_message: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::invalid_key(invalid_key_message))
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "name": "Roster API",
        "version": version,
        "description": "Document-oriented REST API for team rosters, customer invoices, and account signup/login",
        "endpoints": {
            "teams": "POST /teams, GET /teams, DELETE /teams/:id",
            "players": "POST /teams/:id/players, GET /teams/:id/players, DELETE /teams/:id/players/:pid",
            "customers": "POST /customers",
            "invoices": "POST /customers/:username/invoices, GET /customers/:username/invoices",
            "accounts": "POST /signup, POST /login",
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "store": "ok"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "timestamp": now,
                "store_error": e.to_string()
            })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_state;
    use axum::body::Body;
    use axum::http::{Method, Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = HttpRequest::builder().method(method).uri(uri);
        let request = match body {
            Some(value) => builder
                .header("content-type", "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_team(app: &Router, name: &str, mascot: &str) -> Value {
        let (status, body) = send(
            app,
            Method::POST,
            "/teams",
            Some(json!({"name": name, "mascot": mascot})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    #[tokio::test]
    async fn repeated_team_posts_update_in_place() {
        let (state, _) = memory_state();
        let app = app(state);

        let first = create_team(&app, "Aces", "Falcon").await;
        let second = create_team(&app, "Aces", "Owl").await;
        assert_eq!(first.get("_id"), second.get("_id"));
        assert_eq!(second.get("mascot").unwrap(), &json!("Owl"));

        let (status, teams) = send(&app, Method::GET, "/teams", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(teams.as_array().unwrap().len(), 1);
        assert_eq!(teams[0].get("mascot").unwrap(), &json!("Owl"));
    }

    #[tokio::test]
    async fn delete_team_returns_the_snapshot_then_401() {
        let (state, _) = memory_state();
        let app = app(state);

        let team = create_team(&app, "Aces", "Falcon").await;
        let id = team.get("_id").and_then(Value::as_str).unwrap().to_string();

        let (status, body) = send(&app, Method::DELETE, &format!("/teams/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("name").unwrap(), &json!("Aces"));

        let (status, body) = send(&app, Method::DELETE, &format!("/teams/{id}"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "Invalid teamId"}));

        let (status, _) = send(&app, Method::DELETE, "/teams/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn assigned_player_shows_up_in_the_roster() {
        let (state, _) = memory_state();
        let app = app(state);

        let team = create_team(&app, "Aces", "Falcon").await;
        let id = team.get("_id").and_then(Value::as_str).unwrap().to_string();

        let (status, player) = send(
            &app,
            Method::POST,
            &format!("/teams/{id}/players"),
            Some(json!({"firstName": "Ada", "lastName": "Lovelace", "salary": 100.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(player.get("firstName").unwrap(), &json!("Ada"));
        assert!(player.get("_id").is_some());

        let (status, roster) =
            send(&app, Method::GET, &format!("/teams/{id}/players"), None).await;
        assert_eq!(status, StatusCode::OK);
        let roster = roster.as_array().unwrap();
        assert!(roster.iter().any(|p| {
            p.get("firstName") == Some(&json!("Ada")) && p.get("lastName") == Some(&json!("Lovelace"))
        }));
    }

    #[tokio::test]
    async fn identical_players_collapse_to_one_entry() {
        let (state, _) = memory_state();
        let app = app(state);

        let team = create_team(&app, "Aces", "Falcon").await;
        let id = team.get("_id").and_then(Value::as_str).unwrap().to_string();
        let body = json!({"firstName": "Ada", "lastName": "Lovelace", "salary": 100.0});

        for _ in 0..2 {
            let (status, _) = send(
                &app,
                Method::POST,
                &format!("/teams/{id}/players"),
                Some(body.clone()),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, roster) = send(&app, Method::GET, &format!("/teams/{id}/players"), None).await;
        assert_eq!(roster.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn player_routes_reject_unknown_teams() {
        let (state, _) = memory_state();
        let app = app(state);
        let missing = Uuid::new_v4();

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/teams/{missing}/players"),
            Some(json!({"firstName": "Ada", "lastName": "Lovelace", "salary": 100.0})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "Invalid teamId"}));

        let (status, _) =
            send(&app, Method::GET, &format!("/teams/{missing}/players"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn deleting_an_absent_player_is_a_silent_no_op() {
        let (state, _) = memory_state();
        let app = app(state);

        let team = create_team(&app, "Aces", "Falcon").await;
        let id = team.get("_id").and_then(Value::as_str).unwrap().to_string();
        send(
            &app,
            Method::POST,
            &format!("/teams/{id}/players"),
            Some(json!({"firstName": "Ada", "lastName": "Lovelace", "salary": 100.0})),
        )
        .await;

        // Unknown player id: 200 with the team unchanged.
        let ghost = Uuid::new_v4();
        let (status, team_doc) = send(
            &app,
            Method::DELETE,
            &format!("/teams/{id}/players/{ghost}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(team_doc.get("players").unwrap().as_array().unwrap().len(), 1);

        // Unknown team id: 401.
        let missing = Uuid::new_v4();
        let (status, body) = send(
            &app,
            Method::DELETE,
            &format!("/teams/{missing}/players/{ghost}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "Invalid teamId"}));
    }

    #[tokio::test]
    async fn removed_player_leaves_the_rest_of_the_roster() {
        let (state, _) = memory_state();
        let app = app(state);

        let team = create_team(&app, "Aces", "Falcon").await;
        let id = team.get("_id").and_then(Value::as_str).unwrap().to_string();

        let (_, ada) = send(
            &app,
            Method::POST,
            &format!("/teams/{id}/players"),
            Some(json!({"firstName": "Ada", "lastName": "Lovelace", "salary": 100.0})),
        )
        .await;
        send(
            &app,
            Method::POST,
            &format!("/teams/{id}/players"),
            Some(json!({"firstName": "Grace", "lastName": "Hopper", "salary": 200.0})),
        )
        .await;

        let pid = ada.get("_id").and_then(Value::as_str).unwrap();
        let (status, team_doc) = send(
            &app,
            Method::DELETE,
            &format!("/teams/{id}/players/{pid}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let players = team_doc.get("players").unwrap().as_array().unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].get("firstName").unwrap(), &json!("Grace"));
    }

    #[tokio::test]
    async fn negative_salary_is_a_server_exception() {
        let (state, _) = memory_state();
        let app = app(state);

        let team = create_team(&app, "Aces", "Falcon").await;
        let id = team.get("_id").and_then(Value::as_str).unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/teams/{id}/players"),
            Some(json!({"firstName": "Ada", "lastName": "Lovelace", "salary": -1.0})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body
            .get("message")
            .and_then(Value::as_str)
            .unwrap()
            .starts_with("Server Exception: "));
    }

    #[tokio::test]
    async fn malformed_bodies_map_to_500() {
        let (state, _) = memory_state();
        let app = app(state);

        // Missing required field.
        let (status, body) =
            send(&app, Method::POST, "/teams", Some(json!({"name": "Aces"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body
            .get("message")
            .and_then(Value::as_str)
            .unwrap()
            .starts_with("Server Exception: "));
    }

    #[tokio::test]
    async fn store_failures_map_to_501_with_the_message_embedded() {
        let (state, store) = memory_state();
        let app = app(state);
        store.fail_with("connection reset").await;

        let (status, body) = send(&app, Method::GET, "/teams", None).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        let message = body.get("message").and_then(Value::as_str).unwrap();
        assert!(message.starts_with("Database Exception: "));
        assert!(message.contains("connection reset"));
    }

    #[tokio::test]
    async fn invoice_example_from_the_contract() {
        let (state, _) = memory_state();
        let app = app(state);

        let (status, _) = send(
            &app,
            Method::POST,
            "/customers",
            Some(json!({"firstName": "Alice", "lastName": "Smith", "userName": "alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, customer) = send(
            &app,
            Method::POST,
            "/customers/alice/invoices",
            Some(json!({
                "subtotal": 100.0,
                "tax": 8.0,
                "dateCreated": "2022-01-01",
                "dateShipped": "2022-01-02",
                "lineItems": [{"name": "Widget", "price": 10.0, "quantity": 10.0}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let invoices = customer.get("invoices").unwrap().as_array().unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].get("lineItems").unwrap().as_array().unwrap().len(), 1);

        let (status, fetched) =
            send(&app, Method::GET, "/customers/alice/invoices", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched.get("invoices").unwrap().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invoice_for_unknown_customer_is_401() {
        let (state, _) = memory_state();
        let app = app(state);

        let (status, body) = send(
            &app,
            Method::POST,
            "/customers/nobody/invoices",
            Some(json!({
                "subtotal": 1.0,
                "tax": 0.0,
                "dateCreated": "2022-01-01",
                "dateShipped": "2022-01-02",
                "lineItems": []
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "Invalid username: customer not found"}));
    }

    #[tokio::test]
    async fn invoice_read_for_unknown_customer_is_200_null() {
        let (state, _) = memory_state();
        let app = app(state);

        let (status, body) = send(&app, Method::GET, "/customers/nobody/invoices", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn duplicate_signup_is_401_and_leaves_one_record() {
        let (state, store) = memory_state();
        let app = app(state);
        let body = json!({"userName": "drachwalik", "Password": "s3cret", "emailAddress": "d@example.com"});

        let (status, user) = send(&app, Method::POST, "/signup", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user.get("emailAddress").unwrap(), &json!(["d@example.com"]));
        assert_ne!(user.get("Password").unwrap(), &json!("s3cret"));

        let (status, error) = send(&app, Method::POST, "/signup", Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error, json!({"message": "Username is already in use"}));
        assert_eq!(store.count("users").await, 1);
    }

    #[tokio::test]
    async fn login_failures_share_one_shape() {
        let (state, _) = memory_state();
        let app = app(state);
        send(
            &app,
            Method::POST,
            "/signup",
            Some(json!({"userName": "drachwalik", "Password": "s3cret"})),
        )
        .await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/login",
            Some(json!({"userName": "drachwalik", "Password": "s3cret"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Login password is valid"}));

        let (wrong_status, wrong_body) = send(
            &app,
            Method::POST,
            "/login",
            Some(json!({"userName": "drachwalik", "Password": "nope"})),
        )
        .await;
        let (unknown_status, unknown_body) = send(
            &app,
            Method::POST,
            "/login",
            Some(json!({"userName": "nobody", "Password": "nope"})),
        )
        .await;
        assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_body, unknown_body);
        assert_eq!(wrong_body, json!({"message": "Invalid password"}));
    }

    #[tokio::test]
    async fn banner_and_health_respond() {
        let (state, store) = memory_state();
        let app = app(state);

        let (status, banner) = send(&app, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(banner.get("endpoints").is_some());

        let (status, _) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);

        store.fail_with("store down").await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.get("status").unwrap(), &json!("degraded"));
    }
}
