use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::{parse_id, repo_error, ApiJson, AppState};
use crate::database::models::{Player, Team};
use crate::database::store::Selector;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub mascot: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignPlayerRequest {
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub salary: f64,
}

/// POST /teams - upsert a team by name. Posting the same name again updates
/// the mascot in place rather than creating a second document.
pub async fn create_team(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateTeamRequest>,
) -> Result<Json<Team>, ApiError> {
    let team = state
        .teams
        .upsert_by_key("name", &body.name, json!({ "mascot": body.mascot }))
        .await
        .map_err(|e| repo_error(e, "Invalid teamId"))?;
    Ok(Json(team))
}

/// GET /teams - every team document.
pub async fn find_all_teams(State(state): State<AppState>) -> Result<Json<Vec<Team>>, ApiError> {
    let teams = state
        .teams
        .find_all()
        .await
        .map_err(|e| repo_error(e, "Invalid teamId"))?;
    Ok(Json(teams))
}

/// DELETE /teams/{id} - remove a team, returning the pre-deletion snapshot.
/// The embedded roster goes with it.
pub async fn delete_team(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Team>, ApiError> {
    let id = parse_id(&id, "Invalid teamId")?;
    let team = state
        .teams
        .delete_by_id(id)
        .await
        .map_err(|e| repo_error(e, "Invalid teamId"))?;
    Ok(Json(team))
}

/// POST /teams/{id}/players - append a player and return it with its
/// store-assigned id.
pub async fn assign_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AssignPlayerRequest>,
) -> Result<Json<Player>, ApiError> {
    let id = parse_id(&id, "Invalid teamId")?;
    if body.salary < 0.0 {
        return Err(ApiError::server("player salary must be non-negative"));
    }

    let player = Player {
        id: None,
        first_name: body.first_name,
        last_name: body.last_name,
        salary: body.salary,
    };

    let player = state
        .players
        .append(&Selector::id(id), &player)
        .await
        .map_err(|e| repo_error(e, "Invalid teamId"))?;
    Ok(Json(player))
}

/// GET /teams/{id}/players - the team's roster.
pub async fn find_all_players(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Player>>, ApiError> {
    let id = parse_id(&id, "Invalid teamId")?;
    let players = state
        .players
        .list(&Selector::id(id))
        .await
        .map_err(|e| repo_error(e, "Invalid teamId"))?;
    Ok(Json(players))
}

/// DELETE /teams/{id}/players/{pid} - pull one player and return the
/// updated team. A pid that matches nothing still succeeds with the team
/// unchanged; only an unknown team is an error.
pub async fn delete_player(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, String)>,
) -> Result<Json<Team>, ApiError> {
    let id = parse_id(&id, "Invalid teamId")?;
    let pid = parse_id(&pid, "Invalid teamId")?;

    let team = state
        .players
        .remove(&Selector::id(id), pid)
        .await
        .map_err(|e| repo_error(e, "Invalid teamId"))?;
    Ok(Json(team))
}
