use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use rusqlite::Connection;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::query::{self, CoachFilter, LeaderFilter, PlayerFilter, RankingFilter, TeamFilter};
use crate::regenerate::{self, RegenerateRequest, StatsType};

const RECENT_RUNS_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub db_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path: Arc::new(db_path),
        }
    }
}

pub struct StatsServer {
    state: AppState,
}

impl StatsServer {
    pub fn new(state: AppState) -> Self {
        StatsServer { state }
    }

    pub async fn run(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let app = routes().with_state(self.state.clone());

        let listener = TcpListener::bind(addr).await.map_err(|err| {
            error!("Failed to bind to address {}: {}", addr, err);
            err
        })?;

        info!("listen at: http://{addr}");

        axum::serve(listener, app).await?;
        Ok(())
    }
}

pub fn routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/api/admin/stats/regenerate", post(regenerate_action))
        .route("/api/admin/stats/runs", get(runs_action))
        .route("/api/seasons", get(seasons_action))
        .route("/api/players", get(players_list_action))
        .route("/api/players/{id}", get(player_get_action))
        .route("/api/coaches", get(coaches_list_action))
        .route("/api/coaches/{id}", get(coach_get_action))
        .route("/api/teams", get(teams_list_action))
        .route("/api/teams/{id}", get(team_get_action))
        .route("/api/rankings", get(rankings_action))
        .route("/api/rankings/players", get(player_leaders_action))
        .route("/api/h2h", get(h2h_action))
        .layer(CatchPanicLayer::custom(|_err| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal server error - handler panicked" })),
            )
                .into_response()
        }))
}

/// Runs blocking sqlite work off the async runtime on a fresh connection.
async fn with_db<T, F>(state: &AppState, work: F) -> ApiResult<T>
where
    F: FnOnce(&mut Connection) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let path = Arc::clone(&state.db_path);
    tokio::task::spawn_blocking(move || {
        let mut conn =
            db::open_db(&path).map_err(|err| ApiError::internal("Database unavailable", &err))?;
        work(&mut conn)
    })
    .await?
}

fn query_params<T>(extracted: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    extracted
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn path_id(extracted: Result<Path<i64>, PathRejection>) -> ApiResult<i64> {
    extracted
        .map(|Path(id)| id)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegenerateBody {
    pub season_id: Option<i64>,
    pub stats_type: Option<String>,
}

/// An empty body is a full run; anything else must be a JSON object.
fn parse_optional_body<T: DeserializeOwned + Default>(raw: &[u8]) -> ApiResult<T> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(raw)
        .map_err(|err| ApiError::BadRequest(format!("invalid request body: {err}")))
}

async fn regenerate_action(
    State(state): State<AppState>,
    raw: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body: RegenerateBody = parse_optional_body(&raw)?;
    let stats_type = match body.stats_type.as_deref() {
        Some(raw) => raw
            .parse::<StatsType>()
            .map_err(|err| ApiError::BadRequest(err.to_string()))?,
        None => StatsType::All,
    };
    let req = RegenerateRequest {
        season_id: body.season_id,
        stats_type,
    };

    let summary = with_db(&state, move |conn| {
        regenerate::regenerate(conn, req).map_err(|err| {
            warn!("regeneration request failed: {err:#}");
            ApiError::internal("Failed to regenerate statistics", &err)
        })
    })
    .await?;

    Ok(Json(summary))
}

async fn runs_action(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let runs = with_db(&state, |conn| {
        regenerate::recent_runs(conn, RECENT_RUNS_LIMIT)
            .map_err(|err| ApiError::internal("Failed to load regeneration runs", &err))
    })
    .await?;
    Ok(Json(runs))
}

async fn seasons_action(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let seasons = with_db(&state, |conn| {
        query::list_seasons(conn).map_err(|err| ApiError::internal("Failed to load seasons", &err))
    })
    .await?;
    Ok(Json(seasons))
}

async fn players_list_action(
    State(state): State<AppState>,
    filter: Result<Query<PlayerFilter>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let filter = query_params(filter)?;
    let page = with_db(&state, move |conn| {
        query::list_players(conn, &filter)
            .map_err(|err| ApiError::from_query("Failed to load players", err))
    })
    .await?;
    Ok(Json(page))
}

async fn player_get_action(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = path_id(id)?;
    let player = with_db(&state, move |conn| {
        query::get_player(conn, id)
            .map_err(|err| ApiError::from_query("Failed to load player", err))?
            .ok_or_else(|| ApiError::NotFound(format!("Player with id {id} not found")))
    })
    .await?;
    Ok(Json(player))
}

async fn coaches_list_action(
    State(state): State<AppState>,
    filter: Result<Query<CoachFilter>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let filter = query_params(filter)?;
    let page = with_db(&state, move |conn| {
        query::list_coaches(conn, &filter)
            .map_err(|err| ApiError::from_query("Failed to load coaches", err))
    })
    .await?;
    Ok(Json(page))
}

async fn coach_get_action(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = path_id(id)?;
    let coach = with_db(&state, move |conn| {
        query::get_coach(conn, id)
            .map_err(|err| ApiError::from_query("Failed to load coach", err))?
            .ok_or_else(|| ApiError::NotFound(format!("Coach with id {id} not found")))
    })
    .await?;
    Ok(Json(coach))
}

async fn teams_list_action(
    State(state): State<AppState>,
    filter: Result<Query<TeamFilter>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let filter = query_params(filter)?;
    let page = with_db(&state, move |conn| {
        query::list_teams(conn, &filter)
            .map_err(|err| ApiError::from_query("Failed to load teams", err))
    })
    .await?;
    Ok(Json(page))
}

async fn team_get_action(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = path_id(id)?;
    let team = with_db(&state, move |conn| {
        query::get_team(conn, id)
            .map_err(|err| ApiError::from_query("Failed to load team", err))?
            .ok_or_else(|| ApiError::NotFound(format!("Team with id {id} not found")))
    })
    .await?;
    Ok(Json(team))
}

async fn rankings_action(
    State(state): State<AppState>,
    filter: Result<Query<RankingFilter>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let filter = query_params(filter)?;
    let page = with_db(&state, move |conn| {
        query::list_rankings(conn, &filter)
            .map_err(|err| ApiError::from_query("Failed to load rankings", err))
    })
    .await?;
    Ok(Json(page))
}

async fn player_leaders_action(
    State(state): State<AppState>,
    filter: Result<Query<LeaderFilter>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let filter = query_params(filter)?;
    let page = with_db(&state, move |conn| {
        query::list_player_leaders(conn, &filter)
            .map_err(|err| ApiError::from_query("Failed to load player rankings", err))
    })
    .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct H2hParams {
    pub team_a: i64,
    pub team_b: i64,
}

async fn h2h_action(
    State(state): State<AppState>,
    params: Result<Query<H2hParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let params = query_params(params)?;
    let view = with_db(&state, move |conn| {
        query::get_h2h(conn, params.team_a, params.team_b)
            .map_err(|err| ApiError::from_query("Failed to load head-to-head", err))?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "No head-to-head record for teams {} and {}",
                    params.team_a, params.team_b
                ))
            })
    })
    .await?;
    Ok(Json(view))
}
