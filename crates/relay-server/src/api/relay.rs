use crate::error::{AppError, Result};
use crate::relay::StopReply;
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use relay_protocol::{ApiResponse, SessionList, StartQuery, StopQuery};

fn required(url: Option<String>) -> Result<String> {
    url.filter(|url| !url.trim().is_empty()).ok_or(AppError::MissingUrl)
}

pub async fn start_stream(
    State(state): State<AppState>,
    query: std::result::Result<Query<StartQuery>, QueryRejection>,
) -> Result<Json<ApiResponse>> {
    let Query(query) = query?;
    let auto_replay = query.auto_replay();
    let sink_hint = query.output.filter(|output| !output.trim().is_empty());
    let source_url = required(query.url)?;

    tracing::info!(source = %source_url, auto_replay, "Start requested");
    let reply = state
        .relay
        .start_session(&source_url, auto_replay, sink_hint)
        .await;

    let body = match reply.sink_url() {
        Some(sink_url) => ApiResponse::ok(reply.message(), sink_url.to_string()),
        None => ApiResponse::failed(reply.message()),
    };
    Ok(Json(body))
}

pub async fn stop_stream(
    State(state): State<AppState>,
    query: std::result::Result<Query<StopQuery>, QueryRejection>,
) -> Result<Json<ApiResponse>> {
    let Query(query) = query?;
    let source_url = required(query.url)?;

    tracing::info!(source = %source_url, "Stop requested");
    let body = match state.relay.stop_session(&source_url).await {
        StopReply::Stopped(session) => ApiResponse::ok("successful", session.sink_url),
        StopReply::ReplayCancelled => ApiResponse::with_status(relay_protocol::STATUS_OK, "successful"),
        StopReply::NotFound => ApiResponse::failed("transform not exists"),
    };
    Ok(Json(body))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionList> {
    let sessions = state.relay.sessions().await;
    Json(SessionList::ok("successful", sessions))
}
