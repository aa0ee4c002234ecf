use std::sync::Arc;

use axum::{
    Json, extract,
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{TimeZone, Utc};

use crate::{
    error::AppError,
    models::{
        CreatePostPayload, DeletePostQuery, Direction, ListQuery, PostId, RankedPost,
        VoteCountQuery, VotePayload,
    },
    state::State,
    utils::{parse_ids, user_from_headers},
};

type Shared = extract::State<Arc<State>>;

pub async fn health_handler() -> &'static str {
    "OK"
}

pub async fn create_post_handler(
    extract::State(state): Shared,
    headers: HeaderMap,
    payload: Result<Json<CreatePostPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let author_id = user_from_headers(&headers)?;
    let Json(payload) = payload.map_err(|_| AppError::MalformedPayload)?;

    let created_at = match payload.created_at {
        Some(secs) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or(AppError::MalformedPayload)?,
        None => Utc::now(),
    };

    state
        .engine
        .create_post(payload.post_id, payload.community_id, created_at, author_id)
        .await?;

    Ok(StatusCode::CREATED)
}

pub async fn delete_post_handler(
    extract::State(state): Shared,
    headers: HeaderMap,
    extract::Path(post_id): extract::Path<PostId>,
    query: Result<extract::Query<DeletePostQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    user_from_headers(&headers)?;
    let extract::Query(query) = query.map_err(|_| AppError::MalformedPayload)?;

    state.engine.delete_post(post_id, query.community_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn vote_handler(
    extract::State(state): Shared,
    headers: HeaderMap,
    payload: Result<Json<VotePayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user_from_headers(&headers)?;
    let Json(payload) = payload.map_err(|_| AppError::MalformedPayload)?;
    let direction = Direction::try_from(payload.direction)?;

    state.engine.vote(user_id, payload.post_id, direction).await?;

    Ok(StatusCode::OK)
}

pub async fn list_handler(
    extract::State(state): Shared,
    query: Result<extract::Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<RankedPost>>, AppError> {
    let extract::Query(query) = query.map_err(|_| AppError::MalformedPayload)?;

    let ids = state
        .engine
        .list(query.community_id, query.order, query.page, query.size)
        .await?;

    let votes = if ids.is_empty() {
        Vec::new()
    } else {
        state.engine.vote_counts(&ids).await?
    };

    Ok(Json(
        ids.into_iter()
            .zip(votes)
            .map(|(id, votes)| RankedPost { id, votes })
            .collect(),
    ))
}

pub async fn vote_counts_handler(
    extract::State(state): Shared,
    query: Result<extract::Query<VoteCountQuery>, QueryRejection>,
) -> Result<Json<Vec<u64>>, AppError> {
    let extract::Query(query) = query.map_err(|_| AppError::MalformedPayload)?;
    let ids = parse_ids(&query.ids)?;

    Ok(Json(state.engine.vote_counts(&ids).await?))
}
