use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::{
    models::{RequestContext, SubscribeRequest, SubscribeResponse, UnsubscribeRequest, UnsubscribeResponse},
    newsletter::{
        campaign::{self, CampaignReport, SendRequest},
        subscription,
    },
    utils::state::AppState,
    web::error::ApiError,
};

pub async fn subscribe(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let Json(request) = payload?;
    let response = subscription::subscribe(&state, &ctx, request).await?;
    Ok(Json(response))
}

pub async fn unsubscribe_link(
    State(state): State<AppState>,
    ctx: RequestContext,
    query: Result<Query<UnsubscribeRequest>, QueryRejection>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    let Query(request) = query?;
    let response = subscription::unsubscribe(&state, &ctx, request).await?;
    Ok(Json(response))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<UnsubscribeRequest>, JsonRejection>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    let Json(request) = payload?;
    let response = subscription::unsubscribe(&state, &ctx, request).await?;
    Ok(Json(response))
}

pub async fn send_newsletter(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<CampaignReport>, ApiError> {
    let Json(request) = payload?;
    tracing::info!(
        request_id = %ctx.request_id,
        mode = request.mode.as_deref().unwrap_or_default(),
        "newsletter send requested"
    );
    let report = campaign::dispatch(&state, request).await?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

pub async fn template_preview(
    State(state): State<AppState>,
    query: Result<Query<PreviewQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let rendered = campaign::preview(&state, query.email.as_deref());

    let format = query.format.as_deref().map(str::trim).unwrap_or("json");
    match format.to_ascii_lowercase().as_str() {
        "json" | "" => Ok(Json(rendered).into_response()),
        "html" => Ok((
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            rendered.html,
        )
            .into_response()),
        "text" => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            rendered.text,
        )
            .into_response()),
        other => Err(ApiError::Validation(format!(
            "Unsupported format \"{other}\"; use json, html or text."
        ))),
    }
}
