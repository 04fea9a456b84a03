use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::{
    models::{DemoRequest, DemoResponse, RequestContext},
    newsletter::demo,
    utils::state::AppState,
    web::error::ApiError,
};

pub async fn demo_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<DemoRequest>, JsonRejection>,
) -> Result<Json<DemoResponse>, ApiError> {
    let Json(request) = payload?;
    let response = demo::request_demo(&state, &ctx, request).await?;
    Ok(Json(response))
}
