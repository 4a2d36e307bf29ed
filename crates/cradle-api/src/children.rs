use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use cradle_types::api::{Claims, CreatedResponse};
use cradle_types::models::{Child, ChildProfile};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

pub async fn create_child(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(profile): Json<ChildProfile>,
) -> ApiResult<impl IntoResponse> {
    if profile.name.trim().is_empty() {
        return Err(ApiError::BadRequest("child name is required".into()));
    }

    let id = state.children.create(&claims.sub.to_string(), &profile).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn list_children(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Child>>> {
    let children = state.children.list_for_owner(&claims.sub.to_string()).await?;
    Ok(Json(children))
}

/// Look up a child and make sure the caller owns it. Someone else's child
/// is reported as missing.
pub async fn owned_child(state: &AppState, claims: &Claims, child_id: &str) -> ApiResult<Child> {
    match state.children.get(child_id).await? {
        Some(child) if child.user_id == claims.sub.to_string() => Ok(child),
        _ => Err(ApiError::NotFound("child")),
    }
}
