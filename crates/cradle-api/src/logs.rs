use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use cradle_core::feed::feed_snapshot;
use cradle_types::api::{Claims, CreatedResponse, LogWrite};
use cradle_types::feed::FeedItem;
use cradle_types::models::Category;

use crate::auth::AppState;
use crate::children::owned_child;
use crate::error::{ApiError, ApiResult};

/// Run `$body` with `$repo` bound to the repository for `$category`.
macro_rules! with_repository {
    ($logs:expr, $category:expr, |$repo:ident| $body:expr) => {
        match $category {
            Category::BowelMovement => {
                let $repo = &$logs.bowel_movements;
                $body
            }
            Category::Sleep => {
                let $repo = &$logs.sleep;
                $body
            }
            Category::Bottle => {
                let $repo = &$logs.bottle;
                $body
            }
            Category::Breastfeeding => {
                let $repo = &$logs.breastfeeding;
                $body
            }
            Category::SolidFood => {
                let $repo = &$logs.solid_feeding;
                $body
            }
            Category::Sickness => {
                let $repo = &$logs.sickness;
                $body
            }
        }
    };
}

fn parse_category(segment: &str) -> ApiResult<Category> {
    Category::from_collection(segment).ok_or(ApiError::NotFound("log category"))
}

fn parse_body<T: DeserializeOwned>(body: Value) -> ApiResult<T> {
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub async fn list_logs(
    State(state): State<AppState>,
    Path((child_id, category)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Response> {
    let category = parse_category(&category)?;
    owned_child(&state, &claims, &child_id).await?;

    let response = with_repository!(state.logs, category, |repo| {
        Json(repo.list(&child_id).await?).into_response()
    });
    Ok(response)
}

pub async fn add_log(
    State(state): State<AppState>,
    Path((child_id, category)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let category = parse_category(&category)?;
    owned_child(&state, &claims, &child_id).await?;

    let id = with_repository!(state.logs, category, |repo| {
        let write: LogWrite<_> = parse_body(body)?;
        repo.add(&child_id, &write.fields, write.timestamp.as_deref()).await?
    });
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn update_log(
    State(state): State<AppState>,
    Path((child_id, category, entry_id)): Path<(String, String, String)>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<Value>,
) -> ApiResult<StatusCode> {
    let category = parse_category(&category)?;
    owned_child(&state, &claims, &child_id).await?;

    with_repository!(state.logs, category, |repo| {
        let write: LogWrite<_> = parse_body(body)?;
        repo.update(&child_id, &entry_id, &write.fields, write.timestamp.as_deref()).await?
    });
    Ok(StatusCode::NO_CONTENT)
}

/// Deleting an entry that is already gone still answers 204.
pub async fn delete_log(
    State(state): State<AppState>,
    Path((child_id, category, entry_id)): Path<(String, String, String)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let category = parse_category(&category)?;
    owned_child(&state, &claims, &child_id).await?;

    with_repository!(state.logs, category, |repo| repo.delete(&child_id, &entry_id).await?);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_feed(
    State(state): State<AppState>,
    Path(child_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<FeedItem>>> {
    owned_child(&state, &claims, &child_id).await?;
    Ok(Json(feed_snapshot(&state.logs, &child_id).await?))
}
