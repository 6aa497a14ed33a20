use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::Result;
use crate::identity::UserId;
use crate::model::UserLinkResponse;
use crate::state::AppState;

/// Lists the caller's live links, or 204 when there are none.
pub async fn list_user_links_handler(
    State(state): State<AppState>,
    user: UserId,
) -> Result<Response> {
    let links = state.store().list_for_user(user.as_str()).await?;
    if links.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<_> = links
        .into_iter()
        .map(|link| UserLinkResponse {
            short_url: state.short_url(&link.id),
            original_url: link.original_url,
        })
        .collect();

    Ok(Json(body).into_response())
}

/// Accepts the deletion of the caller's links; the work happens in the
/// background.
pub async fn delete_user_links_handler(
    State(state): State<AppState>,
    user: UserId,
    Json(ids): Json<Vec<String>>,
) -> StatusCode {
    // the handle is dropped, the task keeps running
    drop(state.store().delete_for_user(ids, user.0));
    StatusCode::ACCEPTED
}
