use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::Json;
use burrow_storage::StorageError;
use tracing::info;

use crate::error::{AppError, Result};
use crate::identity::UserId;
use crate::model::{BatchItemRequest, BatchItemResponse, ShortenRequest, ShortenResponse};
use crate::state::AppState;

/// Outcome of shortening one URL: the short URL, and whether it was created
/// now or already existed.
struct Shortened {
    short_url: String,
    created: bool,
}

impl Shortened {
    fn status(&self) -> StatusCode {
        if self.created {
            StatusCode::CREATED
        } else {
            StatusCode::CONFLICT
        }
    }
}

/// Trims `raw` and checks that it can be sent back as a redirect target.
fn redirect_target(raw: &str) -> Result<&str> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(AppError::BadRequest("url must not be empty".to_string()));
    }
    if HeaderValue::from_str(url).is_err() {
        return Err(AppError::BadRequest(format!(
            "url {url:?} cannot be used as a redirect target"
        )));
    }
    Ok(url)
}

async fn shorten(state: &AppState, user: &UserId, original_url: &str) -> Result<Shortened> {
    let original_url = redirect_target(original_url)?;

    let id = state.next_id();
    match state.store().create(id.as_str(), original_url, user.as_str()).await {
        Ok(()) => {
            info!(id = %id, original_url = %original_url, user_id = %user.as_str(), "link created");
            Ok(Shortened {
                short_url: state.short_url(&id),
                created: true,
            })
        }
        Err(StorageError::DuplicateUrl { existing_id, .. }) => Ok(Shortened {
            short_url: state.short_url(&existing_id),
            created: false,
        }),
        Err(err) => Err(err.into()),
    }
}

/// Shortens the URL sent as a plain text body.
pub async fn shorten_text_handler(
    State(state): State<AppState>,
    user: UserId,
    body: String,
) -> Result<(StatusCode, String)> {
    let shortened = shorten(&state, &user, &body).await?;
    Ok((shortened.status(), shortened.short_url))
}

pub async fn shorten_json_handler(
    State(state): State<AppState>,
    user: UserId,
    Json(request): Json<ShortenRequest>,
) -> Result<(StatusCode, Json<ShortenResponse>)> {
    let shortened = shorten(&state, &user, &request.url).await?;
    Ok((
        shortened.status(),
        Json(ShortenResponse {
            result: shortened.short_url,
        }),
    ))
}

/// Shortens several URLs at once, echoing each item's correlation id.
pub async fn shorten_batch_handler(
    State(state): State<AppState>,
    user: UserId,
    Json(items): Json<Vec<BatchItemRequest>>,
) -> Result<(StatusCode, Json<Vec<BatchItemResponse>>)> {
    if items.is_empty() {
        return Err(AppError::BadRequest("batch must not be empty".to_string()));
    }

    let mut links = Vec::with_capacity(items.len());
    let mut responses = Vec::with_capacity(items.len());
    for item in items {
        let original_url = redirect_target(&item.original_url)?;

        let id = state.next_id();
        responses.push(BatchItemResponse {
            correlation_id: item.correlation_id,
            short_url: state.short_url(&id),
        });
        links.push((id, original_url.to_owned()));
    }

    state.store().create_batch(links, user.as_str()).await?;
    info!(user_id = %user.as_str(), links = responses.len(), "batch created");

    Ok((StatusCode::CREATED, Json(responses)))
}
