use axum::extract::{Path, State};
use axum::response::Redirect;
use tracing::debug;

use crate::error::Result;
use crate::state::AppState;

/// Redirects to the original URL of a live link with 307.
pub async fn redirect_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Redirect> {
    let original_url = state.store().resolve(&id).await?;
    debug!(id = %id, original_url = %original_url, "redirecting");
    Ok(Redirect::temporary(&original_url))
}
