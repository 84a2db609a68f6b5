pub mod health;
pub mod jobs;
pub mod profiles;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /profiles                          create (POST)
/// /profiles/{id}                     get, delete
/// /profiles/{id}/samples             upload (POST, multipart), list (GET)
/// /profiles/{id}/samples/{sample_id} delete
///
/// /jobs                              submit (POST, JSON)
/// /jobs/cover                        submit cover (POST, multipart)
/// /jobs/{id}                         status snapshot
/// /jobs/{id}/artifact                resolve the finished output's download URL
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(profiles::router())
        .merge(jobs::router())
}
