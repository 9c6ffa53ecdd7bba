use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod guards;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod reset;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::user_routes())
}
