pub mod command;
pub mod ws;

use crate::state::AppState;
use axum::Router;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(command::routes(state.clone()))
        .merge(ws::routes(state))
}
