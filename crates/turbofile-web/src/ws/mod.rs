pub mod transfer;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/transfer", get(transfer::transfer_handler))
}
