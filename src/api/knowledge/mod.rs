pub mod handlers;

use axum::Router;
use axum::routing::get;

use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/knowledge", get(handlers::list_docs).post(handlers::create_doc))
        .route(
            "/knowledge/{id}",
            get(handlers::get_doc)
                .put(handlers::update_doc)
                .delete(handlers::delete_doc),
        )
}
