//! Resource routes, mounted by [`crate::server::build_router`].

pub mod application;
pub mod phone_number;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub fn application_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/application",
            get(application::list_applications)
                .post(application::create_application),
        )
        .route(
            "/application/{id}",
            get(application::read_application)
                .post(application::revise_application),
        )
}

pub fn phone_number_routes() -> Router<AppState> {
    Router::new()
        .route("/phone-number/validate", post(phone_number::validate))
        .route("/phone-number/confirm", post(phone_number::confirm))
}
