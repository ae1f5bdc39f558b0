pub mod error;
pub mod handlers;
mod middleware;

pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::questions::QuestionService;

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub questions: Arc<QuestionService>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/testroutes/gettests", get(handlers::get_test))
        .route("/testroutes/updatestatus", post(handlers::update_status))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
