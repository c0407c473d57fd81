// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, auth, results, session, tests},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, tests, attempts, results, sessions, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let test_routes = Router::new()
        .route("/", get(tests::list_tests))
        .route("/{id}", get(tests::get_test))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let attempt_routes = Router::new()
        .route("/", post(attempt::start_attempt))
        .route("/{id}", get(attempt::get_view).delete(attempt::abandon))
        .route("/{id}/answer", post(attempt::answer))
        .route("/{id}/clear", post(attempt::clear_answer))
        .route("/{id}/mark", post(attempt::toggle_mark))
        .route("/{id}/eliminate", post(attempt::toggle_elimination))
        .route("/{id}/next", post(attempt::next))
        .route("/{id}/back", post(attempt::back))
        .route("/{id}/jump", post(attempt::jump))
        .route("/{id}/finish", post(attempt::finish_module))
        .route("/{id}/revisit", post(attempt::revisit))
        .route("/{id}/confirm", post(attempt::confirm_review))
        .route("/{id}/exit", post(attempt::record_exit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let result_routes = Router::new()
        .route("/", get(results::list_my_results))
        .route("/{id}", get(results::get_result))
        .route("/{id}/report", get(results::get_report))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let session_routes = Router::new()
        .route("/join", post(session::join_session))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .merge(
            Router::new()
                .route("/", post(session::create_session))
                .route("/{id}", get(session::get_session))
                .route("/{id}/score", post(session::start_scoring))
                .route("/{id}/progress", get(session::get_progress))
                .route("/{id}/publish", post(session::publish))
                // Double middleware protection: Auth first, then Admin check
                .layer(middleware::from_fn(admin_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let admin_routes = Router::new()
        .route("/tests", post(admin::create_test))
        .route("/questions", post(admin::create_question))
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/results", get(admin::list_results))
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/tests", test_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/results", result_routes)
        .nest("/api/sessions", session_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
