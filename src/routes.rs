// src/routes.rs

use std::sync::Arc;

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, course, manage, profile, quiz},
    state::AppState,
    utils::jwt::{auth_middleware, staff_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, courses, quizzes, profile, manage).
/// * Applies global middleware (Trace, CORS) and rate limiting on auth.
/// * Injects global state (Database Pool + Config).
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

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(5)
        .burst_size(20)
        .finish()
        .unwrap();

    let governor_conf = Arc::new(governor_conf);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(GovernorLayer::new(governor_conf));

    let course_routes = Router::new()
        .route("/", get(course::list_courses))
        .route("/{id}", get(course::get_course))
        // Protected course routes
        .merge(
            Router::new()
                .route("/{id}/enroll", post(course::enroll))
                .route("/{id}/progress", get(course::course_progress))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let quiz_routes = Router::new()
        .route(
            "/{quiz_id}/attempt",
            post(quiz::start_attempt)
                .put(quiz::submit_attempt)
                .get(quiz::get_attempts),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let profile_routes = Router::new()
        .route("/me", get(profile::get_me))
        .route("/enrollments", get(profile::list_my_enrollments))
        .route("/certificates", get(profile::list_my_certificates))
        .route("/badges", get(profile::list_my_badges))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let manage_routes = Router::new()
        .route("/users", get(manage::list_users))
        .route("/courses", post(manage::create_course))
        .route("/courses/{id}/publish", put(manage::publish_course))
        .route("/courses/{id}/lessons", post(manage::create_lesson))
        .route("/lessons/{id}/publish", put(manage::publish_lesson))
        .route("/lessons/{id}/quiz", post(manage::create_quiz))
        .route("/quizzes/{id}/questions", post(manage::create_question))
        .route(
            "/questions/{id}",
            put(manage::update_question).delete(manage::delete_question),
        )
        .route("/badges", post(manage::create_badge))
        .route("/attempts/{id}/grade", put(manage::grade_attempt))
        // Double middleware protection: Auth first, then staff check
        .layer(middleware::from_fn(staff_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/profile", profile_routes)
        .nest("/api/manage", manage_routes)
        // Public certificate verification
        .route(
            "/api/certificates/{certificate_number}",
            get(profile::verify_certificate),
        )
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
