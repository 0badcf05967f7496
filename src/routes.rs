// src/routes.rs

use axum::{
    Router,
    http::Method,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{course, marking, progress, quiz, result, take};
use crate::state::AppState;

/// Assembles the main application router.
///
/// * Merges all sub-routers (courses, quizzes, taking, marking, results).
/// * Applies global middleware (Trace, CORS).
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

    let course_routes = Router::new()
        .route("/", post(course::create_course))
        .route("/{slug}", get(course::get_course))
        .route("/{slug}/quizzes", post(quiz::create_quiz));

    let quiz_routes = Router::new()
        .route(
            "/{quiz_id}",
            put(quiz::update_quiz).delete(quiz::delete_quiz),
        )
        .route("/{quiz_id}/questions", post(quiz::create_question));

    let question_routes =
        Router::new().route("/{question_id}/attach/{quiz_id}", put(quiz::attach_question));

    let take_routes = Router::new()
        .route("/{slug}", get(take::start_quiz).post(take::submit_answer))
        .route("/{slug}/finalize", post(take::finalize_quiz));

    let marking_routes = Router::new()
        .route("/", get(marking::list_marking))
        .route("/{sitting_id}", get(marking::marking_detail))
        .route("/{sitting_id}/toggle", post(marking::toggle_mark));

    let result_routes = Router::new()
        .route(
            "/{student_id}/courses/{course_id}",
            put(result::upsert_marks),
        )
        .route("/{student_id}/gpa", get(result::get_gpa))
        .route("/{student_id}/cgpa", get(result::get_cgpa));

    Router::new()
        .nest("/api/courses", course_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/questions", question_routes)
        .nest("/api/take", take_routes)
        .nest("/api/marking", marking_routes)
        .route("/api/progress", get(progress::get_progress))
        .nest("/api/results", result_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
