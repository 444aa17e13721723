use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, patch, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/habits", get(handlers::list_habits).post(handlers::create_habit))
        .route("/api/habits/summary", get(handlers::habit_summaries))
        .route(
            "/api/habits/:id",
            patch(handlers::update_habit).delete(handlers::delete_habit),
        )
        .route("/api/habits/:id/archive", post(handlers::archive_habit))
        .route("/api/habits/:id/toggle", post(handlers::toggle_completion))
        .route("/api/habits/:id/stats", get(handlers::habit_stats))
        .route("/api/rate", get(handlers::get_rate))
        .route("/api/stats/month", get(handlers::month_progress))
        .route("/api/stats/weekly", get(handlers::weekly_consistency))
        .route("/api/stats/top", get(handlers::top_habits))
        .route("/api/stats/overview", get(handlers::weekly_overview))
        .route("/api/stats/rolling", get(handlers::rolling_rates))
        .route("/api/stats/trend", get(handlers::activity_trend))
        .route("/api/insights", get(handlers::list_insights).post(handlers::add_insight))
        .with_state(state)
}
