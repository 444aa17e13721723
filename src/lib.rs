pub mod app;
pub mod config;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod rate;
pub mod schedule;
pub mod state;
pub mod storage;
pub mod streak;

pub use app::router;
pub use config::AppConfig;
pub use engine::StatsEngine;
pub use errors::StatsError;
pub use state::AppState;
pub use storage::{HabitStore, JsonStore, LogStore, StatsCache};
