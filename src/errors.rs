use axum::http::StatusCode;
use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("habit not found: {0}")]
    NotFound(String),
    #[error("completion on {date} for habit {habit_id} precedes its creation on {created_at}")]
    DataInconsistency {
        habit_id: String,
        date: NaiveDate,
        created_at: NaiveDate,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

impl StatsError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }
}

impl From<std::io::Error> for StatsError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StatsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<StatsError> for AppError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::Configuration(_) => Self::bad_request(err.to_string()),
            StatsError::NotFound(_) => Self::not_found(err.to_string()),
            StatsError::DataInconsistency { .. } | StatsError::Storage(_) => Self::internal(err),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err)
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
