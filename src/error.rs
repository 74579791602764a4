use thiserror::Error;

impl From<serde_json::Error> for InsightsError {
    fn from(err: serde_json::Error) -> Self {
        Self::DatabaseError(format!("JSON column error: {}", err))
    }
}

impl From<sqlx::Error> for InsightsError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => {
                Self::UpstreamUnavailable(format!("Event store unreachable: {}", err))
            }
            other => Self::DatabaseError(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid filter {field}={value:?}: {reason}")]
    InvalidFilter {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl InsightsError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn invalid_filter(field: &str, value: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidFilter {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Transport failures; the same read may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, InsightsError>;
