use thiserror::Error;

#[derive(Error, Debug)]
pub enum PullboardError {
    #[error("GitHub API error: {0}")]
    ApiError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid repository format: {0}")]
    InvalidRepository(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Octocrab error: {0}")]
    OctocrabError(#[from] octocrab::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cache database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid time expression: {0}")]
    InvalidTime(String),

    #[error("Invalid path pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PullboardError>;
