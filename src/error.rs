use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No valid starting point in [{low}, {high}] after {attempts} attempts")]
    ExhaustedAttempts { low: f64, high: f64, attempts: u32 },

    #[error("Launch failed for {job}: {reason}")]
    Launch { job: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SweepError>;
