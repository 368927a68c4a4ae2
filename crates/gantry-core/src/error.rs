use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid environment name '{name}': {reason}")]
    InvalidEnvironmentName { name: String, reason: String },

    #[error("Invalid node path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
