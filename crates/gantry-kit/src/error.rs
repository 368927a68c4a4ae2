use thiserror::Error;

#[derive(Error, Debug)]
pub enum KitError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse kit blueprint: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid kit blueprint: {reason}")]
    InvalidBlueprint { reason: String },

    #[error("Kit '{kit}' references layer file '{file}', which does not exist")]
    MissingLayerFile { kit: String, file: String },

    #[error("Lifecycle hook failed: {0}")]
    Hook(String),
}

pub type Result<T> = std::result::Result<T, KitError>;
