use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error(transparent)]
    Merge(#[from] gantry_merge::MergeError),

    #[error(transparent)]
    Kit(#[from] gantry_kit::KitError),

    #[error(transparent)]
    Secrets(#[from] gantry_secrets::SecretsError),

    #[error(transparent)]
    Core(#[from] gantry_core::CoreError),

    #[error("Environment file '{path}' does not exist")]
    MissingEnvironmentFile { path: String },

    #[error("Failed to read environment file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest references secret '{path}' at '{at}', which is not in the plan")]
    UnplannedSecret { path: String, at: String },

    #[error("Secret '{path}' has no stored record")]
    MissingRecord { path: String },

    #[error("Secret '{path}' has no field '{field}' (referenced at '{at}')")]
    MissingField {
        path: String,
        field: String,
        at: String,
    },

    #[error("The entombed variant requires an encryption key (entomb.key_hex)")]
    EntombKeyMissing,

    #[error("Invalid entombment key: {0}")]
    EntombKeyInvalid(String),

    #[error("Entombed value does not decode: {0}")]
    EntombOpenFailed(String),

    #[error("Pipeline run was cancelled before the {stage} stage")]
    Cancelled { stage: &'static str },

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ManifestError>;
