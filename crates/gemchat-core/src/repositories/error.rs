use thiserror::Error;

#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Storage initialization failed: {message}")]
    InitializationError { message: String },

    #[error("Invalid data: {message}")]
    InvalidData { message: String },
}

pub type StorageResult<T> = Result<T, StorageError>;
