use thiserror::Error;

/// Failures while staging or persisting upload bytes
#[derive(Error, Debug)]
pub enum StorageError {
    /// Local filesystem failure (staging area or local backend)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored object with the generated name is already present
    #[error("Object {key} already exists")]
    AlreadyExists { key: String },

    /// The object store rejected or failed a request
    #[error("Object store {operation} failed: {message}")]
    Remote { operation: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;
