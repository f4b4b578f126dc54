use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The single not-found error every camera lookup reports
    pub fn camera_not_found(id: i32) -> Self {
        Error::NotFound(format!("Camera with id {} not found", id))
    }

    pub fn duplicate_ip(ip_address: &str) -> Self {
        Error::AlreadyExists(format!(
            "Camera with IP address {} already exists",
            ip_address
        ))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
