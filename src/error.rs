use std::io;
use std::path::Path;

/// Failures surfaced by the generation pipeline and the form handlers.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Data format error: {0}")]
    DataFormat(String),
    #[error("File system error: {0}")]
    FileSystem(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("A character sheet is already being generated for this session")]
    Busy,
    #[error("Please wait {0} more second(s) before generating again")]
    RateLimited(u64),
}

impl ForgeError {
    pub fn file_system(path: &Path, err: io::Error) -> Self {
        ForgeError::FileSystem(format!("{}: {}", path.display(), err))
    }

    /// Maps a reqwest failure, calling out timeouts explicitly.
    pub fn from_request(context: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ForgeError::Network(format!("{context} timed out"))
        } else if err.is_connect() {
            ForgeError::Network(format!("{context} could not connect: {err}"))
        } else {
            ForgeError::Network(format!("{context} failed: {err}"))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ForgeError::Network(_) => "network",
            ForgeError::DataFormat(_) => "data_format",
            ForgeError::FileSystem(_) => "file_system",
            ForgeError::Validation(_) => "validation",
            ForgeError::Busy => "busy",
            ForgeError::RateLimited(_) => "rate_limited",
        }
    }
}

pub type ForgeResult<T> = Result<T, ForgeError>;
