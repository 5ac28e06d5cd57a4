use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("store request failed: {0}")]
    StoreTransport(#[from] reqwest::Error),

    #[error("store rejected request: {0}")]
    StoreApi(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    /// Exit code for operational scripting. Configuration failures must
    /// stay distinguishable from listener/store startup failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            IngestError::Config(_) => 1,
            IngestError::Socket(_) | IngestError::StoreTransport(_) | IngestError::StoreApi(_) => 2,
        }
    }
}
