use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Invalid recorder config: {0}")]
    InvalidConfig(String),

    #[error("Recorder needs a running tokio runtime")]
    NoRuntime,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
