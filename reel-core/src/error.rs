use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReelError {
    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
