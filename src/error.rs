use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("aws config file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },
    #[error("failed to parse aws config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: ini::ParseError,
    },
    #[error("unable to resolve the home directory")]
    HomeDirUnavailable,
    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),
    #[error("authorization request expired before it was approved")]
    AuthorizationExpired,
    #[error("authorization was not approved within {}s", .0.as_secs())]
    AuthorizationTimedOut(Duration),
    #[error("{operation} failed: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },
    #[error("profile `{key}` is produced by both {first} and {second}")]
    ProfileCollision {
        key: String,
        first: String,
        second: String,
    },
    #[error("profile prefix must not be empty")]
    EmptyPrefix,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wraps a failed remote call, flattening its source chain into one line.
    pub fn network(operation: &'static str, err: &dyn StdError) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Network { operation, message }
    }
}
