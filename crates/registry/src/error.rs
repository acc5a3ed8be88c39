use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("could not determine user cache dir")]
    NoUserCacheDir,

    #[error("could not create cache dir {path}: {source}")]
    CacheInit {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to download {url}: {source}")]
    Download { url: String, source: reqwest::Error },

    #[error("unexpected HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("failed to save {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}
