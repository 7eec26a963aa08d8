use thiserror::Error;

use crate::{message::ParseError, render::RenderError};

use std::{path::PathBuf, sync::PoisonError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Render(#[from] RenderError),
    #[error("missing required config key '{0}'")]
    MissingConfigKey(&'static str),
    #[error("invalid value for config key '{key}': {value}")]
    InvalidConfigValue { key: &'static str, value: String },
    #[error("cache directory '{0}' does not exist or is not a directory")]
    InvalidCacheDirectory(PathBuf),
    #[error("filename '{0}' is not a valid cache key (must not contain path separators)")]
    InvalidFilename(String),
    #[error("client disconnected")]
    ClientDisconnected,
    // Early convert the poison error to avoid the lifetime issues with holding
    // the internal guard
    #[error("{0}")]
    Poison(String),
}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Error::Poison(err.to_string())
    }
}

pub type Result<T> = core::result::Result<T, Error>;
