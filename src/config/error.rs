//! Errors associated with locating and parsing station configurations.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No station configuration named '{name}' was found; searched {searched:?}")]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("Station configuration file {0} does not exist or is not readable")]
    MissingFile(PathBuf),

    #[error("Neither a station configuration file nor a telescope name was supplied")]
    NoConfigSupplied,

    #[error("Couldn't parse station configuration {file}: {err}")]
    Yaml {
        file: PathBuf,
        err: serde_yaml::Error,
    },

    #[error("Station configuration {file} has no array position; supply telescope_ECEF_X/Y/Z or use a platform YAML")]
    NoArrayPosition { file: PathBuf },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
