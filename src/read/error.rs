//! Errors associated with reading raw captures and UVX files.

use std::path::PathBuf;

use thiserror::Error;

use crate::{config::ConfigError, vis::LayoutError};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("{file}: missing required metadata {keys:?}")]
    MissingMetadata { file: PathBuf, keys: Vec<String> },

    #[error("{file}: metadata '{key}' should be {expected}, but is '{got}'")]
    BadAttribute {
        file: PathBuf,
        key: String,
        expected: &'static str,
        got: String,
    },

    #[error("{file}: couldn't find '{object}'")]
    MissingObject { file: PathBuf, object: String },

    #[error("Supplied file path {0} does not exist or is not readable")]
    BadFile(PathBuf),

    #[error("{file}: {err}")]
    Hdf5 { file: PathBuf, err: hdf5::Error },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum UvxReadError {
    #[error("{file}: expected '{object}', but it isn't there; is this a UVX file?")]
    SchemaMismatch { file: PathBuf, object: String },

    #[error("{file}: '{object}' has an unexpected shape {got:?}")]
    BadShape {
        file: PathBuf,
        object: String,
        got: Vec<usize>,
    },

    #[error("{file}: {err}")]
    Hdf5 { file: PathBuf, err: hdf5::Error },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
