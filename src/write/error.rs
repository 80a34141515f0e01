use std::path::PathBuf;

use thiserror::Error;

use crate::{h5::H5Error, vis::LayoutError};

#[derive(Error, Debug)]
pub enum UvxWriteError {
    #[error("Refusing to write an inconsistent UVX: {0}")]
    Layout(#[from] LayoutError),

    #[error("Can't store the key '{key}' under {group}: {reason}")]
    AttrKey {
        group: &'static str,
        key: String,
        reason: &'static str,
    },

    #[error("{file}: {err}")]
    H5 { file: PathBuf, err: H5Error },
}
