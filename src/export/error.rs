use std::path::PathBuf;

use thiserror::Error;

use crate::{coords::CoordError, read::MetadataError, vis::LayoutError};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error("The dataset has {got} {what}, but {expected} were expected")]
    BadLength {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("Couldn't write uvfits file {file}: {err}")]
    UvfitsWrite {
        file: PathBuf,
        err: marlu::UvfitsWriteError,
    },

    #[error(transparent)]
    MarluIO(#[from] marlu::io::error::IOError),
}
