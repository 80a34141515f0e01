//! All the errors this crate can produce.

use thiserror::Error;

use crate::{
    config::ConfigError,
    coords::CoordError,
    export::ExportError,
    read::{MetadataError, UvxReadError},
    vis::LayoutError,
    write::UvxWriteError,
};

#[derive(Error, Debug)]
pub enum UvxError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error(transparent)]
    Read(#[from] UvxReadError),

    #[error(transparent)]
    Write(#[from] UvxWriteError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
