//! Code to read raw correlator captures and UVX files.

mod error;
mod metadata;
pub mod raw;
mod uvx;

pub use error::{MetadataError, UvxReadError};
pub use metadata::{load_observation_metadata, Metadata};
pub use raw::{read_correlation_matrix, read_raw_metadata, ObservationInfo, RawMetadata};
pub use uvx::read_uvx;
