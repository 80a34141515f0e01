//! Errors associated with building coordinate frames.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordError {
    #[error("Antenna file {file} line {line}: {reason}")]
    AntennaFile {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Antenna file {file} has no '{column}' column")]
    MissingColumn { file: PathBuf, column: &'static str },

    #[error("Antenna file {0} doesn't list any antennas")]
    NoAntennas(PathBuf),

    #[error("Antenna file {file} lists {got} antennas, but the data has {expected}")]
    AntennaCount {
        file: PathBuf,
        got: usize,
        expected: usize,
    },

    #[error("Platform file {file}: {reason}")]
    Platform { file: PathBuf, reason: String },

    #[error("Couldn't parse platform file {file}: {err}")]
    PlatformYaml {
        file: PathBuf,
        err: serde_yaml::Error,
    },

    #[error("No array position available; supply telescope_ECEF_X/Y/Z or use a platform description")]
    NoArrayPosition,

    #[error("The observation has no integrations")]
    NoTimesteps,

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
