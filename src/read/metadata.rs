//! Merge a raw capture's metadata with its station configuration.

use std::{collections::BTreeMap, path::Path, path::PathBuf};

use log::{debug, info};

use super::{
    raw::{absolute_path, read_raw_metadata, RawMetadata},
    MetadataError,
};
use crate::{
    attrs::Scalar,
    config::{ConfigRegistry, ConfigSource, StationConfig},
};

/// Everything known about an observation before its payload is read.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Per-observation facts from the capture.
    pub raw: RawMetadata,

    /// Array geometry and conventions from the station YAML.
    pub config: StationConfig,

    /// The capture's absolute path.
    pub raw_file: PathBuf,

    pub history: String,
}

impl Metadata {
    /// Flatten into key/value pairs. Station-config values override raw
    /// attributes of the same name, except per-observation facts (start time
    /// and channel id), where the capture wins.
    pub fn to_scalars(&self) -> BTreeMap<String, Scalar> {
        let mut map = self.raw.root_attrs.clone();
        map.extend(self.config.to_scalars());
        map.insert("ts_start".to_string(), Scalar::Float(self.raw.ts_start));
        map.insert("channel_id".to_string(), Scalar::Int(self.raw.channel_id));
        map.insert(
            "n_integrations".to_string(),
            Scalar::Int(self.raw.n_integrations as i64),
        );
        map.insert(
            "data_shape".to_string(),
            Scalar::IntList(self.raw.data_shape.iter().map(|&d| d as i64).collect()),
        );
        map.insert("history".to_string(), Scalar::from(self.history.as_str()));
        map
    }
}

/// Load an observation's metadata. The station configuration is resolved and
/// parsed before the capture is opened, so configuration problems are
/// reported without touching the raw file.
pub fn load_observation_metadata<P: AsRef<Path>>(
    raw_path: P,
    config_source: &ConfigSource,
    registry: &ConfigRegistry,
) -> Result<Metadata, MetadataError> {
    let raw_path = raw_path.as_ref();
    if let ConfigSource::Telescope(name) = config_source {
        info!("Using station config '{name}'");
    }
    let config = registry.load(config_source)?;
    let raw = read_raw_metadata(raw_path)?;
    debug!(
        "{}: {} antennas, {} channels, {} integrations",
        raw_path.display(),
        raw.n_antennas,
        raw.n_chans,
        raw.n_integrations
    );
    Ok(Metadata {
        raw,
        config,
        raw_file: absolute_path(raw_path),
        history: format!("Created with uvx_convert {}", crate::UVX_VERSION),
    })
}
