//! Station configurations.
//!
//! A station is described by a small YAML file (conventionally
//! `uv_config.yaml`) that sits next to its antenna-location file. Named
//! stations are looked up through a [`ConfigRegistry`], which is just a list
//! of directories; `<dir>/<name>/uv_config.yaml` is the first match.

mod error;

pub use error::ConfigError;

use std::path::{Path, PathBuf};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::attrs::Scalar;

/// The filename looked for inside each registry directory.
pub const STATION_CONFIG_FILENAME: &str = "uv_config.yaml";

/// The order of the axes in a raw correlation-matrix payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RawAxisOrder {
    /// (time, frequency, baseline, polarisation). AAVS/SKA-Low station
    /// correlators write this.
    #[default]
    Tfbp,

    /// (time, baseline, frequency, polarisation).
    Tbfp,
}

fn default_vis_units() -> String {
    "uncalib".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub telescope_name: String,

    /// Path to the antenna-location file. After [`StationConfig::from_yaml`],
    /// this is absolute.
    pub antenna_locations_file: PathBuf,

    /// Path to a baseline-order file. Recorded, but the baseline order is
    /// derived from the antenna order.
    #[serde(default)]
    pub baseline_order_file: Option<PathBuf>,

    /// Sample period \[seconds\].
    pub tsamp: f64,

    /// \[Hz\]
    pub channel_spacing: f64,

    /// \[Hz\]
    pub channel_width: f64,

    #[serde(default)]
    pub conjugate_hdf5: bool,

    #[serde(default)]
    pub transpose_hdf5: bool,

    /// Array rotation angle \[degrees\].
    #[serde(default)]
    pub receptor_angle: f64,

    #[serde(default = "default_vis_units")]
    pub vis_units: String,

    #[serde(rename = "telescope_ECEF_X", default)]
    pub telescope_ecef_x: Option<f64>,

    #[serde(rename = "telescope_ECEF_Y", default)]
    pub telescope_ecef_y: Option<f64>,

    #[serde(rename = "telescope_ECEF_Z", default)]
    pub telescope_ecef_z: Option<f64>,

    #[serde(default)]
    pub raw_axis_order: RawAxisOrder,

    /// The absolute path of the YAML this was read from.
    #[serde(skip)]
    pub source_file: PathBuf,
}

impl StationConfig {
    /// Read a station configuration, resolving the antenna-location and
    /// baseline-order files against the YAML's directory.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<StationConfig, ConfigError> {
        let path = absolute(path.as_ref())?;
        if !path.is_file() {
            return Err(ConfigError::MissingFile(path));
        }
        debug!("Reading station config {}", path.display());
        let f = std::io::BufReader::new(std::fs::File::open(&path)?);
        let mut config: StationConfig =
            serde_yaml::from_reader(f).map_err(|err| ConfigError::Yaml {
                file: path.clone(),
                err,
            })?;

        let config_dir = path.parent().unwrap_or_else(|| Path::new("/"));
        config.antenna_locations_file = config_dir.join(&config.antenna_locations_file);
        config.baseline_order_file = config
            .baseline_order_file
            .take()
            .map(|f| config_dir.join(f));
        config.source_file = path;
        trace!("{config:?}");
        Ok(config)
    }

    /// The array's geocentric position \[metres\], if all three components
    /// were given.
    pub fn ecef(&self) -> Option<[f64; 3]> {
        match (
            self.telescope_ecef_x,
            self.telescope_ecef_y,
            self.telescope_ecef_z,
        ) {
            (Some(x), Some(y), Some(z)) => Some([x, y, z]),
            _ => None,
        }
    }

    /// Flatten the configuration into attribute key/value pairs.
    pub fn to_scalars(&self) -> Vec<(String, Scalar)> {
        let mut v = vec![
            ("telescope_name".to_string(), Scalar::from(self.telescope_name.as_str())),
            (
                "antenna_locations_file".to_string(),
                Scalar::from(self.antenna_locations_file.display().to_string()),
            ),
            ("tsamp".to_string(), Scalar::Float(self.tsamp)),
            ("channel_spacing".to_string(), Scalar::Float(self.channel_spacing)),
            ("channel_width".to_string(), Scalar::Float(self.channel_width)),
            ("conjugate_hdf5".to_string(), Scalar::Bool(self.conjugate_hdf5)),
            ("transpose_hdf5".to_string(), Scalar::Bool(self.transpose_hdf5)),
            ("receptor_angle".to_string(), Scalar::Float(self.receptor_angle)),
            ("vis_units".to_string(), Scalar::from(self.vis_units.as_str())),
            ("raw_axis_order".to_string(), Scalar::from(self.raw_axis_order.to_string())),
            (
                "station_config_file".to_string(),
                Scalar::from(self.source_file.display().to_string()),
            ),
        ];
        if let Some(f) = &self.baseline_order_file {
            v.push((
                "baseline_order_file".to_string(),
                Scalar::from(f.display().to_string()),
            ));
        }
        if let Some([x, y, z]) = self.ecef() {
            v.push(("telescope_ECEF_X".to_string(), Scalar::Float(x)));
            v.push(("telescope_ECEF_Y".to_string(), Scalar::Float(y)));
            v.push(("telescope_ECEF_Z".to_string(), Scalar::Float(z)));
        }
        v
    }
}

/// Where a station configuration comes from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// An explicit YAML file.
    Path(PathBuf),

    /// A telescope name, looked up in a [`ConfigRegistry`].
    Telescope(String),
}

/// Directories holding named station configurations.
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    search_dirs: Vec<PathBuf>,
}

impl ConfigRegistry {
    pub fn new(search_dirs: Vec<PathBuf>) -> ConfigRegistry {
        ConfigRegistry { search_dirs }
    }

    pub fn add_dir<P: Into<PathBuf>>(&mut self, dir: P) {
        self.search_dirs.push(dir.into());
    }

    /// Find the configuration file for a telescope.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, ConfigError> {
        for dir in &self.search_dirs {
            let candidate = dir.join(name).join(STATION_CONFIG_FILENAME);
            trace!("Looking for {}", candidate.display());
            if candidate.is_file() {
                debug!("Using station config {}", candidate.display());
                return Ok(candidate);
            }
        }
        Err(ConfigError::NotFound {
            name: name.to_string(),
            searched: self.search_dirs.clone(),
        })
    }

    /// The names of all telescopes this registry can resolve.
    pub fn available(&self) -> Vec<String> {
        let mut names = vec![];
        for dir in &self.search_dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                if entry.path().join(STATION_CONFIG_FILENAME).is_file() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Resolve a [`ConfigSource`] and parse the YAML.
    pub fn load(&self, source: &ConfigSource) -> Result<StationConfig, ConfigError> {
        match source {
            ConfigSource::Path(p) => StationConfig::from_yaml(p),
            ConfigSource::Telescope(name) => StationConfig::from_yaml(self.resolve(name)?),
        }
    }
}

pub(crate) fn absolute(p: &Path) -> std::io::Result<PathBuf> {
    if p.is_absolute() {
        Ok(p.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(p))
    }
}
