//! Reading antenna positions.
//!
//! Two sources are supported: a plain-text table with a header naming the
//! `name`, `E`, `N` and `U` columns (and optionally `flagged`), separated by
//! whitespace or commas; and an MCCS-style platform YAML, where each station
//! has a geodetic reference position and per-antenna east/north/up offsets.

use std::{collections::BTreeMap, path::Path};

use log::{debug, warn};
use marlu::LatLngHeight;
use ndarray::prelude::*;
use serde::Deserialize;

use super::CoordError;

/// Antenna names, flags and east/north/up positions \[metres\], in the order
/// that defines baselines.
#[derive(Debug, Clone, PartialEq)]
pub struct AntennaPositions {
    pub names: Vec<String>,
    pub flags: Vec<bool>,
    pub enu: Array2<f64>,
}

impl AntennaPositions {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn split_fields(line: &str) -> Vec<&str> {
    if line.contains(',') {
        line.split(',').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Read a plain-text antenna-location table.
pub fn read_antenna_locations<P: AsRef<Path>>(path: P) -> Result<AntennaPositions, CoordError> {
    let path = path.as_ref();
    debug!("Reading antenna locations from {}", path.display());
    let contents = std::fs::read_to_string(path)?;
    let mut lines = contents
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

    let header = match lines.next() {
        Some((_, h)) => split_fields(h),
        None => return Err(CoordError::NoAntennas(path.to_path_buf())),
    };
    let column = |name: &'static str| -> Result<usize, CoordError> {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| CoordError::MissingColumn {
                file: path.to_path_buf(),
                column: name,
            })
    };
    let i_name = column("name")?;
    let i_enu = [column("E")?, column("N")?, column("U")?];
    let i_flag = header.iter().position(|h| *h == "flagged");

    let mut names = vec![];
    let mut flags = vec![];
    let mut enu = vec![];
    for (line_num, line) in lines {
        let fields = split_fields(line);
        let bad_line = |reason: String| CoordError::AntennaFile {
            file: path.to_path_buf(),
            line: line_num,
            reason,
        };
        let get = |i: usize| {
            fields
                .get(i)
                .copied()
                .ok_or_else(|| bad_line(format!("expected at least {} columns", i + 1)))
        };

        names.push(get(i_name)?.to_string());
        for i in i_enu {
            let s = get(i)?;
            let v: f64 = s
                .parse()
                .map_err(|_| bad_line(format!("'{s}' is not a number")))?;
            enu.push(v);
        }
        let flag = match i_flag {
            Some(i) => {
                let s = get(i)?;
                parse_flag(s).ok_or_else(|| bad_line(format!("'{s}' is not a boolean")))?
            }
            None => false,
        };
        flags.push(flag);
    }
    if names.is_empty() {
        return Err(CoordError::NoAntennas(path.to_path_buf()));
    }

    let num_ants = names.len();
    debug!("Read {num_ants} antennas");
    let enu = Array2::from_shape_vec((num_ants, 3), enu)
        .map_err(|e| bad_shape(path, e.to_string()))?;
    Ok(AntennaPositions { names, flags, enu })
}

fn bad_shape(path: &Path, reason: String) -> CoordError {
    CoordError::AntennaFile {
        file: path.to_path_buf(),
        line: 0,
        reason,
    }
}

#[derive(Deserialize)]
struct PlatformFile {
    platform: Platform,
}

#[derive(Deserialize)]
struct Platform {
    stations: BTreeMap<String, PlatformStationEntry>,
}

#[derive(Deserialize)]
struct PlatformStationEntry {
    reference: StationReference,
    antennas: BTreeMap<String, PlatformAntenna>,
}

#[derive(Deserialize)]
struct StationReference {
    /// \[degrees\]
    latitude: f64,
    /// \[degrees\]
    longitude: f64,
    /// \[metres\]
    ellipsoidal_height: f64,
}

#[derive(Deserialize)]
struct PlatformAntenna {
    location_offset: LocationOffset,
    eep: usize,
    #[serde(default)]
    masked: bool,
}

#[derive(Deserialize)]
struct LocationOffset {
    east: f64,
    north: f64,
    up: f64,
}

/// One station out of a platform description.
#[derive(Debug, Clone)]
pub struct PlatformStation {
    pub station_id: String,
    pub array_position: LatLngHeight,
    pub antennas: AntennaPositions,
}

/// Read a station from a platform YAML. If `station` isn't given, the file
/// must describe exactly one station. Antennas are ordered by their EEP
/// index; masked antennas are flagged.
pub fn read_platform_yaml<P: AsRef<Path>>(
    path: P,
    station: Option<&str>,
) -> Result<PlatformStation, CoordError> {
    let path = path.as_ref();
    debug!("Reading platform description {}", path.display());
    let f = std::io::BufReader::new(std::fs::File::open(path)?);
    let platform: PlatformFile =
        serde_yaml::from_reader(f).map_err(|err| CoordError::PlatformYaml {
            file: path.to_path_buf(),
            err,
        })?;
    let mut stations = platform.platform.stations;
    let platform_err = |reason: String| CoordError::Platform {
        file: path.to_path_buf(),
        reason,
    };

    let (station_id, entry) = match station {
        Some(id) => {
            let entry = stations
                .remove(id)
                .ok_or_else(|| platform_err(format!("no station '{id}'")))?;
            (id.to_string(), entry)
        }
        None => {
            if stations.len() > 1 {
                return Err(platform_err(format!(
                    "{} stations are described; pick one of {:?}",
                    stations.len(),
                    stations.keys().collect::<Vec<_>>()
                )));
            }
            stations
                .pop_first()
                .ok_or_else(|| platform_err("no stations are described".to_string()))?
        }
    };

    let mut antennas: Vec<(String, PlatformAntenna)> = entry.antennas.into_iter().collect();
    antennas.sort_by_key(|(_, a)| a.eep);
    if antennas.is_empty() {
        return Err(CoordError::NoAntennas(path.to_path_buf()));
    }
    let num_masked = antennas.iter().filter(|(_, a)| a.masked).count();
    if num_masked > 0 {
        warn!("{num_masked} antennas in station {station_id} are masked; flagging them");
    }

    let num_ants = antennas.len();
    let mut enu = Array2::zeros((num_ants, 3));
    let mut names = Vec::with_capacity(num_ants);
    let mut flags = Vec::with_capacity(num_ants);
    for ((name, ant), mut row) in antennas.into_iter().zip(enu.outer_iter_mut()) {
        row[0] = ant.location_offset.east;
        row[1] = ant.location_offset.north;
        row[2] = ant.location_offset.up;
        names.push(name);
        flags.push(ant.masked);
    }

    let r = entry.reference;
    Ok(PlatformStation {
        station_id,
        array_position: LatLngHeight {
            longitude_rad: r.longitude.to_radians(),
            latitude_rad: r.latitude.to_radians(),
            height_metres: r.ellipsoidal_height,
        },
        antennas: AntennaPositions { names, flags, enu },
    })
}
