//! Convert raw station-correlator HDF5 captures into the UVX visibility model,
//! store UVX losslessly in HDF5, and export it to downstream formats.

pub mod attrs;
pub mod config;
pub mod convert;
pub mod coords;
mod error;
pub mod export;
mod h5;
pub mod read;
pub mod uvw;
pub mod vis;
pub mod write;

#[cfg(test)]
mod test_common;

pub use attrs::{AttrMap, Scalar, Value};
pub use convert::{hdf5_to_uvx, ConvertOptions};
pub use error::UvxError;
pub use h5::H5Error;
pub use read::read_uvx;
pub use write::write_uvx;

use hifitime::Epoch;
use marlu::{c32, LatLngHeight, RADec, XyzGeodetic};
use ndarray::prelude::*;
use strum_macros::{Display, EnumIter, EnumString};

use vis::LayoutError;

/// The container format tag written to every UVX file.
pub const UVX_CLASS: &str = "UVX";

/// The version of this crate, recorded in every UVX file.
pub const UVX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How far a stored MJD may stray from its Unix time \[days\] (about 1 ms).
const MJD_TOLERANCE: f64 = 1e-8;

/// How far a stored LST may stray from the one derived from its Unix time and
/// the array position \[hours\].
const LST_TOLERANCE: f64 = 1e-6;

/// Linear polarisation products, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum Polarisation {
    XX,
    XY,
    YX,
    YY,
}

pub const POLARISATIONS: [Polarisation; 4] = [
    Polarisation::XX,
    Polarisation::XY,
    Polarisation::YX,
    Polarisation::YY,
];

/// One entry per integration. All three representations come from the same
/// instant.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    /// UTC modified Julian date \[days\].
    pub mjd: Vec<f64>,

    /// Local apparent sidereal time \[hours\].
    pub lst: Vec<f64>,

    /// \[seconds since 1970-01-01 UTC\]
    pub unix: Vec<f64>,

    /// The integration time \[seconds\].
    pub resolution: f64,
}

impl TimeAxis {
    pub fn len(&self) -> usize {
        self.unix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unix.is_empty()
    }

    /// The centroid of each integration.
    pub fn epochs(&self) -> Vec<Epoch> {
        self.unix
            .iter()
            .map(|&u| Epoch::from_unix_seconds(u))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyAxis {
    /// Channel centre frequencies \[Hz\].
    pub centres: Vec<f64>,

    /// \[Hz\]
    pub channel_spacing: f64,

    /// \[Hz\]
    pub channel_bandwidth: f64,

    /// The (coarse) channel index the capture was taken from.
    pub channel_id: i64,
}

impl FrequencyAxis {
    pub fn len(&self) -> usize {
        self.centres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centres.is_empty()
    }

    /// Channels are oversampled when they are wider than their spacing.
    pub fn oversampled(&self) -> bool {
        self.channel_bandwidth > self.channel_spacing
    }
}

/// The antennas of a station. The order of the antennas defines the baseline
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct AntennaTable {
    pub identifiers: Vec<String>,

    pub flags: Vec<bool>,

    /// East, north, up positions relative to the array origin, shaped
    /// (antenna, spatial) \[metres\].
    pub enu: Array2<f64>,

    /// Absolute geocentric (ECEF) positions, shaped (antenna, spatial)
    /// \[metres\].
    pub ecef: Array2<f64>,

    /// The array origin's geocentric position \[metres\].
    pub origin_geocentric: [f64; 3],

    /// The array origin's longitude \[degrees\], latitude \[degrees\] and
    /// height \[metres\].
    pub origin_geodetic: [f64; 3],

    /// \[degrees\]
    pub array_rotation_angle: f64,

    /// Anything else worth keeping about the station.
    pub attrs: AttrMap,
}

impl AntennaTable {
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn array_position(&self) -> LatLngHeight {
        let [lon, lat, height] = self.origin_geodetic;
        LatLngHeight {
            longitude_rad: lon.to_radians(),
            latitude_rad: lat.to_radians(),
            height_metres: height,
        }
    }

    /// Antenna positions in the local geodetic XYZ frame used for UVWs.
    pub fn xyz_geodetic(&self) -> Vec<XyzGeodetic> {
        let (s_lat, c_lat) = self.array_position().latitude_rad.sin_cos();
        self.enu
            .outer_iter()
            .map(|enu| XyzGeodetic {
                x: -enu[1] * s_lat + enu[2] * c_lat,
                y: enu[0],
                z: enu[1] * c_lat + enu[2] * s_lat,
            })
            .collect()
    }
}

/// Where the data are phased to. Either one entry per timestep, or a single
/// fixed centre.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseCentre {
    /// Right ascension \[hours\].
    pub ra: Vec<f64>,

    /// Declination \[degrees\].
    pub dec: Vec<f64>,
}

impl PhaseCentre {
    pub fn fixed(radec: RADec) -> PhaseCentre {
        PhaseCentre {
            ra: vec![radec.ra.to_degrees() / 15.0],
            dec: vec![radec.dec.to_degrees()],
        }
    }

    pub fn len(&self) -> usize {
        self.ra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ra.is_empty()
    }

    /// The phase centre at a timestep.
    pub fn radec(&self, i_time: usize) -> RADec {
        let i = if self.ra.len() == 1 { 0 } else { i_time };
        RADec::from_degrees(self.ra[i] * 15.0, self.dec[i])
    }
}

/// Visibilities from a single station, with everything needed to interpret
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct Uvx {
    /// The telescope (station) name.
    pub name: String,

    pub antennas: AntennaTable,

    pub time: TimeAxis,

    pub frequency: FrequencyAxis,

    /// Antenna index pairs. UVWs are position(ant2) - position(ant1).
    pub baselines: Vec<(usize, usize)>,

    pub polarisations: Vec<Polarisation>,

    /// Shaped (time, frequency, baseline, polarisation).
    pub data: Array4<c32>,

    pub data_unit: String,

    pub phase_centre: PhaseCentre,

    pub provenance: AttrMap,

    pub context: AttrMap,
}

impl Uvx {
    /// Check the invariants tying the tensor, axes and antenna table together.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let expected = (
            self.time.len(),
            self.frequency.len(),
            self.baselines.len(),
            self.polarisations.len(),
        );
        if self.data.dim() != expected {
            return Err(LayoutError::ShapeMismatch {
                expected: vec![expected.0, expected.1, expected.2, expected.3],
                got: self.data.shape().to_vec(),
            });
        }
        if self.time.mjd.len() != self.time.len() || self.time.lst.len() != self.time.len() {
            return Err(LayoutError::TimeAxes {
                mjd: self.time.mjd.len(),
                lst: self.time.lst.len(),
                unix: self.time.len(),
            });
        }
        self.check_time_consistency()?;
        let num_ants = self.antennas.len();
        if self.antennas.flags.len() != num_ants
            || self.antennas.enu.dim() != (num_ants, 3)
            || self.antennas.ecef.dim() != (num_ants, 3)
        {
            return Err(LayoutError::AntennaTable { num_ants });
        }
        if let Some(&(ant1, ant2)) = self
            .baselines
            .iter()
            .find(|(a1, a2)| *a1 >= num_ants || *a2 >= num_ants)
        {
            return Err(LayoutError::BadBaseline {
                ant1,
                ant2,
                num_ants,
            });
        }
        let num_pc = self.phase_centre.len();
        if self.phase_centre.dec.len() != num_pc || (num_pc != 1 && num_pc != self.time.len()) {
            return Err(LayoutError::PhaseCentre {
                got: num_pc,
                num_times: self.time.len(),
            });
        }
        Ok(())
    }

    /// MJD and LST must describe the same instants as the Unix times, as seen
    /// from the stored array position.
    fn check_time_consistency(&self) -> Result<(), LayoutError> {
        let longitude_rad = self.antennas.array_position().longitude_rad;
        for (i_time, ((epoch, &mjd), &lst)) in self
            .time
            .epochs()
            .into_iter()
            .zip(&self.time.mjd)
            .zip(&self.time.lst)
            .enumerate()
        {
            let expected = epoch.to_mjd_utc_days();
            if !mjd.is_finite() || (mjd - expected).abs() > MJD_TOLERANCE {
                return Err(LayoutError::TimeDrift {
                    i_time,
                    what: "MJD",
                    stored: mjd,
                    expected,
                });
            }
            let expected =
                coords::local_apparent_sidereal_time(epoch, longitude_rad).to_degrees() / 15.0;
            // LST wraps at 24 hours.
            let diff = (lst - expected).rem_euclid(24.0);
            if !lst.is_finite() || diff.min(24.0 - diff) > LST_TOLERANCE {
                return Err(LayoutError::TimeDrift {
                    i_time,
                    what: "LST",
                    stored: lst,
                    expected,
                });
            }
        }
        Ok(())
    }
}
