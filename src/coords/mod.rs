//! Build the coordinate frame of an observation: where the array is, where its
//! antennas are, and when and at what frequencies it observed.

mod antennas;
mod error;

pub use antennas::{read_antenna_locations, read_platform_yaml, AntennaPositions, PlatformStation};
pub use error::CoordError;

use std::f64::consts::TAU;

use erfa::{aliases::eraGst06a, constants::ERFA_DJM0};
use hifitime::{Duration, Epoch};
use log::{debug, trace};
use marlu::{
    constants::DAYSEC,
    precession::{get_lmst, precess_time},
    LatLngHeight, RADec, XyzGeocentric,
};
use ndarray::prelude::*;
use vec1::Vec1;

use crate::{
    attrs::{AttrMap, Value},
    read::Metadata,
    AntennaTable, FrequencyAxis, TimeAxis,
};

/// TT - TAI \[seconds\].
const TT_MINUS_TAI: f64 = 32.184;

/// Everything about an observation's geometry, time and frequency.
#[derive(Debug, Clone)]
pub struct CoordinateFrame {
    pub array_position: LatLngHeight,

    /// The array origin in geocentric coordinates \[metres\].
    pub origin_geocentric: XyzGeocentric,

    /// The centroid of each integration.
    pub timestamps: Vec1<Epoch>,

    pub time: TimeAxis,

    pub frequency: FrequencyAxis,

    pub antennas: AntennaTable,

    /// Zenith at the first timestamp, in J2000.
    pub phase_centre: RADec,
}

/// Where antenna positions come from.
#[derive(Debug, Clone)]
pub enum AntennaSource {
    /// The station config's antenna-location table and telescope ECEF.
    LocationsFile,

    /// The station config's antenna-location entry is a platform YAML.
    /// Optionally names the station within it.
    PlatformYaml { station: Option<String> },

    /// Already-read positions, placed relative to the station config's
    /// telescope ECEF.
    Positions(AntennaPositions),
}

/// Local apparent sidereal time \[radians\] at `longitude_rad`. UT1 is taken
/// to be UTC.
pub fn local_apparent_sidereal_time(epoch: Epoch, longitude_rad: f64) -> f64 {
    let mjd_ut1 = epoch.to_mjd_utc_days();
    let mjd_tt = epoch.to_mjd_tai_days() + TT_MINUS_TAI / DAYSEC;
    let gast = eraGst06a(ERFA_DJM0, mjd_ut1, ERFA_DJM0, mjd_tt);
    (gast + longitude_rad).rem_euclid(TAU)
}

/// One timestamp per integration, centred on its integration window:
/// `t_i = ts_start + i * tsamp + tsamp / 2`.
pub fn time_axis(
    ts_start: f64,
    tsamp: f64,
    num_integrations: usize,
    longitude_rad: f64,
) -> Result<(Vec1<Epoch>, TimeAxis), CoordError> {
    let unix: Vec<f64> = (0..num_integrations)
        .map(|i| i as f64 * tsamp + ts_start + tsamp / 2.0)
        .collect();
    let epochs = unix
        .iter()
        .map(|&u| Epoch::from_unix_seconds(u))
        .collect::<Vec<_>>();
    let epochs = Vec1::try_from_vec(epochs).map_err(|_| CoordError::NoTimesteps)?;
    let mjd = epochs.iter().map(|e| e.to_mjd_utc_days()).collect();
    let lst = epochs
        .iter()
        .map(|&e| local_apparent_sidereal_time(e, longitude_rad).to_degrees() / 15.0)
        .collect();
    trace!("Unix times: {unix:?}");
    Ok((
        epochs,
        TimeAxis {
            mjd,
            lst,
            unix,
            resolution: tsamp,
        },
    ))
}

/// Channel centres use a one-based channel index:
/// `f_j = (j + 1) * channel_spacing * channel_id`.
pub fn frequency_axis(
    num_chans: usize,
    channel_spacing: f64,
    channel_width: f64,
    channel_id: i64,
) -> FrequencyAxis {
    let centres = (0..num_chans)
        .map(|j| (j + 1) as f64 * channel_spacing * channel_id as f64)
        .collect();
    FrequencyAxis {
        centres,
        channel_spacing,
        channel_bandwidth: channel_width,
        channel_id,
    }
}

/// The zenith at `epoch`, precessed to J2000.
pub fn zenith_phase_centre(array_position: LatLngHeight, epoch: Epoch) -> RADec {
    let dut1 = Duration::from_seconds(0.0);
    let lmst = get_lmst(array_position.longitude_rad, epoch, dut1);
    let zenith = RADec::from_radians(lmst, array_position.latitude_rad);
    let precession_info = precess_time(
        array_position.longitude_rad,
        array_position.latitude_rad,
        zenith,
        epoch,
        dut1,
    );
    let phase_centre = RADec::from_radians(
        precession_info.lmst_j2000,
        precession_info.array_latitude_j2000,
    );
    debug!(
        "Zenith phase centre: RA {:.4}°, Dec {:.4}° (J2000)",
        phase_centre.ra.to_degrees(),
        phase_centre.dec.to_degrees()
    );
    phase_centre
}

/// Rotate east/north/up offsets \[metres\] into geocentric offsets and add the
/// array origin, giving absolute ECEF positions.
pub fn enu_to_ecef(
    enu: ArrayView2<f64>,
    array_position: LatLngHeight,
    origin: XyzGeocentric,
) -> Array2<f64> {
    let (s_lon, c_lon) = array_position.longitude_rad.sin_cos();
    let (s_lat, c_lat) = array_position.latitude_rad.sin_cos();
    let mut ecef = Array2::zeros(enu.dim());
    for (enu, mut xyz) in enu.outer_iter().zip(ecef.outer_iter_mut()) {
        let (e, n, u) = (enu[0], enu[1], enu[2]);
        xyz[0] = -s_lon * e - s_lat * c_lon * n + c_lat * c_lon * u + origin.x;
        xyz[1] = c_lon * e - s_lat * s_lon * n + c_lat * s_lon * u + origin.y;
        xyz[2] = c_lat * n + s_lat * u + origin.z;
    }
    ecef
}

/// Assemble an [`AntennaTable`] from ENU positions and the array origin.
pub fn antenna_table(
    positions: AntennaPositions,
    array_position: LatLngHeight,
    origin: XyzGeocentric,
    array_rotation_angle: f64,
    attrs: AttrMap,
) -> AntennaTable {
    let ecef = enu_to_ecef(positions.enu.view(), array_position, origin);
    AntennaTable {
        identifiers: positions.names,
        flags: positions.flags,
        enu: positions.enu,
        ecef,
        origin_geocentric: [origin.x, origin.y, origin.z],
        origin_geodetic: [
            array_position.longitude_rad.to_degrees(),
            array_position.latitude_rad.to_degrees(),
            array_position.height_metres,
        ],
        array_rotation_angle,
        attrs,
    }
}

/// Derive the full coordinate frame of an observation from its metadata.
pub fn build_frame(
    metadata: &Metadata,
    antenna_source: AntennaSource,
) -> Result<CoordinateFrame, CoordError> {
    let config = &metadata.config;
    let mut attrs = AttrMap::new();

    let (array_position, origin, positions) = match antenna_source {
        AntennaSource::PlatformYaml { station } => {
            let platform =
                read_platform_yaml(&config.antenna_locations_file, station.as_deref())?;
            attrs.insert(
                "station_id".to_string(),
                Value::from(platform.station_id.as_str()),
            );
            let origin = platform.array_position.to_geocentric_wgs84();
            (platform.array_position, origin, platform.antennas)
        }
        source => {
            let [x, y, z] = config.ecef().ok_or(CoordError::NoArrayPosition)?;
            let origin = XyzGeocentric { x, y, z };
            let positions = match source {
                AntennaSource::Positions(p) => p,
                _ => read_antenna_locations(&config.antenna_locations_file)?,
            };
            (origin.to_earth_wgs84(), origin, positions)
        }
    };
    if positions.len() != metadata.raw.n_antennas {
        return Err(CoordError::AntennaCount {
            file: config.antenna_locations_file.clone(),
            got: positions.len(),
            expected: metadata.raw.n_antennas,
        });
    }
    debug!(
        "Array position: lon {:.6}°, lat {:.6}°, height {:.2} m",
        array_position.longitude_rad.to_degrees(),
        array_position.latitude_rad.to_degrees(),
        array_position.height_metres
    );

    let (timestamps, time) = time_axis(
        metadata.raw.ts_start,
        config.tsamp,
        metadata.raw.n_integrations,
        array_position.longitude_rad,
    )?;
    let frequency = frequency_axis(
        metadata.raw.n_chans,
        config.channel_spacing,
        config.channel_width,
        metadata.raw.channel_id,
    );
    debug!(
        "{} timesteps, {} channels ({} Hz to {} Hz)",
        time.len(),
        frequency.len(),
        frequency.centres.first().copied().unwrap_or_default(),
        frequency.centres.last().copied().unwrap_or_default()
    );

    let phase_centre = zenith_phase_centre(array_position, *timestamps.first());
    let antennas = antenna_table(
        positions,
        array_position,
        origin,
        config.receptor_angle,
        attrs,
    );

    Ok(CoordinateFrame {
        array_position,
        origin_geocentric: origin,
        timestamps,
        time,
        frequency,
        antennas,
        phase_centre,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    use crate::test_common::{aavs3_position, AAVS3_ECEF};

    #[test]
    fn time_axis_is_centred() {
        let (epochs, time) = time_axis(1_700_000_000.0, 2.0, 3, 0.0).unwrap();
        assert_eq!(time.unix, vec![1_700_000_001.0, 1_700_000_003.0, 1_700_000_005.0]);
        assert_eq!(epochs.len(), 3);
        assert_abs_diff_eq!(time.resolution, 2.0);
        // 2023-11-14T22:13:21 UTC
        assert_abs_diff_eq!(time.mjd[0], 60262.92593750, epsilon = 1e-6);
        for (e, u) in epochs.iter().zip(time.unix.iter()) {
            assert_abs_diff_eq!(e.to_unix_seconds(), *u, epsilon = 1e-6);
        }
    }

    #[test]
    fn no_integrations_is_an_error() {
        assert!(matches!(
            time_axis(0.0, 1.0, 0, 0.0),
            Err(CoordError::NoTimesteps)
        ));
    }

    #[test]
    fn frequency_axis_is_one_based() {
        let f = frequency_axis(1, 1e6, 1e6, 10);
        assert_eq!(f.centres, vec![1e7]);
        assert!(!f.oversampled());

        let f = frequency_axis(3, 781250.0, 925926.0, 2);
        assert_eq!(f.centres, vec![1562500.0, 3125000.0, 4687500.0]);
        assert!(f.oversampled());
    }

    #[test]
    fn apparent_and_mean_sidereal_times_are_close() {
        let pos = aavs3_position();
        let epoch = Epoch::from_unix_seconds(1_700_000_000.0);
        let last = local_apparent_sidereal_time(epoch, pos.longitude_rad);
        let lmst = get_lmst(pos.longitude_rad, epoch, Duration::from_seconds(0.0));
        let mut diff = (last - lmst).abs();
        if diff > TAU / 2.0 {
            diff = TAU - diff;
        }
        // The equation of the equinoxes is at most ~1.2 s of time.
        assert!(diff < 1e-4, "LAST {last} and LMST {lmst} differ by {diff}");
    }

    #[test]
    fn zenith_is_near_the_meridian() {
        let pos = aavs3_position();
        let epoch = Epoch::from_unix_seconds(1_700_000_000.0);
        let pc = zenith_phase_centre(pos, epoch);
        let lmst = get_lmst(pos.longitude_rad, epoch, Duration::from_seconds(0.0));
        // Precession since J2000 is well under a degree.
        assert_abs_diff_eq!(pc.dec, pos.latitude_rad, epsilon = 0.5_f64.to_radians());
        let mut dra = (pc.ra - lmst).abs();
        if dra > TAU / 2.0 {
            dra = TAU - dra;
        }
        assert!(dra < 1.0_f64.to_radians());
    }

    #[test]
    fn enu_origin_maps_to_the_array_origin() {
        let origin = XyzGeocentric {
            x: AAVS3_ECEF[0],
            y: AAVS3_ECEF[1],
            z: AAVS3_ECEF[2],
        };
        let pos = origin.to_earth_wgs84();
        let enu = array![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let ecef = enu_to_ecef(enu.view(), pos, origin);
        assert_abs_diff_eq!(ecef[(0, 0)], origin.x);
        assert_abs_diff_eq!(ecef[(0, 1)], origin.y);
        assert_abs_diff_eq!(ecef[(0, 2)], origin.z);

        // Offsets keep their length.
        for (i, len) in [(1, 10.0), (2, 1.0)] {
            let d = [
                ecef[(i, 0)] - origin.x,
                ecef[(i, 1)] - origin.y,
                ecef[(i, 2)] - origin.z,
            ];
            let norm = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
            assert_abs_diff_eq!(norm, len, epsilon = 1e-9);
        }

        // "Up" is roughly along the geocentric radius.
        let r = (origin.x.powi(2) + origin.y.powi(2) + origin.z.powi(2)).sqrt();
        let up = [
            ecef[(2, 0)] - origin.x,
            ecef[(2, 1)] - origin.y,
            ecef[(2, 2)] - origin.z,
        ];
        let cos_angle = (up[0] * origin.x + up[1] * origin.y + up[2] * origin.z) / r;
        assert!(cos_angle > 0.99);
    }
}
