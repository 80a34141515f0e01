//! SDP-style visibilities: (time, baseline, frequency, polarisation) with
//! everything a calibration framework needs alongside.

use std::{collections::BTreeMap, path::Path};

use log::{debug, trace};
use marlu::{c32, RADec};
use ndarray::prelude::*;

use super::{ExportError, ExportOptions, ScanInfo};
use crate::{
    attrs::{Scalar, Value},
    config::{ConfigRegistry, ConfigSource},
    coords::{build_frame, AntennaSource},
    read::{load_observation_metadata, read_correlation_matrix},
    uvw::{apply_phase_correction, compute_phase_correction, compute_uvw, negate_uvw, uvx_uvws},
    vis::{
        baselines_for, build_visibility_array, check_payload_shape, raw_payload_shape,
        to_time_baseline_freq, LayoutError,
    },
    AntennaTable, PhaseCentre, Polarisation, Uvx, POLARISATIONS,
};

/// Seconds in a day, for MJD seconds.
const SECONDS_PER_DAY: f64 = 86400.0;

/// JD - MJD.
const MJD_OFFSET: f64 = 2400000.5;

/// The array the visibilities came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TelescopeConfiguration {
    pub name: String,

    pub station_names: Vec<String>,

    pub station_ids: Vec<String>,

    /// The array origin, geocentric \[metres\].
    pub location: [f64; 3],

    /// Station ECEF positions, shaped (station, 3) \[metres\].
    pub xyz: Array2<f64>,

    pub receptor_frame: String,

    pub mount: String,

    /// \[metres\]
    pub diameter: Vec<f64>,
}

impl TelescopeConfiguration {
    fn new(name: &str, names: Vec<String>, location: [f64; 3], xyz: Array2<f64>) -> Self {
        let num_stations = names.len();
        TelescopeConfiguration {
            name: name.to_string(),
            station_names: names,
            station_ids: (0..num_stations).map(|i| i.to_string()).collect(),
            location,
            xyz,
            receptor_frame: "linear".to_string(),
            mount: "altaz".to_string(),
            diameter: vec![1.0; num_stations],
        }
    }

    fn from_antennas(name: &str, antennas: &AntennaTable) -> Self {
        Self::new(
            name,
            antennas.identifiers.clone(),
            antennas.origin_geocentric,
            antennas.ecef.clone(),
        )
    }
}

/// Visibilities laid out for SDP-style consumers.
#[derive(Debug, Clone)]
pub struct ExportedVisibility {
    /// Shaped (time, baseline, frequency, polarisation).
    pub vis: Array4<c32>,

    /// Same shape as `vis`; all ones.
    pub weight: Array4<f32>,

    /// Same shape as `vis`; all unflagged.
    pub flags: Array4<bool>,

    /// Shaped (time, baseline, 3) \[metres\].
    pub uvw: Array3<f64>,

    /// \[MJD seconds\]
    pub time: Vec<f64>,

    /// \[seconds\]
    pub integration_time: Vec<f64>,

    /// \[Hz\]
    pub frequency: Vec<f64>,

    /// \[Hz\]
    pub channel_bandwidth: Vec<f64>,

    pub baselines: Vec<(usize, usize)>,

    pub configuration: TelescopeConfiguration,

    pub polarisation_frame: String,

    pub polarisations: Vec<Polarisation>,

    pub phase_centre: RADec,

    pub source: String,

    pub scan_id: i64,

    pub scan_intent: String,

    pub execblock_id: String,

    pub meta: BTreeMap<String, Scalar>,
}

/// The parts every SDP adapter supplies.
struct Parts {
    /// (time, baseline, frequency, polarisation)
    vis: Array4<c32>,
    /// Not negated.
    uvw: Array3<f64>,
    mjd: Vec<f64>,
    integration_time: Vec<f64>,
    frequency: Vec<f64>,
    channel_bandwidth: Vec<f64>,
    baselines: Vec<(usize, usize)>,
    configuration: TelescopeConfiguration,
    phase_centre: RADec,
    source: Option<String>,
    meta: BTreeMap<String, Scalar>,
}

impl Parts {
    /// Apply the export toggles and fill in the defaults.
    fn finish(
        self,
        opts: &ExportOptions,
        scan: &ScanInfo,
    ) -> Result<ExportedVisibility, ExportError> {
        let Parts {
            mut vis,
            mut uvw,
            mjd,
            integration_time,
            frequency,
            channel_bandwidth,
            baselines,
            configuration,
            phase_centre,
            source,
            meta,
        } = self;

        if opts.apply_phase_tracking {
            debug!("Applying zenith-tracking phase correction");
            let phase = compute_phase_correction(uvw.view(), &frequency);
            apply_phase_correction(vis.view_mut().permuted_axes([0, 2, 1, 3]), phase.view())?;
        }
        if opts.conjugate_on_export {
            debug!("Conjugating exported visibilities");
            vis.par_mapv_inplace(|v| v.conj());
        }
        if opts.negate_uvw {
            negate_uvw(&mut uvw);
        }

        let source = source.unwrap_or_else(|| {
            format!("Zenith_at_mjd_{}", mjd.first().copied().unwrap_or_default())
        });
        trace!("Exported visibility dimensions: {:?}", vis.dim());
        Ok(ExportedVisibility {
            weight: Array4::ones(vis.dim()),
            flags: Array4::from_elem(vis.dim(), false),
            vis,
            uvw,
            time: mjd.iter().map(|m| m * SECONDS_PER_DAY).collect(),
            integration_time,
            frequency,
            channel_bandwidth,
            baselines,
            configuration,
            polarisation_frame: "linear".to_string(),
            polarisations: POLARISATIONS.to_vec(),
            phase_centre,
            source,
            scan_id: scan.scan_id,
            scan_intent: scan.scan_intent.clone(),
            execblock_id: scan.execblock_id.clone(),
            meta,
        })
    }
}

pub(super) fn uvx_to_sdp_vis(
    uvx: &Uvx,
    opts: &ExportOptions,
    scan: &ScanInfo,
) -> Result<ExportedVisibility, ExportError> {
    uvx.validate()?;
    if uvx.polarisations != POLARISATIONS {
        return Err(LayoutError::UnsupportedPolarisations(
            uvx.polarisations.iter().map(|p| p.to_string()).collect(),
        )
        .into());
    }
    let meta = match uvx.provenance.get("input_metadata") {
        Some(Value::Mapping(m)) => m.clone(),
        _ => BTreeMap::new(),
    };
    let parts = Parts {
        vis: to_time_baseline_freq(uvx.data.view()),
        uvw: uvx_uvws(uvx)?,
        mjd: uvx.time.mjd.clone(),
        integration_time: vec![uvx.time.resolution; uvx.time.len()],
        frequency: uvx.frequency.centres.clone(),
        channel_bandwidth: vec![uvx.frequency.channel_bandwidth; uvx.frequency.len()],
        baselines: uvx.baselines.clone(),
        configuration: TelescopeConfiguration::from_antennas(&uvx.name, &uvx.antennas),
        phase_centre: uvx.phase_centre.radec(0),
        source: None,
        meta,
    };
    parts.finish(opts, scan)
}

/// Export a raw capture straight to SDP-style visibilities, without going
/// through [`Uvx`]. The payload is permuted but the station's
/// conjugate/transpose policy is not applied.
pub fn raw_to_sdp_vis<P: AsRef<Path>>(
    raw_path: P,
    config_source: &ConfigSource,
    registry: &ConfigRegistry,
    opts: &ExportOptions,
    scan: &ScanInfo,
) -> Result<ExportedVisibility, ExportError> {
    let raw_path = raw_path.as_ref();
    let metadata = load_observation_metadata(raw_path, config_source, registry)?;
    let frame = build_frame(&metadata, AntennaSource::LocationsFile)?;
    let raw = &metadata.raw;
    let baselines = baselines_for(raw.n_antennas, raw.n_baselines)?;
    check_payload_shape(
        &raw.data_shape,
        raw_payload_shape(
            metadata.config.raw_axis_order,
            raw.n_integrations,
            raw.n_chans,
            raw.n_baselines,
            raw.n_stokes,
        ),
    )?;

    let payload = read_correlation_matrix(raw_path)?;
    let vis = build_visibility_array(payload, metadata.config.raw_axis_order, false, false)?;
    let uvw = compute_uvw(
        &frame.antennas.xyz_geodetic(),
        &baselines,
        &PhaseCentre::fixed(frame.phase_centre),
        &frame.timestamps,
        frame.array_position,
    )?;

    let parts = Parts {
        vis: to_time_baseline_freq(vis.view()),
        uvw,
        integration_time: vec![frame.time.resolution; frame.time.len()],
        mjd: frame.time.mjd,
        channel_bandwidth: vec![frame.frequency.channel_bandwidth; frame.frequency.len()],
        frequency: frame.frequency.centres,
        baselines,
        configuration: TelescopeConfiguration::from_antennas(
            &metadata.config.telescope_name,
            &frame.antennas,
        ),
        phase_centre: frame.phase_centre,
        source: None,
        meta: metadata.to_scalars(),
    };
    parts.finish(opts, scan)
}

/// A baseline-time visibility dataset built elsewhere, in the style of
/// pyuvdata. Rows are ordered time-major: all baselines of the first time,
/// then all of the second, and so on.
#[derive(Debug, Clone)]
pub struct GenericVisDataset {
    pub telescope_name: String,

    /// Geocentric \[metres\].
    pub telescope_location: [f64; 3],

    pub antenna_names: Vec<String>,

    /// ECEF positions, shaped (antenna, 3) \[metres\].
    pub antenna_positions: Array2<f64>,

    pub num_times: usize,

    pub num_baselines: usize,

    /// One per row \[Julian date\].
    pub time_array: Vec<f64>,

    /// One per row \[seconds\].
    pub integration_time: Vec<f64>,

    pub ant_1_array: Vec<usize>,

    pub ant_2_array: Vec<usize>,

    /// Shaped (row, 3) \[metres\].
    pub uvw_array: Array2<f64>,

    /// Shaped (spectral window, channel) \[Hz\].
    pub freq_array: Array2<f64>,

    /// \[Hz\]
    pub channel_width: f64,

    /// Polarisation labels, in the order of the data's last axis.
    pub polarisations: Vec<String>,

    /// Shaped (row, channel, polarisation).
    pub data_array: Array3<c32>,

    pub phase_centre_name: String,

    pub phase_centre: RADec,
}

/// For each canonical polarisation, its index among `labels`.
fn polarisation_remap(labels: &[String]) -> Result<[usize; 4], LayoutError> {
    let unsupported = || LayoutError::UnsupportedPolarisations(labels.to_vec());
    if labels.len() != 4 {
        return Err(unsupported());
    }
    let parsed = labels
        .iter()
        .map(|l| l.to_uppercase().parse::<Polarisation>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| unsupported())?;
    let mut remap = [0; 4];
    for (slot, pol) in remap.iter_mut().zip(POLARISATIONS) {
        *slot = parsed
            .iter()
            .position(|&p| p == pol)
            .ok_or_else(unsupported)?;
    }
    Ok(remap)
}

/// Re-derive SDP-style visibilities from a [`GenericVisDataset`].
/// Polarisations are reordered by label into XX, XY, YX, YY.
pub fn generic_to_sdp_vis(
    ds: &GenericVisDataset,
    opts: &ExportOptions,
    scan: &ScanInfo,
) -> Result<ExportedVisibility, ExportError> {
    match ds.freq_array.len_of(Axis(0)) {
        0 => return Err(LayoutError::NoSpectralWindows.into()),
        1 => (),
        num_spws => return Err(LayoutError::MultipleSpectralWindows(num_spws).into()),
    }
    let remap = polarisation_remap(&ds.polarisations)?;
    debug!("Polarisation remap {:?} -> {remap:?}", ds.polarisations);

    let (num_times, num_baselines) = (ds.num_times, ds.num_baselines);
    let num_rows = num_times * num_baselines;
    for (what, got) in [
        ("time rows", ds.time_array.len()),
        ("integration times", ds.integration_time.len()),
        ("ant1 rows", ds.ant_1_array.len()),
        ("ant2 rows", ds.ant_2_array.len()),
        ("UVW rows", ds.uvw_array.len_of(Axis(0))),
        ("data rows", ds.data_array.len_of(Axis(0))),
    ] {
        if got != num_rows {
            return Err(ExportError::BadLength {
                what,
                got,
                expected: num_rows,
            });
        }
    }
    let frequency = ds.freq_array.row(0).to_vec();
    let (_, num_chans, num_pols) = ds.data_array.dim();
    if num_chans != frequency.len() || num_pols != ds.polarisations.len() {
        return Err(LayoutError::ShapeMismatch {
            expected: vec![num_rows, frequency.len(), ds.polarisations.len()],
            got: ds.data_array.shape().to_vec(),
        }
        .into());
    }
    if ds.uvw_array.len_of(Axis(1)) != 3 {
        return Err(LayoutError::ShapeMismatch {
            expected: vec![num_rows, 3],
            got: ds.uvw_array.shape().to_vec(),
        }
        .into());
    }
    let num_ants = ds.antenna_names.len();
    if ds.antenna_positions.dim() != (num_ants, 3) {
        return Err(LayoutError::ShapeMismatch {
            expected: vec![num_ants, 3],
            got: ds.antenna_positions.shape().to_vec(),
        }
        .into());
    }
    if let Some((&ant1, &ant2)) = ds
        .ant_1_array
        .iter()
        .zip(&ds.ant_2_array)
        .find(|&(&a1, &a2)| a1 >= num_ants || a2 >= num_ants)
    {
        return Err(LayoutError::BadBaseline {
            ant1,
            ant2,
            num_ants,
        }
        .into());
    }

    let vis = Array4::from_shape_fn(
        (num_times, num_baselines, num_chans, 4),
        |(t, b, f, p)| ds.data_array[(t * num_baselines + b, f, remap[p])],
    );
    let uvw = Array3::from_shape_fn((num_times, num_baselines, 3), |(t, b, i)| {
        ds.uvw_array[(t * num_baselines + b, i)]
    });
    let rows = (0..num_times).map(|t| t * num_baselines);

    let parts = Parts {
        vis,
        uvw,
        mjd: rows.clone().map(|r| ds.time_array[r] - MJD_OFFSET).collect(),
        integration_time: rows.map(|r| ds.integration_time[r]).collect(),
        channel_bandwidth: vec![ds.channel_width; frequency.len()],
        frequency,
        baselines: ds
            .ant_1_array
            .iter()
            .zip(&ds.ant_2_array)
            .take(num_baselines)
            .map(|(&a1, &a2)| (a1, a2))
            .collect(),
        configuration: TelescopeConfiguration::new(
            &ds.telescope_name,
            ds.antenna_names.clone(),
            ds.telescope_location,
            ds.antenna_positions.clone(),
        ),
        phase_centre: ds.phase_centre,
        source: Some(ds.phase_centre_name.clone()),
        meta: BTreeMap::new(),
    };
    parts.finish(opts, scan)
}
