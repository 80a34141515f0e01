//! Synthetic captures, station configs and UVX models for tests.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use hdf5::File;
use marlu::{c32, LatLngHeight, RADec, XyzGeocentric};
use ndarray::prelude::*;

use crate::{
    attrs::{empty_context, Scalar, Value},
    coords::{antenna_table, frequency_axis, time_axis, AntennaPositions},
    h5::{write_scalar_attr, H5Complex, H5Error},
    vis::{baselines_for, to_time_baseline_freq},
    AttrMap, PhaseCentre, Uvx, POLARISATIONS,
};

/// Roughly where AAVS3 is.
pub(crate) const AAVS3_ECEF: [f64; 3] = [-2559454.08, 5095372.14, -2849057.18];

pub(crate) const TSAMP: f64 = 1.9818086;
pub(crate) const CHANNEL_SPACING: f64 = 781250.0;
pub(crate) const CHANNEL_WIDTH: f64 = 925926.0;

pub(crate) fn aavs3_position() -> LatLngHeight {
    XyzGeocentric {
        x: AAVS3_ECEF[0],
        y: AAVS3_ECEF[1],
        z: AAVS3_ECEF[2],
    }
    .to_earth_wgs84()
}

/// Antennas spaced 10 m apart along east.
pub(crate) fn east_line(num_ants: usize) -> AntennaPositions {
    AntennaPositions {
        names: (0..num_ants).map(|i| format!("ant{i:03}")).collect(),
        flags: vec![false; num_ants],
        enu: Array2::from_shape_fn((num_ants, 3), |(i, j)| if j == 0 { i as f64 * 10.0 } else { 0.0 }),
    }
}

/// Write `antennas.txt` and `uv_config.yaml` into `dir`; returns the YAML's
/// path.
pub(crate) fn write_station_yaml(
    dir: &Path,
    num_ants: usize,
    conjugate: bool,
    transpose: bool,
) -> PathBuf {
    let ants = east_line(num_ants);
    let mut f = std::fs::File::create(dir.join("antennas.txt")).unwrap();
    writeln!(f, "name E N U flagged").unwrap();
    for (name, enu) in ants.names.iter().zip(ants.enu.outer_iter()) {
        writeln!(f, "{name} {} {} {} False", enu[0], enu[1], enu[2]).unwrap();
    }

    let yaml = dir.join("uv_config.yaml");
    std::fs::write(
        &yaml,
        format!(
            "telescope_name: test-station
antenna_locations_file: antennas.txt
baseline_order_file: baseline_order.txt
tsamp: {TSAMP}
channel_spacing: {CHANNEL_SPACING}
channel_width: {CHANNEL_WIDTH}
conjugate_hdf5: {conjugate}
transpose_hdf5: {transpose}
receptor_angle: 45.0
vis_units: uncalib
telescope_ECEF_X: {}
telescope_ECEF_Y: {}
telescope_ECEF_Z: {}
",
            AAVS3_ECEF[0], AAVS3_ECEF[1], AAVS3_ECEF[2]
        ),
    )
    .unwrap();
    yaml
}

/// Declare a baseline-major raw payload in a station YAML.
pub(crate) fn use_baseline_major_order(yaml: &Path) {
    let mut f = std::fs::OpenOptions::new().append(true).open(yaml).unwrap();
    writeln!(f, "raw_axis_order: tbfp").unwrap();
}

/// A raw correlator capture to be written by [`RawCapture::write`].
pub(crate) struct RawCapture {
    pub(crate) n_antennas: usize,
    pub(crate) n_chans: usize,
    pub(crate) n_blocks: usize,
    pub(crate) n_samples: usize,
    pub(crate) channel_id: i64,
    pub(crate) ts_start: f64,
    pub(crate) sample_timestamps: Option<f64>,
    pub(crate) omit_attrs: Vec<&'static str>,
    pub(crate) write_payload: bool,
    /// Write the payload as (time, baseline, frequency, pol).
    pub(crate) baseline_major: bool,
    pub(crate) observation_info: Option<Vec<(&'static str, &'static str)>>,
}

impl RawCapture {
    pub(crate) fn new(n_antennas: usize, n_chans: usize, n_integrations: usize) -> RawCapture {
        RawCapture {
            n_antennas,
            n_chans,
            n_blocks: 1,
            n_samples: n_integrations,
            channel_id: 204,
            ts_start: 1_700_000_000.0,
            sample_timestamps: Some(1_700_000_000.0),
            omit_attrs: vec![],
            write_payload: true,
            baseline_major: false,
            observation_info: Some(vec![
                ("description", "test observation"),
                ("firmware_version", "6.2.1"),
                ("software_version", "2.1.0"),
                ("station_config", "station: {id: 1}"),
            ]),
        }
    }

    pub(crate) fn n_baselines(&self) -> usize {
        self.n_antennas * (self.n_antennas + 1) / 2
    }

    /// The payload in default polarisation order, shaped
    /// (time, frequency, baseline, pol).
    pub(crate) fn payload(&self) -> Array4<c32> {
        Array4::from_shape_fn(
            (
                self.n_blocks * self.n_samples,
                self.n_chans,
                self.n_baselines(),
                4,
            ),
            |(t, f, b, p)| {
                c32::new(
                    (t * 1000 + f * 100 + b * 10 + p) as f32,
                    (p as f32 - 1.5) * (b as f32 + 1.0),
                )
            },
        )
    }

    /// Write the capture, returning the payload written.
    pub(crate) fn write(&self, path: &Path) -> Result<Array4<c32>, H5Error> {
        let file = File::create(path)?;
        let root = file.create_group("root")?;
        let n_int = (self.n_blocks * self.n_samples) as f64;
        let attrs: Vec<(&str, Scalar)> = vec![
            ("n_antennas", Scalar::Int(self.n_antennas as i64)),
            ("ts_end", Scalar::Float(self.ts_start + n_int * 1.9818086)),
            ("n_pols", Scalar::Int(2)),
            ("n_beams", Scalar::Int(1)),
            ("tile_id", Scalar::Int(0)),
            ("n_chans", Scalar::Int(self.n_chans as i64)),
            ("n_samples", Scalar::Int(self.n_samples as i64)),
            ("type", Scalar::Int(2)),
            ("data_type", Scalar::from("complex")),
            ("data_mode", Scalar::from("correlator")),
            ("ts_start", Scalar::Float(self.ts_start)),
            ("n_baselines", Scalar::Int(self.n_baselines() as i64)),
            ("n_stokes", Scalar::Int(4)),
            ("channel_id", Scalar::Int(self.channel_id)),
            ("timestamp", Scalar::Float(self.ts_start)),
            ("date_time", Scalar::from("2023-11-14 22:13:20")),
            ("n_blocks", Scalar::Int(self.n_blocks as i64)),
        ];
        for (k, v) in attrs {
            if !self.omit_attrs.contains(&k) {
                write_scalar_attr(&root, k, &v)?;
            }
        }

        let payload = self.payload();
        if self.write_payload {
            let h5 = if self.baseline_major {
                to_time_baseline_freq(payload.view()).mapv(H5Complex::from)
            } else {
                payload.mapv(H5Complex::from)
            };
            file.create_group("correlation_matrix")?
                .new_dataset_builder()
                .with_data(h5.view())
                .create("data")?;
        }

        if let Some(t0) = self.sample_timestamps {
            let timestamps = Array2::from_shape_fn(
                (self.n_blocks * self.n_samples, 1),
                |(i, _)| t0 + i as f64 * TSAMP,
            );
            file.create_group("sample_timestamps")?
                .new_dataset_builder()
                .with_data(timestamps.view())
                .create("data")?;
        }

        if let Some(info) = &self.observation_info {
            let group = file.create_group("observation_info")?;
            for (k, v) in info {
                write_scalar_attr(&group, k, &Scalar::from(*v))?;
            }
        }
        Ok(payload)
    }
}

/// A small, fully populated [`Uvx`].
pub(crate) fn synthetic_uvx() -> Uvx {
    let num_ants = 3;
    let capture = RawCapture::new(num_ants, 3, 2);
    let position = aavs3_position();
    let origin = XyzGeocentric {
        x: AAVS3_ECEF[0],
        y: AAVS3_ECEF[1],
        z: AAVS3_ECEF[2],
    };
    let (_, time) = time_axis(capture.ts_start, TSAMP, 2, position.longitude_rad).unwrap();
    let frequency = frequency_axis(3, CHANNEL_SPACING, CHANNEL_WIDTH, capture.channel_id);

    let mut ant_attrs = AttrMap::new();
    ant_attrs.insert("station_id".to_string(), Value::from("s8-1"));
    ant_attrs.insert(
        "cable_delays".to_string(),
        Value::Mapping(BTreeMap::from([
            ("ant000".to_string(), Scalar::Float(1.5e-9)),
            ("ant001".to_string(), Scalar::Float(-0.5e-9)),
        ])),
    );
    let mut ants = east_line(num_ants);
    ants.flags[2] = true;
    let antennas = antenna_table(ants, position, origin, 45.0, ant_attrs);

    let mut provenance = AttrMap::new();
    provenance.insert(
        "input_files".to_string(),
        Value::Mapping(BTreeMap::from([
            ("data_filename".to_string(), Scalar::from("/data/capture.hdf5")),
            ("config_filename".to_string(), Scalar::from("/config/uv_config.yaml")),
        ])),
    );
    provenance.insert(
        "input_metadata".to_string(),
        Value::Mapping(BTreeMap::from([
            ("n_integrations".to_string(), Scalar::Int(2)),
            ("conjugate_hdf5".to_string(), Scalar::Bool(false)),
            ("data_shape".to_string(), Scalar::IntList(vec![2, 3, 6, 4])),
            ("ecef".to_string(), Scalar::FloatList(AAVS3_ECEF.to_vec())),
        ])),
    );
    provenance.insert("history".to_string(), Value::from("synthetic"));

    let mut context = empty_context();
    context.insert("observer".to_string(), Value::from("A. Observer"));
    context.insert("intent".to_string(), Value::from("Test round trips"));

    Uvx {
        name: "test-station".to_string(),
        antennas,
        time,
        frequency,
        baselines: baselines_for(num_ants, capture.n_baselines()).unwrap(),
        polarisations: POLARISATIONS.to_vec(),
        data: capture.payload(),
        data_unit: "uncalib".to_string(),
        phase_centre: PhaseCentre::fixed(RADec::from_degrees(123.4, -26.7)),
        provenance,
        context,
    }
}
