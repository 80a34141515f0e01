//! Raw correlator captures.
//!
//! A capture is an HDF5 file with a `root` group carrying a fixed set of
//! attributes, a `correlation_matrix/data` payload of complex64 samples, and
//! optionally `sample_timestamps/data` and an `observation_info` group.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use hdf5::{File, Group};
use log::{debug, trace, warn};
use marlu::c32;
use ndarray::prelude::*;

use super::MetadataError;
use crate::{
    attrs::Scalar,
    h5::{read_scalar_attrs, H5Complex},
};

/// Attributes every capture's `root` group must carry.
pub const REQUIRED_ROOT_ATTRS: [&str; 17] = [
    "n_antennas",
    "ts_end",
    "n_pols",
    "n_beams",
    "tile_id",
    "n_chans",
    "n_samples",
    "type",
    "data_type",
    "data_mode",
    "ts_start",
    "n_baselines",
    "n_stokes",
    "channel_id",
    "timestamp",
    "date_time",
    "n_blocks",
];

pub const CORRELATION_MATRIX: &str = "correlation_matrix/data";
pub const SAMPLE_TIMESTAMPS: &str = "sample_timestamps/data";

/// Firmware and software details recorded alongside a capture.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationInfo {
    pub description: String,
    pub firmware_version: String,
    pub software_version: String,
    pub station_config: String,
}

/// The per-observation facts in a raw capture.
#[derive(Debug, Clone)]
pub struct RawMetadata {
    pub n_antennas: usize,
    pub n_chans: usize,
    pub n_samples: usize,
    pub n_blocks: usize,
    pub n_baselines: usize,
    pub n_stokes: usize,
    pub channel_id: i64,

    /// \[Unix seconds\]. Taken from the first sample timestamp when available.
    pub ts_start: f64,

    /// `n_blocks * n_samples`
    pub n_integrations: usize,

    /// The shape of the correlation-matrix payload.
    pub data_shape: Vec<usize>,

    /// All of the `root` attributes, verbatim.
    pub root_attrs: BTreeMap<String, Scalar>,

    pub observation_info: Option<ObservationInfo>,
}

pub(crate) fn open_capture(path: &Path) -> Result<File, MetadataError> {
    if !path.is_file() {
        return Err(MetadataError::BadFile(path.to_path_buf()));
    }
    File::open(path).map_err(|err| MetadataError::Hdf5 {
        file: path.to_path_buf(),
        err,
    })
}

fn hdf5_err(path: &Path) -> impl Fn(hdf5::Error) -> MetadataError + '_ {
    move |err| MetadataError::Hdf5 {
        file: path.to_path_buf(),
        err,
    }
}

fn get_count(
    attrs: &BTreeMap<String, Scalar>,
    key: &str,
    file: &Path,
) -> Result<usize, MetadataError> {
    let bad = || MetadataError::BadAttribute {
        file: file.to_path_buf(),
        key: key.to_string(),
        expected: "a non-negative integer",
        got: attrs.get(key).map(|s| s.to_string()).unwrap_or_default(),
    };
    let i = attrs.get(key).and_then(Scalar::as_i64).ok_or_else(bad)?;
    usize::try_from(i).map_err(|_| bad())
}

fn get_float(
    attrs: &BTreeMap<String, Scalar>,
    key: &str,
    file: &Path,
) -> Result<f64, MetadataError> {
    attrs
        .get(key)
        .and_then(Scalar::as_f64)
        .ok_or_else(|| MetadataError::BadAttribute {
            file: file.to_path_buf(),
            key: key.to_string(),
            expected: "a number",
            got: attrs.get(key).map(|s| s.to_string()).unwrap_or_default(),
        })
}

/// Read a capture's metadata without touching the payload.
pub fn read_raw_metadata<P: AsRef<Path>>(path: P) -> Result<RawMetadata, MetadataError> {
    let path = path.as_ref();
    debug!("Reading raw capture metadata from {}", path.display());
    let file = open_capture(path)?;
    let to_err = hdf5_err(path);

    let root = file.group("root").map_err(|_| MetadataError::MissingMetadata {
        file: path.to_path_buf(),
        keys: REQUIRED_ROOT_ATTRS.iter().map(|s| s.to_string()).collect(),
    })?;
    let present = root.attr_names().map_err(&to_err)?;
    let missing: Vec<String> = REQUIRED_ROOT_ATTRS
        .iter()
        .filter(|k| !present.iter().any(|p| p == *k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(MetadataError::MissingMetadata {
            file: path.to_path_buf(),
            keys: missing,
        });
    }

    let root_attrs = read_scalar_attrs(&root).map_err(&to_err)?;
    trace!("root attributes: {root_attrs:?}");
    let n_blocks = get_count(&root_attrs, "n_blocks", path)?;
    let n_samples = get_count(&root_attrs, "n_samples", path)?;
    let channel_id = root_attrs
        .get("channel_id")
        .and_then(Scalar::as_i64)
        .ok_or_else(|| MetadataError::BadAttribute {
            file: path.to_path_buf(),
            key: "channel_id".to_string(),
            expected: "an integer",
            got: root_attrs
                .get("channel_id")
                .map(|s| s.to_string())
                .unwrap_or_default(),
        })?;

    let data_shape = file
        .dataset(CORRELATION_MATRIX)
        .map_err(|_| MetadataError::MissingObject {
            file: path.to_path_buf(),
            object: CORRELATION_MATRIX.to_string(),
        })?
        .shape();

    let mut ts_start = get_float(&root_attrs, "ts_start", path)?;
    match first_sample_timestamp(&file).map_err(&to_err)? {
        Some(t) => {
            if t != ts_start {
                debug!("Overriding ts_start {ts_start} with first sample timestamp {t}");
            }
            ts_start = t;
        }
        None => warn!(
            "{} has no sample timestamps; using the root ts_start",
            path.display()
        ),
    }

    let observation_info = if file.link_exists("observation_info") {
        let group = file.group("observation_info").map_err(&to_err)?;
        read_observation_info(&group).map_err(&to_err)?
    } else {
        debug!("{} has no observation_info", path.display());
        None
    };

    Ok(RawMetadata {
        n_antennas: get_count(&root_attrs, "n_antennas", path)?,
        n_chans: get_count(&root_attrs, "n_chans", path)?,
        n_samples,
        n_blocks,
        n_baselines: get_count(&root_attrs, "n_baselines", path)?,
        n_stokes: get_count(&root_attrs, "n_stokes", path)?,
        channel_id,
        ts_start,
        n_integrations: n_blocks * n_samples,
        data_shape,
        root_attrs,
        observation_info,
    })
}

fn first_sample_timestamp(file: &File) -> hdf5::Result<Option<f64>> {
    if !file.link_exists("sample_timestamps") {
        return Ok(None);
    }
    let group = file.group("sample_timestamps")?;
    if !group.link_exists("data") {
        return Ok(None);
    }
    let ds = group.dataset("data")?;
    if ds.size() == 0 {
        return Ok(None);
    }
    // Only the first element is needed; timestamps come either flat or as a
    // (sample, 1) column.
    let first = match ds.ndim() {
        1 => ds.read_slice_1d::<f64, _>(s![0..1])?,
        2 => ds.read_slice_1d::<f64, _>(s![0..1, 0])?,
        _ => return Ok(ds.read_raw::<f64>()?.first().copied()),
    };
    Ok(first.first().copied())
}

fn read_observation_info(group: &Group) -> hdf5::Result<Option<ObservationInfo>> {
    let attrs = read_scalar_attrs(group)?;
    let get = |k: &str| attrs.get(k).map(|s| s.to_string());
    match (
        get("description"),
        get("firmware_version"),
        get("software_version"),
        get("station_config"),
    ) {
        (Some(description), Some(firmware_version), Some(software_version), Some(station_config)) => {
            Ok(Some(ObservationInfo {
                description,
                firmware_version,
                software_version,
                station_config,
            }))
        }
        _ => {
            warn!("Could not find expected keys in observation_info");
            warn!("{:?}", attrs.keys().collect::<Vec<_>>());
            Ok(None)
        }
    }
}

/// Read a capture's whole correlation-matrix payload, in its native axis
/// order.
pub fn read_correlation_matrix<P: AsRef<Path>>(path: P) -> Result<Array4<c32>, MetadataError> {
    let path = path.as_ref();
    let file = open_capture(path)?;
    let ds = file
        .dataset(CORRELATION_MATRIX)
        .map_err(|_| MetadataError::MissingObject {
            file: path.to_path_buf(),
            object: CORRELATION_MATRIX.to_string(),
        })?;
    debug!("Reading {} {:?}", CORRELATION_MATRIX, ds.shape());
    let raw = ds.read::<H5Complex, Ix4>().map_err(hdf5_err(path))?;
    Ok(raw.mapv(c32::from))
}

/// Make a path absolute without requiring it to exist.
pub(crate) fn absolute_path(path: &Path) -> PathBuf {
    crate::config::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    use crate::test_common::RawCapture;

    #[test]
    fn metadata_is_read_without_the_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.hdf5");
        let capture = RawCapture::new(3, 2, 2);
        capture.write(&path).unwrap();

        let md = read_raw_metadata(&path).unwrap();
        assert_eq!(md.n_antennas, 3);
        assert_eq!(md.n_chans, 2);
        assert_eq!(md.n_baselines, 6);
        assert_eq!(md.n_integrations, 2);
        assert_eq!(md.data_shape, vec![2, 2, 6, 4]);
        assert_eq!(md.channel_id, capture.channel_id);
        assert_eq!(md.root_attrs.len(), REQUIRED_ROOT_ATTRS.len());
        assert_eq!(md.root_attrs["data_type"], Scalar::from("complex"));
        assert!(md.observation_info.is_some());
    }

    #[test]
    fn sample_timestamps_override_ts_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.hdf5");
        let mut capture = RawCapture::new(2, 1, 4);
        capture.sample_timestamps = Some(capture.ts_start + 3600.0);
        capture.write(&path).unwrap();
        let md = read_raw_metadata(&path).unwrap();
        assert_abs_diff_eq!(md.ts_start, capture.ts_start + 3600.0);

        capture.sample_timestamps = None;
        capture.write(&path).unwrap();
        let md = read_raw_metadata(&path).unwrap();
        assert_abs_diff_eq!(md.ts_start, capture.ts_start);
    }

    #[test]
    fn flat_sample_timestamps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.hdf5");
        let mut capture = RawCapture::new(2, 1, 3);
        capture.sample_timestamps = None;
        capture.write(&path).unwrap();
        let timestamps = [1_700_000_100.0, 1_700_000_102.0, 1_700_000_104.0];
        {
            let file = File::open_rw(&path).unwrap();
            file.create_group("sample_timestamps")
                .unwrap()
                .new_dataset_builder()
                .with_data(ArrayView1::from(&timestamps[..]))
                .create("data")
                .unwrap();
        }
        let md = read_raw_metadata(&path).unwrap();
        assert_abs_diff_eq!(md.ts_start, 1_700_000_100.0);
    }

    #[test]
    fn empty_sample_timestamps_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.hdf5");
        let mut capture = RawCapture::new(2, 1, 1);
        capture.sample_timestamps = None;
        capture.write(&path).unwrap();
        {
            let file = File::open_rw(&path).unwrap();
            file.create_group("sample_timestamps")
                .unwrap()
                .new_dataset::<f64>()
                .shape((0, 1))
                .create("data")
                .unwrap();
        }
        let md = read_raw_metadata(&path).unwrap();
        assert_abs_diff_eq!(md.ts_start, capture.ts_start);
    }

    #[test]
    fn missing_n_baselines_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.hdf5");
        let mut capture = RawCapture::new(2, 1, 1);
        capture.omit_attrs = vec!["n_baselines"];
        // No payload either: the check must happen before any payload access.
        capture.write_payload = false;
        capture.write(&path).unwrap();

        match read_raw_metadata(&path) {
            Err(MetadataError::MissingMetadata { keys, .. }) => {
                assert_eq!(keys, vec!["n_baselines".to_string()])
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn incomplete_observation_info_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.hdf5");
        let mut capture = RawCapture::new(2, 1, 1);
        capture.observation_info = Some(vec![("description", "drift scan")]);
        capture.write(&path).unwrap();
        let md = read_raw_metadata(&path).unwrap();
        assert!(md.observation_info.is_none());

        capture.observation_info = None;
        capture.write(&path).unwrap();
        let md = read_raw_metadata(&path).unwrap();
        assert!(md.observation_info.is_none());
    }

    #[test]
    fn payload_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.hdf5");
        let capture = RawCapture::new(2, 3, 2);
        let payload = capture.write(&path).unwrap();
        let read = read_correlation_matrix(&path).unwrap();
        assert_eq!(read, payload);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            read_raw_metadata("/does/not/exist.hdf5"),
            Err(MetadataError::BadFile(_))
        ));
    }
}
