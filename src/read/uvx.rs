//! Read UVX files written by [`crate::write_uvx`].

use std::{collections::BTreeMap, path::Path};

use hdf5::{Dataset, File, Group, Location};
use log::{debug, warn};
use marlu::c32;
use ndarray::prelude::*;

use super::UvxReadError;
use crate::{
    attrs::{AttrMap, Scalar, Value},
    h5::{read_scalar_attrs, read_text_dataset, H5Complex},
    vis::LayoutError,
    AntennaTable, FrequencyAxis, PhaseCentre, Polarisation, TimeAxis, Uvx, UVX_CLASS,
};

/// Open groups and datasets relative to the file, turning anything missing
/// into a schema mismatch.
struct Reader<'a> {
    path: &'a Path,
    file: File,
}

impl Reader<'_> {
    fn mismatch(&self, object: &str) -> UvxReadError {
        UvxReadError::SchemaMismatch {
            file: self.path.to_path_buf(),
            object: object.to_string(),
        }
    }

    fn hdf5(&self, err: hdf5::Error) -> UvxReadError {
        UvxReadError::Hdf5 {
            file: self.path.to_path_buf(),
            err,
        }
    }

    fn group(&self, name: &str) -> Result<Group, UvxReadError> {
        self.file.group(name).map_err(|_| self.mismatch(name))
    }

    fn dataset(&self, name: &str) -> Result<Dataset, UvxReadError> {
        self.file.dataset(name).map_err(|_| self.mismatch(name))
    }

    fn f64s(&self, name: &str) -> Result<Vec<f64>, UvxReadError> {
        self.dataset(name)?
            .read_raw::<f64>()
            .map_err(|e| self.hdf5(e))
    }

    fn f64_triple(&self, name: &str) -> Result<[f64; 3], UvxReadError> {
        let v = self.f64s(name)?;
        <[f64; 3]>::try_from(v.as_slice()).map_err(|_| UvxReadError::BadShape {
            file: self.path.to_path_buf(),
            object: name.to_string(),
            got: vec![v.len()],
        })
    }

    fn texts(&self, name: &str) -> Result<Vec<String>, UvxReadError> {
        read_text_dataset(&self.dataset(name)?).map_err(|e| self.hdf5(e))
    }

    fn attrs(&self, loc: &Location) -> Result<BTreeMap<String, Scalar>, UvxReadError> {
        read_scalar_attrs(loc).map_err(|e| self.hdf5(e))
    }

    /// A required attribute of `object`.
    fn attr(
        &self,
        attrs: &BTreeMap<String, Scalar>,
        object: &str,
        key: &str,
    ) -> Result<Scalar, UvxReadError> {
        attrs
            .get(key)
            .cloned()
            .ok_or_else(|| self.mismatch(&format!("{object}@{key}")))
    }

    fn text_attr(
        &self,
        attrs: &BTreeMap<String, Scalar>,
        object: &str,
        key: &str,
    ) -> Result<String, UvxReadError> {
        self.attr(attrs, object, key)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.mismatch(&format!("{object}@{key}")))
    }

    fn f64_attr(
        &self,
        attrs: &BTreeMap<String, Scalar>,
        object: &str,
        key: &str,
    ) -> Result<f64, UvxReadError> {
        self.attr(attrs, object, key)?
            .as_f64()
            .ok_or_else(|| self.mismatch(&format!("{object}@{key}")))
    }
}

/// Read a UVX file.
pub fn read_uvx<P: AsRef<Path>>(path: P) -> Result<Uvx, UvxReadError> {
    let path = path.as_ref();
    debug!("Reading UVX from {}", path.display());
    let file = File::open(path).map_err(|err| UvxReadError::Hdf5 {
        file: path.to_path_buf(),
        err,
    })?;
    let r = Reader { path, file };

    let root_attrs = r.attrs(&r.file)?;
    match (root_attrs.get("CLASS"), root_attrs.get("VERSION")) {
        (Some(class), Some(version)) => {
            debug!("{} is {class} version {version}", path.display());
            if class.as_str() != Some(UVX_CLASS) {
                warn!("{} has CLASS '{class}', not '{UVX_CLASS}'", path.display());
            }
        }
        _ => warn!("{} doesn't record its CLASS and VERSION", path.display()),
    }
    let name = r.text_attr(&root_attrs, "/", "name")?;

    let data = r.dataset("visibilities/data")?;
    let data_attrs = r.attrs(&data)?;
    let data_unit = r.text_attr(&data_attrs, "visibilities/data", "unit")?;
    let data = data
        .read::<H5Complex, Ix4>()
        .map_err(|e| r.hdf5(e))?
        .mapv(c32::from);

    let time_group = r.group("visibilities/coords/time")?;
    let time_attrs = r.attrs(&time_group)?;
    let time = TimeAxis {
        mjd: r.f64s("visibilities/coords/time/mjd")?,
        lst: r.f64s("visibilities/coords/time/lst")?,
        unix: r.f64s("visibilities/coords/time/unix")?,
        resolution: r.f64_attr(&time_attrs, "visibilities/coords/time", "resolution")?,
    };

    let baseline_group = r.group("visibilities/coords/baseline")?;
    let read_ants = |name: &str| -> Result<Vec<usize>, UvxReadError> {
        let ds = baseline_group
            .dataset(name)
            .map_err(|_| r.mismatch(&format!("visibilities/coords/baseline/{name}")))?;
        Ok(ds
            .read_raw::<u64>()
            .map_err(|e| r.hdf5(e))?
            .into_iter()
            .map(|a| a as usize)
            .collect())
    };
    let ant1 = read_ants("ant1")?;
    let ant2 = read_ants("ant2")?;
    if ant1.len() != ant2.len() {
        return Err(UvxReadError::BadShape {
            file: path.to_path_buf(),
            object: "visibilities/coords/baseline/ant2".to_string(),
            got: vec![ant2.len()],
        });
    }
    let baselines = ant1.into_iter().zip(ant2).collect();

    let freq_name = "visibilities/coords/frequency";
    let freq_ds = r.dataset(freq_name)?;
    let freq_attrs = r.attrs(&freq_ds)?;
    let frequency = FrequencyAxis {
        centres: r.f64s(freq_name)?,
        channel_spacing: r.f64_attr(&freq_attrs, freq_name, "channel_spacing")?,
        channel_bandwidth: r.f64_attr(&freq_attrs, freq_name, "channel_bandwidth")?,
        channel_id: r
            .attr(&freq_attrs, freq_name, "channel_id")?
            .as_i64()
            .ok_or_else(|| r.mismatch(&format!("{freq_name}@channel_id")))?,
    };

    let pol_labels = r.texts("visibilities/coords/polarization")?;
    let polarisations = pol_labels
        .iter()
        .map(|p| p.parse::<Polarisation>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| LayoutError::UnsupportedPolarisations(pol_labels.clone()))?;

    let antennas = read_antennas(&r)?;

    let phase_centre = PhaseCentre {
        ra: r.f64s("phase_center/ra")?,
        dec: r.f64s("phase_center/dec")?,
    };

    let provenance = read_attr_tree(&r, &r.group("provenance")?)?;
    let context = read_attr_tree(&r, &r.group("context")?)?;

    let uvx = Uvx {
        name,
        antennas,
        time,
        frequency,
        baselines,
        polarisations,
        data,
        data_unit,
        phase_centre,
        provenance,
        context,
    };
    uvx.validate()?;
    Ok(uvx)
}

fn read_antennas(r: &Reader) -> Result<AntennaTable, UvxReadError> {
    let group = r.group("antennas")?;
    let group_attrs = r.attrs(&group)?;
    let read_positions = |name: &str| -> Result<Array2<f64>, UvxReadError> {
        r.dataset(name)?.read_2d::<f64>().map_err(|e| r.hdf5(e))
    };
    let flags = r
        .dataset("antennas/attrs/flags")?
        .read_raw::<bool>()
        .map_err(|e| r.hdf5(e))?;

    Ok(AntennaTable {
        identifiers: r.texts("antennas/attrs/identifier")?,
        flags,
        enu: read_positions("antennas/enu")?,
        ecef: read_positions("antennas/ecef")?,
        origin_geocentric: r.f64_triple("antennas/attrs/array_origin_geocentric")?,
        origin_geodetic: r.f64_triple("antennas/attrs/array_origin_geodetic")?,
        array_rotation_angle: r.f64_attr(&group_attrs, "antennas", "array_rotation_angle")?,
        attrs: read_attr_tree(r, &r.group("antennas/attrs")?)?,
    })
}

/// The inverse of [`crate::write::write_attr_tree`]: attributes become scalars,
/// subgroups become mappings. Datasets are ignored.
fn read_attr_tree(r: &Reader, group: &Group) -> Result<AttrMap, UvxReadError> {
    let mut tree: AttrMap = r
        .attrs(group)?
        .into_iter()
        .map(|(k, s)| (k, Value::Scalar(s)))
        .collect();
    for sub in group.groups().map_err(|e| r.hdf5(e))? {
        let full_name = sub.name();
        let key = full_name.rsplit('/').next().unwrap_or(&full_name).to_string();
        tree.insert(key, Value::Mapping(r.attrs(&sub)?));
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::{test_common::synthetic_uvx, write_uvx};

    #[test]
    fn round_trip_is_exact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.uvx");
        let uvx = synthetic_uvx();
        write_uvx(&uvx, &path).unwrap();
        let read = read_uvx(&path).unwrap();

        assert_eq!(read.name, uvx.name);
        assert_eq!(read.antennas, uvx.antennas);
        assert_eq!(read.time, uvx.time);
        assert_eq!(read.frequency, uvx.frequency);
        assert_eq!(read.baselines, uvx.baselines);
        assert_eq!(read.polarisations, uvx.polarisations);
        assert_eq!(read.data, uvx.data);
        assert_eq!(read.data_unit, uvx.data_unit);
        assert_eq!(read.phase_centre, uvx.phase_centre);
        assert_eq!(read.provenance, uvx.provenance);
        assert_eq!(read.context, uvx.context);
        assert_eq!(read, uvx);
    }

    #[test]
    fn class_and_version_are_recorded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.uvx");
        write_uvx(&synthetic_uvx(), &path).unwrap();
        let file = File::open(&path).unwrap();
        let attrs = read_scalar_attrs(&file).unwrap();
        assert_eq!(attrs["CLASS"], Scalar::from(UVX_CLASS));
        assert_eq!(attrs["VERSION"], Scalar::from(crate::UVX_VERSION));
    }

    #[test]
    fn missing_group_is_a_schema_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.uvx");
        write_uvx(&synthetic_uvx(), &path).unwrap();
        {
            let file = File::open_rw(&path).unwrap();
            file.unlink("phase_center").unwrap();
        }
        match read_uvx(&path) {
            Err(UvxReadError::SchemaMismatch { object, .. }) => {
                assert_eq!(object, "phase_center/ra")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn non_text_unit_is_a_schema_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.uvx");
        let r = Reader {
            path: &path,
            file: File::create(&path).unwrap(),
        };
        let attrs = BTreeMap::from([
            ("unit".to_string(), Scalar::Int(1)),
            ("name".to_string(), Scalar::from("Jy")),
        ]);
        assert_eq!(r.text_attr(&attrs, "visibilities/data", "name").unwrap(), "Jy");
        match r.text_attr(&attrs, "visibilities/data", "unit") {
            Err(UvxReadError::SchemaMismatch { object, .. }) => {
                assert_eq!(object, "visibilities/data@unit")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn not_a_uvx_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.h5");
        File::create(&path).unwrap();
        assert!(matches!(
            read_uvx(&path),
            Err(UvxReadError::SchemaMismatch { .. })
        ));
    }
}
