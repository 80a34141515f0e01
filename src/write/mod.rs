//! Write UVX files.
//!
//! The layout is:
//!
//! ```text
//! /                        CLASS, VERSION, name
//! /visibilities/data       (time, frequency, baseline, polarization)
//! /visibilities/coords/    time/{mjd,lst,unix}, baseline/{ant1,ant2},
//!                          frequency, polarization
//! /visibilities/dims       axis lengths
//! /antennas/{enu,ecef}     (antenna, spatial)
//! /antennas/coords/        antenna, spatial
//! /antennas/attrs/         identifier, flags, array_origin_geocentric,
//!                          array_origin_geodetic, plus free-form attributes
//! /antennas/dims
//! /phase_center/{ra,dec}   hourangle, deg
//! /provenance, /context    scalars as attributes, mappings as subgroups
//! ```

mod error;

pub use error::UvxWriteError;

use std::path::Path;

use hdf5::{File, Group};
use log::{debug, trace};
use ndarray::prelude::*;

use crate::{
    attrs::{AttrMap, Scalar, Value},
    h5::{
        write_scalar_attr, write_text_attr, write_text_dataset, write_text_list_attr, H5Complex,
        H5Error,
    },
    AntennaTable, Uvx, UVX_CLASS, UVX_VERSION,
};

pub(crate) const VIS_DIMS: [&str; 4] = ["time", "frequency", "baseline", "polarization"];
pub(crate) const ANT_DIMS: [&str; 2] = ["antenna", "spatial"];
pub(crate) const SPATIAL: [&str; 3] = ["x", "y", "z"];

/// Datasets living in `/antennas/attrs` beside the free-form attributes.
const ANTENNA_ATTR_DATASETS: [&str; 4] = [
    "identifier",
    "flags",
    "array_origin_geocentric",
    "array_origin_geodetic",
];

/// Write a [`Uvx`] to `path`, replacing anything already there.
pub fn write_uvx<P: AsRef<Path>>(uvx: &Uvx, path: P) -> Result<(), UvxWriteError> {
    let path = path.as_ref();
    uvx.validate()?;
    check_attr_tree("/antennas/attrs", &uvx.antennas.attrs, &ANTENNA_ATTR_DATASETS)?;
    check_attr_tree("/provenance", &uvx.provenance, &[])?;
    check_attr_tree("/context", &uvx.context, &[])?;
    debug!("Writing UVX to {}", path.display());
    let to_err = |err: H5Error| UvxWriteError::H5 {
        file: path.to_path_buf(),
        err,
    };
    let file = File::create(path).map_err(|e| to_err(e.into()))?;
    write_uvx_inner(uvx, &file).map_err(to_err)?;
    file.close().map_err(|e| to_err(e.into()))?;
    Ok(())
}

fn write_uvx_inner(uvx: &Uvx, file: &File) -> Result<(), H5Error> {
    write_text_attr(file, "CLASS", UVX_CLASS)?;
    write_text_attr(file, "VERSION", UVX_VERSION)?;
    write_text_attr(file, "name", &uvx.name)?;

    write_visibilities(uvx, &file.create_group("visibilities")?)?;
    write_antennas(&uvx.antennas, &file.create_group("antennas")?)?;

    let pc = file.create_group("phase_center")?;
    write_text_attr(&pc, "description", "Phase centre of the visibilities")?;
    let ra = f64_dataset(&pc, "ra", &uvx.phase_centre.ra)?;
    write_text_attr(&ra, "unit", "hourangle")?;
    let dec = f64_dataset(&pc, "dec", &uvx.phase_centre.dec)?;
    write_text_attr(&dec, "unit", "deg")?;

    write_attr_tree(&file.create_group("provenance")?, &uvx.provenance)?;
    write_attr_tree(&file.create_group("context")?, &uvx.context)?;
    Ok(())
}

fn f64_dataset(group: &Group, name: &str, v: &[f64]) -> Result<hdf5::Dataset, H5Error> {
    Ok(group
        .new_dataset_builder()
        .with_data(ArrayView1::from(v))
        .create(name)?)
}

fn write_visibilities(uvx: &Uvx, vis: &Group) -> Result<(), H5Error> {
    write_text_attr(
        vis,
        "description",
        "Visibility data, shaped (time, frequency, baseline, polarization)",
    )?;
    trace!("Writing visibilities {:?}", uvx.data.dim());
    let data = uvx.data.mapv(H5Complex::from);
    let ds = vis
        .new_dataset_builder()
        .with_data(data.view())
        .create("data")?;
    write_text_list_attr(&ds, "dims", &VIS_DIMS)?;
    write_text_attr(&ds, "unit", &uvx.data_unit)?;

    let coords = vis.create_group("coords")?;

    let time = coords.create_group("time")?;
    write_text_attr(&time, "description", "Time at the centre of each integration")?;
    write_scalar_attr(&time, "resolution", &Scalar::Float(uvx.time.resolution))?;
    write_text_attr(&time, "resolution_unit", "s")?;
    let mjd = f64_dataset(&time, "mjd", &uvx.time.mjd)?;
    write_text_attr(&mjd, "description", "Modified Julian date (UTC)")?;
    write_text_attr(&mjd, "unit", "d")?;
    let lst = f64_dataset(&time, "lst", &uvx.time.lst)?;
    write_text_attr(&lst, "description", "Local apparent sidereal time")?;
    write_text_attr(&lst, "unit", "hourangle")?;
    let unix = f64_dataset(&time, "unix", &uvx.time.unix)?;
    write_text_attr(&unix, "description", "Seconds since 1970-01-01 (UTC)")?;
    write_text_attr(&unix, "unit", "s")?;

    let baseline = coords.create_group("baseline")?;
    write_text_attr(
        &baseline,
        "description",
        "Baseline antenna indices; UVW = position(ant2) - position(ant1)",
    )?;
    let (ant1, ant2): (Vec<u64>, Vec<u64>) = uvx
        .baselines
        .iter()
        .map(|&(a1, a2)| (a1 as u64, a2 as u64))
        .unzip();
    baseline
        .new_dataset_builder()
        .with_data(ArrayView1::from(ant1.as_slice()))
        .create("ant1")?;
    baseline
        .new_dataset_builder()
        .with_data(ArrayView1::from(ant2.as_slice()))
        .create("ant2")?;

    let f = &uvx.frequency;
    let freq = f64_dataset(&coords, "frequency", &f.centres)?;
    write_text_attr(&freq, "description", "Channel centre frequency")?;
    write_text_attr(&freq, "unit", "Hz")?;
    write_scalar_attr(&freq, "resolution", &Scalar::Float(f.channel_spacing))?;
    write_scalar_attr(&freq, "channel_spacing", &Scalar::Float(f.channel_spacing))?;
    write_scalar_attr(&freq, "channel_bandwidth", &Scalar::Float(f.channel_bandwidth))?;
    write_scalar_attr(&freq, "channel_id", &Scalar::Int(f.channel_id))?;
    write_text_attr(&freq, "resolution_unit", "Hz")?;
    if f.oversampled() {
        write_scalar_attr(&freq, "oversampled", &Scalar::Bool(true))?;
    }

    let pols: Vec<String> = uvx.polarisations.iter().map(|p| p.to_string()).collect();
    let pol = write_text_dataset(&coords, "polarization", &pols)?;
    write_text_attr(&pol, "description", "Linear polarization products")?;

    let dims = vis.create_group("dims")?;
    for (name, len) in VIS_DIMS.iter().zip(data.shape()) {
        write_scalar_attr(&dims, name, &Scalar::Int(*len as i64))?;
    }
    Ok(())
}

fn write_antennas(antennas: &AntennaTable, group: &Group) -> Result<(), H5Error> {
    write_text_attr(group, "description", "Antenna positions and properties")?;
    write_scalar_attr(
        group,
        "array_rotation_angle",
        &Scalar::Float(antennas.array_rotation_angle),
    )?;
    write_text_attr(group, "array_rotation_angle_unit", "deg")?;

    for (name, positions, description) in [
        ("enu", &antennas.enu, "Local east, north, up positions"),
        ("ecef", &antennas.ecef, "Geocentric (ECEF) positions"),
    ] {
        let ds = group
            .new_dataset_builder()
            .with_data(positions.view())
            .create(name)?;
        write_text_list_attr(&ds, "dims", &ANT_DIMS)?;
        write_text_attr(&ds, "unit", "m")?;
        write_text_attr(&ds, "description", description)?;
    }

    let coords = group.create_group("coords")?;
    let indices: Vec<u64> = (0..antennas.len() as u64).collect();
    coords
        .new_dataset_builder()
        .with_data(ArrayView1::from(indices.as_slice()))
        .create("antenna")?;
    write_text_dataset(&coords, "spatial", &SPATIAL.map(String::from))?;

    let attrs = group.create_group("attrs")?;
    write_text_dataset(&attrs, "identifier", &antennas.identifiers)?;
    attrs
        .new_dataset_builder()
        .with_data(ArrayView1::from(antennas.flags.as_slice()))
        .create("flags")?;
    let geocentric = f64_dataset(&attrs, "array_origin_geocentric", &antennas.origin_geocentric)?;
    write_text_attr(&geocentric, "unit", "m")?;
    let geodetic = f64_dataset(&attrs, "array_origin_geodetic", &antennas.origin_geodetic)?;
    write_text_list_attr(&geodetic, "unit", &["deg", "deg", "m"])?;
    write_attr_tree(&attrs, &antennas.attrs)?;

    let dims = group.create_group("dims")?;
    write_scalar_attr(&dims, "antenna", &Scalar::Int(antennas.len() as i64))?;
    write_scalar_attr(&dims, "spatial", &Scalar::Int(3))?;
    Ok(())
}

/// Every key must be a plain HDF5 name, and no mapping may take the name of a
/// dataset in the same group.
fn check_attr_tree(
    group: &'static str,
    tree: &AttrMap,
    datasets: &[&str],
) -> Result<(), UvxWriteError> {
    let bad = |key: &str, reason| UvxWriteError::AttrKey {
        group,
        key: key.to_string(),
        reason,
    };
    let check_name = |key: &str| {
        if key.is_empty() || key == "." {
            Err(bad(key, "not a valid HDF5 name"))
        } else if key.contains('/') {
            Err(bad(key, "HDF5 names can't contain '/'"))
        } else {
            Ok(())
        }
    };
    for (key, value) in tree {
        check_name(key.as_str())?;
        if let Value::Mapping(m) = value {
            if datasets.contains(&key.as_str()) {
                return Err(bad(key.as_str(), "a dataset already has this name"));
            }
            for k in m.keys() {
                check_name(k.as_str())?;
            }
        }
    }
    Ok(())
}

/// Scalars become attributes of `group`; mappings become subgroups whose
/// attributes are the mapping's entries.
pub(crate) fn write_attr_tree(group: &Group, tree: &AttrMap) -> Result<(), H5Error> {
    for (key, value) in tree {
        match value {
            Value::Scalar(s) => write_scalar_attr(group, key, s)?,
            Value::Mapping(m) => {
                let sub = group.create_group(key)?;
                for (k, s) in m {
                    write_scalar_attr(&sub, k, s)?;
                }
            }
        }
    }
    Ok(())
}
