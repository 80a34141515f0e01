//! Small helpers over the `hdf5` crate shared by the raw-capture reader and the
//! UVX container codec.

use std::collections::BTreeMap;

use hdf5::{
    types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode},
    Attribute, Dataset, Group, Location,
};
use log::trace;
use marlu::c32;
use ndarray::ArrayView1;
use thiserror::Error;

use crate::attrs::Scalar;

/// Width of fixed-width text datasets written by this crate.
pub(crate) const TEXT_WIDTH: usize = 64;

pub(crate) type FixedText = FixedAscii<TEXT_WIDTH>;

#[derive(Error, Debug)]
pub enum H5Error {
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("Couldn't store the text '{text}' in HDF5: {reason}")]
    Text { text: String, reason: String },
}

/// The complex layout written by h5py and numpy for `complex64`.
#[derive(hdf5::H5Type, Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub(crate) struct H5Complex {
    r: f32,
    i: f32,
}

impl From<c32> for H5Complex {
    fn from(c: c32) -> Self {
        H5Complex { r: c.re, i: c.im }
    }
}

impl From<H5Complex> for c32 {
    fn from(c: H5Complex) -> Self {
        c32::new(c.r, c.i)
    }
}

fn var_len_unicode(text: &str) -> Result<VarLenUnicode, H5Error> {
    text.parse::<VarLenUnicode>().map_err(|e| H5Error::Text {
        text: text.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn write_text_attr(loc: &Location, name: &str, text: &str) -> Result<(), H5Error> {
    let v = var_len_unicode(text)?;
    loc.new_attr::<VarLenUnicode>()
        .shape(())
        .create(name)?
        .write_scalar(&v)?;
    Ok(())
}

pub(crate) fn write_text_list_attr(
    loc: &Location,
    name: &str,
    texts: &[&str],
) -> Result<(), H5Error> {
    let v = texts
        .iter()
        .map(|t| var_len_unicode(t))
        .collect::<Result<Vec<_>, _>>()?;
    loc.new_attr::<VarLenUnicode>()
        .shape(v.len())
        .create(name)?
        .write_raw(v.as_slice())?;
    Ok(())
}

pub(crate) fn write_scalar_attr(loc: &Location, name: &str, value: &Scalar) -> Result<(), H5Error> {
    match value {
        Scalar::Bool(b) => loc
            .new_attr::<bool>()
            .shape(())
            .create(name)?
            .write_scalar(b)?,
        Scalar::Int(i) => loc
            .new_attr::<i64>()
            .shape(())
            .create(name)?
            .write_scalar(i)?,
        Scalar::Float(f) => loc
            .new_attr::<f64>()
            .shape(())
            .create(name)?
            .write_scalar(f)?,
        Scalar::Text(s) => write_text_attr(loc, name, s)?,
        Scalar::IntList(l) => loc
            .new_attr::<i64>()
            .shape(l.len())
            .create(name)?
            .write_raw(l.as_slice())?,
        Scalar::FloatList(l) => loc
            .new_attr::<f64>()
            .shape(l.len())
            .create(name)?
            .write_raw(l.as_slice())?,
    }
    Ok(())
}

/// Read an attribute as a [`Scalar`]. Types that have no [`Scalar`]
/// counterpart (compounds, string arrays, ...) give `None`.
pub(crate) fn read_scalar_attr(attr: &Attribute) -> hdf5::Result<Option<Scalar>> {
    let is_list = !attr.shape().is_empty();
    let scalar = match (attr.dtype()?.to_descriptor()?, is_list) {
        (TypeDescriptor::Boolean, false) => Scalar::Bool(attr.read_scalar::<bool>()?),
        (TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_), false) => {
            Scalar::Int(attr.read_scalar::<i64>()?)
        }
        (TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_), true) => {
            Scalar::IntList(attr.read_raw::<i64>()?)
        }
        (TypeDescriptor::Float(_), false) => Scalar::Float(attr.read_scalar::<f64>()?),
        (TypeDescriptor::Float(_), true) => Scalar::FloatList(attr.read_raw::<f64>()?),
        (TypeDescriptor::VarLenUnicode, false) => {
            Scalar::Text(attr.read_scalar::<VarLenUnicode>()?.as_str().to_string())
        }
        (TypeDescriptor::VarLenAscii, false) => {
            Scalar::Text(attr.read_scalar::<VarLenAscii>()?.as_str().to_string())
        }
        (TypeDescriptor::FixedAscii(_), false) => {
            Scalar::Text(attr.read_scalar::<FixedAscii<1024>>()?.as_str().to_string())
        }
        (TypeDescriptor::FixedUnicode(_), false) => {
            Scalar::Text(attr.read_scalar::<FixedUnicode<1024>>()?.as_str().to_string())
        }
        (td, _) => {
            trace!("Attribute type {td:?} has no scalar representation");
            return Ok(None);
        }
    };
    Ok(Some(scalar))
}

/// Read every attribute of an object that can be represented as a [`Scalar`].
pub(crate) fn read_scalar_attrs(loc: &Location) -> hdf5::Result<BTreeMap<String, Scalar>> {
    let mut map = BTreeMap::new();
    for name in loc.attr_names()? {
        let attr = loc.attr(&name)?;
        match read_scalar_attr(&attr)? {
            Some(s) => {
                map.insert(name, s);
            }
            None => trace!("Skipping attribute '{name}'"),
        }
    }
    Ok(map)
}

/// Write a 1D dataset of fixed-width ASCII text.
pub(crate) fn write_text_dataset(
    group: &Group,
    name: &str,
    texts: &[String],
) -> Result<Dataset, H5Error> {
    let fixed = texts
        .iter()
        .map(|t| {
            FixedText::from_ascii(t.as_bytes()).map_err(|e| H5Error::Text {
                text: t.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let ds = group
        .new_dataset_builder()
        .with_data(ArrayView1::from(fixed.as_slice()))
        .create(name)?;
    Ok(ds)
}

pub(crate) fn read_text_dataset(ds: &Dataset) -> hdf5::Result<Vec<String>> {
    Ok(ds
        .read_raw::<FixedText>()?
        .into_iter()
        .map(|t| t.as_str().to_string())
        .collect())
}
