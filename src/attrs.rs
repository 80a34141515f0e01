//! Free-form attribute trees used for provenance, context and axis metadata.
//!
//! Values are at most two levels deep: a key maps either to a [`Scalar`] or to
//! a flat mapping of scalars. This is what the container stores as group
//! attributes (scalars) and subgroups with attributes (mappings).

use std::collections::BTreeMap;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

/// Either a scalar or a flat mapping of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Mapping(BTreeMap<String, Scalar>),
}

pub type AttrMap = BTreeMap<String, Value>;

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(f) => Some(*f),
            Scalar::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            // Some writers store counts as floats.
            Scalar::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Text(s) => write!(f, "{s}"),
            Scalar::IntList(l) => write!(f, "{l:?}"),
            Scalar::FloatList(l) => write!(f, "{l:?}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s.into())
    }
}

impl From<BTreeMap<String, Scalar>> for Value {
    fn from(m: BTreeMap<String, Scalar>) -> Self {
        Value::Mapping(m)
    }
}

/// An empty provenance record; conversions add their own entries to it.
pub fn empty_provenance() -> AttrMap {
    AttrMap::new()
}

/// Context template: observer, intent, notes and date, all empty.
pub fn empty_context() -> AttrMap {
    ["observer", "intent", "notes", "date"]
        .into_iter()
        .map(|k| (k.to_string(), Value::from("")))
        .collect()
}
