//! Turn raw correlation-matrix payloads into the canonical
//! (time, frequency, baseline, polarisation) tensor.
//!
//! Station correlators emit cross-polarisation products in one of two orders:
//!
//! * default: A1A2*, A1B2*, B1A2*, B1B2*
//! * swapped: A2A1*, A2B1*, B2A1*, B2B1*
//!
//! Swapped data are made canonical by conjugating every sample and swapping
//! the two cross-polarisation terms. The two flags are independent and must be
//! applied exactly once per raw load.

mod error;

pub use error::LayoutError;

use log::{debug, trace};
use marlu::c32;
use ndarray::prelude::*;

use crate::config::RawAxisOrder;

/// The baselines formed by `num_ants` antennas, given how many baselines the
/// correlator reported. `n(n+1)/2` gives the upper triangle including autos
/// (`ant1 <= ant2`); `n^2` gives every ordered pair.
pub fn baselines_for(
    num_ants: usize,
    num_baselines: usize,
) -> Result<Vec<(usize, usize)>, LayoutError> {
    let baselines: Vec<(usize, usize)> = if num_baselines == num_ants * (num_ants + 1) / 2 {
        (0..num_ants)
            .flat_map(|a1| (a1..num_ants).map(move |a2| (a1, a2)))
            .collect()
    } else if num_baselines == num_ants * num_ants {
        (0..num_ants)
            .flat_map(|a1| (0..num_ants).map(move |a2| (a1, a2)))
            .collect()
    } else {
        return Err(LayoutError::BaselineCount {
            num_ants,
            num_baselines,
        });
    };
    debug!("{num_ants} antennas give {} baselines", baselines.len());
    Ok(baselines)
}

/// The shape a raw payload has on disk, given its axis order.
pub fn raw_payload_shape(
    order: RawAxisOrder,
    num_times: usize,
    num_chans: usize,
    num_baselines: usize,
    num_pols: usize,
) -> [usize; 4] {
    match order {
        RawAxisOrder::Tfbp => [num_times, num_chans, num_baselines, num_pols],
        RawAxisOrder::Tbfp => [num_times, num_baselines, num_chans, num_pols],
    }
}

/// Check a raw payload's shape against what the metadata promises.
pub fn check_payload_shape(got: &[usize], expected: [usize; 4]) -> Result<(), LayoutError> {
    if got != expected {
        return Err(LayoutError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        });
    }
    Ok(())
}

/// Reorder a raw payload into the canonical axis order and apply the
/// conjugate/transpose policy.
pub fn build_visibility_array(
    raw: Array4<c32>,
    order: RawAxisOrder,
    conjugate: bool,
    transpose: bool,
) -> Result<Array4<c32>, LayoutError> {
    let num_pols = raw.len_of(Axis(3));
    if num_pols != 4 {
        return Err(LayoutError::NumPolarisations(num_pols));
    }

    let mut vis = match order {
        RawAxisOrder::Tfbp => raw,
        RawAxisOrder::Tbfp => raw
            .permuted_axes([0, 2, 1, 3])
            .as_standard_layout()
            .into_owned(),
    };
    trace!("Canonical visibility dimensions: {:?}", vis.dim());

    if transpose {
        debug!("Swapping cross-polarisation terms");
        vis.lanes_mut(Axis(3))
            .into_iter()
            .for_each(|mut pols| pols.swap(1, 2));
    }
    if conjugate {
        debug!("Conjugating visibilities");
        vis.par_mapv_inplace(|v| v.conj());
    }
    Ok(vis)
}

/// The inverse of the legacy exporter's permutation: (time, frequency,
/// baseline, pol) to (time, baseline, frequency, pol).
pub fn to_time_baseline_freq(vis: ArrayView4<c32>) -> Array4<c32> {
    vis.permuted_axes([0, 2, 1, 3])
        .as_standard_layout()
        .into_owned()
}
