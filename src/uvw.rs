//! Baseline UVWs and zenith-tracking phase corrections.
//!
//! UVWs are computed in J2000: antenna positions are precessed to J2000 at each
//! timestamp and projected toward the phase centre's J2000 hour angle. The
//! baseline UVW is `uvw(ant2) - uvw(ant1)`.
//!
//! Neither the sign flip nor the phase correction is applied here
//! automatically; callers decide.

use std::f64::consts::TAU;

use hifitime::{Duration, Epoch};
use log::trace;
use marlu::{
    c32, c64, constants::VEL_C, pos::xyz::xyzs_to_uvws, precession::precess_time, LatLngHeight,
    XyzGeodetic,
};
use ndarray::prelude::*;

use crate::{vis::LayoutError, PhaseCentre, Uvx};

/// UVWs \[metres\], shaped (time, baseline, 3).
pub fn compute_uvw(
    xyzs: &[XyzGeodetic],
    baselines: &[(usize, usize)],
    phase_centre: &PhaseCentre,
    timestamps: &[Epoch],
    array_position: LatLngHeight,
) -> Result<Array3<f64>, LayoutError> {
    let num_ants = xyzs.len();
    if let Some(&(ant1, ant2)) = baselines
        .iter()
        .find(|(a1, a2)| *a1 >= num_ants || *a2 >= num_ants)
    {
        return Err(LayoutError::BadBaseline {
            ant1,
            ant2,
            num_ants,
        });
    }
    let num_pc = phase_centre.len();
    if phase_centre.dec.len() != num_pc || (num_pc != 1 && num_pc != timestamps.len()) {
        return Err(LayoutError::PhaseCentre {
            got: num_pc,
            num_times: timestamps.len(),
        });
    }

    let dut1 = Duration::from_seconds(0.0);
    let mut uvws = Array3::zeros((timestamps.len(), baselines.len(), 3));
    for (i_time, (&timestamp, mut uvws)) in timestamps
        .iter()
        .zip(uvws.outer_iter_mut())
        .enumerate()
    {
        let radec = phase_centre.radec(i_time);
        let precession_info = precess_time(
            array_position.longitude_rad,
            array_position.latitude_rad,
            radec,
            timestamp,
            dut1,
        );
        let precessed_xyzs = precession_info.precess_xyz(xyzs);
        let ant_uvws = xyzs_to_uvws(
            &precessed_xyzs,
            radec.to_hadec(precession_info.lmst_j2000),
        );
        trace!(
            "Timestep {i_time}: J2000 LMST {}°",
            precession_info.lmst_j2000.to_degrees()
        );
        for (&(ant1, ant2), mut uvw) in baselines.iter().zip(uvws.outer_iter_mut()) {
            let (a1, a2) = (&ant_uvws[ant1], &ant_uvws[ant2]);
            uvw[0] = a2.u - a1.u;
            uvw[1] = a2.v - a1.v;
            uvw[2] = a2.w - a1.w;
        }
    }
    Ok(uvws)
}

/// UVWs for every timestep and baseline of a [`Uvx`].
pub fn uvx_uvws(uvx: &Uvx) -> Result<Array3<f64>, LayoutError> {
    compute_uvw(
        &uvx.antennas.xyz_geodetic(),
        &uvx.baselines,
        &uvx.phase_centre,
        &uvx.time.epochs(),
        uvx.antennas.array_position(),
    )
}

/// Flip the sign of every UVW.
pub fn negate_uvw(uvws: &mut Array3<f64>) {
    uvws.mapv_inplace(|x| -x);
}

/// `exp(-2πi f w / c)` for each (time, frequency, baseline), from UVWs shaped
/// (time, baseline, 3) and frequencies \[Hz\].
pub fn compute_phase_correction(uvws: ArrayView3<f64>, freqs: &[f64]) -> Array3<c64> {
    let (num_times, num_baselines, _) = uvws.dim();
    Array3::from_shape_fn(
        (num_times, freqs.len(), num_baselines),
        |(i_time, i_freq, i_bl)| {
            let w = uvws[(i_time, i_bl, 2)];
            c64::from_polar(1.0, -TAU * freqs[i_freq] / VEL_C * w)
        },
    )
}

/// Multiply visibilities shaped (time, frequency, baseline, polarisation) by
/// a phase correction shaped (time, frequency, baseline).
pub fn apply_phase_correction(
    mut vis: ArrayViewMut4<c32>,
    phase: ArrayView3<c64>,
) -> Result<(), LayoutError> {
    if vis.shape()[..3] != phase.shape()[..] {
        let mut expected = phase.shape().to_vec();
        expected.push(vis.len_of(Axis(3)));
        return Err(LayoutError::ShapeMismatch {
            expected,
            got: vis.shape().to_vec(),
        });
    }
    ndarray::Zip::from(vis.lanes_mut(Axis(3)))
        .and(&phase)
        .par_for_each(|mut pols, &p| {
            let p = c32::new(p.re as f32, p.im as f32);
            pols.map_inplace(|v| *v *= p);
        });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use marlu::RADec;

    use crate::{coords::zenith_phase_centre, test_common::aavs3_position};

    /// Two antennas 10 m apart along east, phased to zenith.
    fn east_pair() -> (Vec<XyzGeodetic>, Vec<(usize, usize)>, LatLngHeight, Epoch) {
        let pos = aavs3_position();
        let (s_lat, c_lat) = pos.latitude_rad.sin_cos();
        let enu_to_xyz = |e: f64, n: f64, u: f64| XyzGeodetic {
            x: -n * s_lat + u * c_lat,
            y: e,
            z: n * c_lat + u * s_lat,
        };
        let xyzs = vec![enu_to_xyz(0.0, 0.0, 0.0), enu_to_xyz(10.0, 0.0, 0.0)];
        (
            xyzs,
            vec![(0, 0), (0, 1), (1, 1)],
            pos,
            Epoch::from_unix_seconds(1_700_000_000.0),
        )
    }

    #[test]
    fn zenith_east_baseline_has_no_w() {
        let (xyzs, baselines, pos, epoch) = east_pair();
        let pc = PhaseCentre::fixed(zenith_phase_centre(pos, epoch));
        let uvws = compute_uvw(&xyzs, &baselines, &pc, &[epoch], pos).unwrap();
        assert_eq!(uvws.dim(), (1, 3, 3));

        // Autos are zero.
        assert_abs_diff_eq!(uvws.slice(s![0, 0, ..]), array![0.0, 0.0, 0.0]);
        assert_abs_diff_eq!(uvws.slice(s![0, 2, ..]), array![0.0, 0.0, 0.0]);

        let (u, v, w) = (uvws[(0, 1, 0)], uvws[(0, 1, 1)], uvws[(0, 1, 2)]);
        assert_abs_diff_eq!(w, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!((u * u + v * v).sqrt(), 10.0, epsilon = 1e-3);
        // East is +u.
        assert!(u > 9.9);
    }

    #[test]
    fn ant2_minus_ant1() {
        let (xyzs, _, pos, epoch) = east_pair();
        let pc = PhaseCentre::fixed(RADec::from_degrees(30.0, -40.0));
        let forward = compute_uvw(&xyzs, &[(0, 1)], &pc, &[epoch], pos).unwrap();
        let backward = compute_uvw(&xyzs, &[(1, 0)], &pc, &[epoch], pos).unwrap();
        assert_abs_diff_eq!(forward, -backward);
    }

    #[test]
    fn negation_flips_every_component() {
        let (xyzs, baselines, pos, epoch) = east_pair();
        let pc = PhaseCentre::fixed(RADec::from_degrees(30.0, -40.0));
        let epochs = [epoch, epoch + Duration::from_seconds(60.0)];
        let uvws = compute_uvw(&xyzs, &baselines, &pc, &epochs, pos).unwrap();
        let mut negated = uvws.clone();
        negate_uvw(&mut negated);
        assert_eq!(negated, uvws.mapv(|x| x * -1.0));
    }

    #[test]
    fn phase_correction_is_unity_without_w() {
        let uvws = array![[[3.0, 4.0, 0.0], [0.0, 0.0, 0.0]]];
        let freqs = [50e6, 100e6, 350e6];
        let phase = compute_phase_correction(uvws.view(), &freqs);
        assert_eq!(phase.dim(), (1, 3, 2));
        for p in phase.iter() {
            assert_eq!(*p, c64::new(1.0, 0.0));
        }
    }

    #[test]
    fn phase_correction_follows_w() {
        // Half a wavelength of w at 100 MHz gives a phase of -π.
        let w = VEL_C / 100e6 / 2.0;
        let uvws = array![[[0.0, 0.0, w]]];
        let phase = compute_phase_correction(uvws.view(), &[100e6]);
        assert_abs_diff_eq!(phase[(0, 0, 0)].re, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(phase[(0, 0, 0)].im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn applying_a_correction() {
        let mut vis = Array4::from_elem((1, 1, 2, 4), c32::new(1.0, 0.0));
        let phase = array![[[c64::new(0.0, 1.0), c64::new(1.0, 0.0)]]];
        apply_phase_correction(vis.view_mut(), phase.view()).unwrap();
        for p in 0..4 {
            assert_abs_diff_eq!(vis[(0, 0, 0, p)].re, 0.0);
            assert_abs_diff_eq!(vis[(0, 0, 0, p)].im, 1.0);
            assert_eq!(vis[(0, 0, 1, p)], c32::new(1.0, 0.0));
        }
    }

    #[test]
    fn out_of_range_baselines_are_errors() {
        let (xyzs, _, pos, epoch) = east_pair();
        let pc = PhaseCentre::fixed(RADec::from_degrees(30.0, -40.0));
        assert_eq!(
            compute_uvw(&xyzs, &[(0, 1), (1, 2)], &pc, &[epoch], pos),
            Err(LayoutError::BadBaseline {
                ant1: 1,
                ant2: 2,
                num_ants: 2
            })
        );

        let per_time = PhaseCentre {
            ra: vec![1.0, 2.0, 3.0],
            dec: vec![-20.0, -20.0, -20.0],
        };
        assert!(matches!(
            compute_uvw(&xyzs, &[(0, 1)], &per_time, &[epoch], pos),
            Err(LayoutError::PhaseCentre { got: 3, num_times: 1 })
        ));
    }

    #[test]
    fn mismatched_phase_correction_is_an_error() {
        let mut vis = Array4::from_elem((1, 1, 2, 4), c32::new(1.0, 0.0));
        let phase = Array3::from_elem((1, 1, 3), c64::new(1.0, 0.0));
        assert!(matches!(
            apply_phase_correction(vis.view_mut(), phase.view()),
            Err(LayoutError::ShapeMismatch { .. })
        ));
        assert!(vis.iter().all(|&v| v == c32::new(1.0, 0.0)));
    }
}
