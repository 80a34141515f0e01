//! Write a [`Uvx`] as uvfits through marlu.
//!
//! marlu computes the uvfits UVWs itself, as `position(ant1) - position(ant2)`.
//! Up to marlu's aberration of the phase centre, these are the negation of
//! [`uvx_uvws`], so a uvfits file carries the same UVWs as an SDP export with
//! `negate_uvw` set. The phase correction is
//! `exp(-2πi f w / c)` with the un-negated `w` of [`uvx_uvws`], identical to
//! the SDP exporters.

use std::path::Path;

use hifitime::Duration;
use log::{debug, warn};
use marlu::{History, Jones, UvfitsWriter, VisContext, VisWrite};
use ndarray::prelude::*;

use super::{ExportError, ExportOptions};
use crate::{
    uvw::{apply_phase_correction, compute_phase_correction, uvx_uvws},
    vis::LayoutError,
    Uvx, POLARISATIONS,
};

pub(super) fn write_uvfits(uvx: &Uvx, path: &Path, opts: &ExportOptions) -> Result<(), ExportError> {
    uvx.validate()?;
    if uvx.polarisations != POLARISATIONS {
        return Err(LayoutError::UnsupportedPolarisations(
            uvx.polarisations.iter().map(|p| p.to_string()).collect(),
        )
        .into());
    }
    let epochs = uvx.time.epochs();
    let (Some(&first_timestamp), Some(&start_freq_hz)) =
        (epochs.first(), uvx.frequency.centres.first())
    else {
        return Err(LayoutError::ShapeMismatch {
            expected: vec![1, 1, uvx.baselines.len(), 4],
            got: uvx.data.shape().to_vec(),
        }
        .into());
    };
    if uvx.phase_centre.len() > 1 {
        warn!("uvfits supports a single phase centre; using the first");
    }
    if opts.negate_uvw {
        debug!("uvfits UVWs are computed by marlu; not negating them");
    }

    let int_time = Duration::from_seconds(uvx.time.resolution);
    let vis_ctx = VisContext {
        num_sel_timesteps: uvx.time.len(),
        // Marlu expects "leading edge" timestamps, not centroids.
        start_timestamp: first_timestamp - int_time / 2,
        int_time,
        num_sel_chans: uvx.frequency.len(),
        start_freq_hz,
        freq_resolution_hz: uvx.frequency.channel_spacing,
        sel_baselines: uvx.baselines.clone(),
        avg_time: 1,
        avg_freq: 1,
        num_vis_pols: 4,
    };

    let mut data = uvx.data.clone();
    if opts.apply_phase_tracking {
        let phase = compute_phase_correction(uvx_uvws(uvx)?.view(), &uvx.frequency.centres);
        apply_phase_correction(data.view_mut(), phase.view())?;
    }
    if opts.conjugate_on_export {
        data.par_mapv_inplace(|v| v.conj());
    }
    // [time][freq][baseline]
    let vis = data
        .lanes(Axis(3))
        .into_iter()
        .map(|pols| Jones::from([pols[0], pols[1], pols[2], pols[3]]))
        .collect::<Vec<Jones<f32>>>();
    let (num_times, num_chans, num_baselines, _) = data.dim();
    let vis = Array3::from_shape_vec((num_times, num_chans, num_baselines), vis)
        .map_err(|_| LayoutError::ShapeMismatch {
            expected: vec![num_times, num_chans, num_baselines, 4],
            got: data.shape().to_vec(),
        })?;
    let weights = Array3::<f32>::ones(vis.dim());

    // It's possible that the command-line call has invalid UTF-8; if so, don't
    // bother with the CMDLINE key.
    let cmd_line = std::env::args_os()
        .map(|a| a.into_string())
        .collect::<Result<Vec<String>, _>>()
        .map(|v| v.join(" "))
        .ok();
    let history = History {
        application: Some("uvx_convert"),
        cmd_line: cmd_line.as_deref(),
        message: None,
    };

    debug!("Writing uvfits {}", path.display());
    let to_err = |err| ExportError::UvfitsWrite {
        file: path.to_path_buf(),
        err,
    };
    let mut writer = UvfitsWriter::from_marlu(
        path,
        &vis_ctx,
        uvx.antennas.array_position(),
        uvx.phase_centre.radec(0),
        Duration::from_seconds(0.0),
        Some(uvx.name.as_str()),
        uvx.antennas.identifiers.clone(),
        uvx.antennas.xyz_geodetic(),
        false,
        Some(&history),
    )
    .map_err(to_err)?;
    writer.write_vis(vis.view(), weights.view(), &vis_ctx)?;
    writer.finalise()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use fitsio::FitsFile;
    use marlu::{precession::precess_time, UVW};
    use tempfile::TempDir;

    use crate::{
        export::{ExportError, UvxExport},
        test_common::synthetic_uvx,
    };

    #[test]
    fn uvfits_has_a_row_per_time_and_baseline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.uvfits");
        let uvx = synthetic_uvx();
        uvx.to_uvfits(&path, &ExportOptions::default()).unwrap();

        let mut fptr = FitsFile::open(&path).unwrap();
        let hdu = fptr.primary_hdu().unwrap();
        let gcount: i64 = hdu.read_key(&mut fptr, "GCOUNT").unwrap();
        assert_eq!(gcount as usize, uvx.time.len() * uvx.baselines.len());
        assert!(fptr.hdu("AIPS AN").is_ok());
    }

    #[test]
    fn marlu_uvws_are_negated_uvx_uvws() {
        let uvx = synthetic_uvx();
        let uvws = uvx_uvws(&uvx).unwrap();
        let pos = uvx.antennas.array_position();
        let xyzs = uvx.antennas.xyz_geodetic();
        for (i_time, epoch) in uvx.time.epochs().into_iter().enumerate() {
            let prec = precess_time(
                pos.longitude_rad,
                pos.latitude_rad,
                uvx.phase_centre.radec(i_time),
                epoch,
                Duration::from_seconds(0.0),
            );
            let precessed = prec.precess_xyz(&xyzs);
            for (i_bl, &(ant1, ant2)) in uvx.baselines.iter().enumerate() {
                let uvw = UVW::from_xyz(precessed[ant1] - precessed[ant2], prec.hadec_j2000);
                assert_abs_diff_eq!(uvw.u, -uvws[(i_time, i_bl, 0)], epsilon = 1e-2);
                assert_abs_diff_eq!(uvw.v, -uvws[(i_time, i_bl, 1)], epsilon = 1e-2);
                assert_abs_diff_eq!(uvw.w, -uvws[(i_time, i_bl, 2)], epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn untoggled_uvfits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.uvfits");
        let opts = ExportOptions {
            negate_uvw: false,
            apply_phase_tracking: false,
            conjugate_on_export: false,
        };
        synthetic_uvx().to_uvfits(&path, &opts).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn bad_polarisations_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut uvx = synthetic_uvx();
        uvx.polarisations.swap(0, 3);
        assert!(matches!(
            uvx.to_uvfits(&dir.path().join("bad.uvfits"), &ExportOptions::default()),
            Err(ExportError::Layout(LayoutError::UnsupportedPolarisations(_)))
        ));
    }
}
