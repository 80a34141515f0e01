//! One-way exporters from [`Uvx`] (and friends) to downstream formats.

mod error;
mod sdp;
mod uvfits;

pub use error::ExportError;
pub use sdp::{
    generic_to_sdp_vis, raw_to_sdp_vis, ExportedVisibility, GenericVisDataset,
    TelescopeConfiguration,
};

use std::path::Path;

use crate::Uvx;

/// Toggles applied identically by every exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Multiply every UVW by -1. SDP consumers expect this.
    pub negate_uvw: bool,

    /// Phase the zenith-fixed visibilities toward the phase centre.
    pub apply_phase_tracking: bool,

    /// Conjugate the exported visibilities.
    pub conjugate_on_export: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            negate_uvw: true,
            apply_phase_tracking: true,
            conjugate_on_export: false,
        }
    }
}

/// Identifiers passed through to the exported data untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanInfo {
    pub scan_id: i64,
    pub scan_intent: String,
    pub execblock_id: String,
}

/// Something that can be exported to each supported schema.
pub trait UvxExport {
    fn to_sdp_vis(
        &self,
        opts: &ExportOptions,
        scan: &ScanInfo,
    ) -> Result<ExportedVisibility, ExportError>;

    fn to_uvfits(&self, path: &Path, opts: &ExportOptions) -> Result<(), ExportError>;
}

impl UvxExport for Uvx {
    fn to_sdp_vis(
        &self,
        opts: &ExportOptions,
        scan: &ScanInfo,
    ) -> Result<ExportedVisibility, ExportError> {
        sdp::uvx_to_sdp_vis(self, opts, scan)
    }

    fn to_uvfits(&self, path: &Path, opts: &ExportOptions) -> Result<(), ExportError> {
        uvfits::write_uvfits(self, path, opts)
    }
}
