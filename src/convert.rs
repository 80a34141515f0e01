//! Raw capture + station config -> [`Uvx`].

use std::{collections::BTreeMap, path::Path};

use log::{debug, info, warn};

use crate::{
    attrs::{empty_context, empty_provenance, AttrMap, Scalar, Value},
    config::{ConfigRegistry, ConfigSource},
    coords::{build_frame, AntennaSource},
    read::{load_observation_metadata, read_correlation_matrix, Metadata},
    vis::{baselines_for, build_visibility_array, check_payload_shape, raw_payload_shape},
    PhaseCentre, Uvx, UvxError, POLARISATIONS,
};

/// How to run a conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Where the antenna positions come from.
    pub antenna_source: AntennaSource,

    /// When false, the payload is loaded as-is: the conjugate/transpose
    /// policy is skipped. The payload is still read into memory, since a
    /// [`Uvx`] owns its visibilities. To inspect a capture without reading
    /// its payload, use [`crate::read::load_observation_metadata`] and
    /// [`crate::coords::build_frame`].
    pub load_data: bool,

    /// Replaces the empty context template.
    pub context: Option<AttrMap>,

    /// Extra provenance entries, added after the ones derived from the
    /// inputs.
    pub provenance: Option<AttrMap>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            antenna_source: AntennaSource::LocationsFile,
            load_data: true,
            context: None,
            provenance: None,
        }
    }
}

/// Convert a raw correlator capture into a [`Uvx`].
pub fn hdf5_to_uvx<P: AsRef<Path>>(
    raw_path: P,
    config_source: &ConfigSource,
    registry: &ConfigRegistry,
    opts: &ConvertOptions,
) -> Result<Uvx, UvxError> {
    let raw_path = raw_path.as_ref();
    info!("Converting {}", raw_path.display());
    let metadata = load_observation_metadata(raw_path, config_source, registry)?;
    let frame = build_frame(&metadata, opts.antenna_source.clone())?;

    let raw = &metadata.raw;
    let baselines = baselines_for(raw.n_antennas, raw.n_baselines)?;
    let config = &metadata.config;
    check_payload_shape(
        &raw.data_shape,
        raw_payload_shape(
            config.raw_axis_order,
            raw.n_integrations,
            raw.n_chans,
            raw.n_baselines,
            raw.n_stokes,
        ),
    )?;

    let (conjugate, transpose) = if opts.load_data {
        (config.conjugate_hdf5, config.transpose_hdf5)
    } else {
        if config.conjugate_hdf5 || config.transpose_hdf5 {
            warn!("Loading metadata only; not applying the conjugate/transpose policy");
        }
        (false, false)
    };
    let payload = read_correlation_matrix(raw_path)?;
    let data = build_visibility_array(payload, config.raw_axis_order, conjugate, transpose)?;

    let mut provenance = provenance(&metadata);
    if let Some(extra) = &opts.provenance {
        provenance.extend(extra.clone());
    }

    let uvx = Uvx {
        name: config.telescope_name.clone(),
        antennas: frame.antennas,
        time: frame.time,
        frequency: frame.frequency,
        baselines,
        polarisations: POLARISATIONS.to_vec(),
        data,
        data_unit: config.vis_units.clone(),
        phase_centre: PhaseCentre::fixed(frame.phase_centre),
        provenance,
        context: opts.context.clone().unwrap_or_else(empty_context),
    };
    uvx.validate()?;
    debug!(
        "{}: UVX with dimensions {:?}",
        raw_path.display(),
        uvx.data.dim()
    );
    Ok(uvx)
}

/// The versions of the software doing the conversion.
pub fn software_versions() -> BTreeMap<String, Scalar> {
    let (major, minor, release) = hdf5::library_version();
    BTreeMap::from([
        (
            "uvx_convert".to_string(),
            Scalar::from(crate::UVX_VERSION),
        ),
        (
            "hdf5".to_string(),
            Scalar::from(format!("{major}.{minor}.{release}")),
        ),
    ])
}

fn provenance(metadata: &Metadata) -> AttrMap {
    let mut provenance = empty_provenance();
    provenance.insert(
        "input_files".to_string(),
        Value::Mapping(BTreeMap::from([
            (
                "data_filename".to_string(),
                Scalar::from(metadata.raw_file.display().to_string()),
            ),
            (
                "config_filename".to_string(),
                Scalar::from(metadata.config.source_file.display().to_string()),
            ),
        ])),
    );
    provenance.insert(
        "software_versions".to_string(),
        Value::Mapping(software_versions()),
    );
    provenance.insert(
        "input_metadata".to_string(),
        Value::Mapping(metadata.to_scalars()),
    );
    if let Some(info) = &metadata.raw.observation_info {
        provenance.insert(
            "station_config".to_string(),
            Value::Mapping(BTreeMap::from([
                (
                    "observation_description".to_string(),
                    Scalar::from(info.description.as_str()),
                ),
                (
                    "tpm_firmware_version".to_string(),
                    Scalar::from(info.firmware_version.as_str()),
                ),
                (
                    "daq_software_version".to_string(),
                    Scalar::from(info.software_version.as_str()),
                ),
                (
                    "station_config_yaml".to_string(),
                    Scalar::from(info.station_config.as_str()),
                ),
            ])),
        );
    }
    provenance
}
