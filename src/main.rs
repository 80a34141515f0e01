use std::path::{Path, PathBuf};

use clap::{AppSettings, Parser};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use uvx::{
    attrs::{empty_context, Value},
    config::{ConfigError, ConfigRegistry, ConfigSource},
    coords::AntennaSource,
    export::{ExportOptions, UvxExport},
    hdf5_to_uvx, write_uvx, ConvertOptions, UvxError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
enum OutputFormat {
    Uvx,
    Uvfits,
}

#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
#[clap(version)]
struct Args {
    /// Raw correlator HDF5 captures to convert.
    files: Vec<PathBuf>,

    /// The station config YAML to use.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// A station name, looked up in the config directories.
    #[clap(short, long)]
    telescope: Option<String>,

    /// Directories holding <telescope>/uv_config.yaml. Can be given multiple
    /// times.
    #[clap(long)]
    config_dir: Vec<PathBuf>,

    /// List the telescopes found in the config directories and exit.
    #[clap(long)]
    list_telescopes: bool,

    /// Where to write outputs. Defaults to alongside each input.
    #[clap(short, long)]
    output_dir: Option<PathBuf>,

    /// The output format (uvx or uvfits).
    #[clap(long, default_value = "uvx")]
    format: OutputFormat,

    /// The station config's antenna-location file is a platform YAML.
    #[clap(long)]
    platform_yaml: bool,

    /// The station to use from the platform YAML. Only needed when it
    /// describes more than one.
    #[clap(long)]
    station: Option<String>,

    /// Don't apply the station's conjugate/transpose policy.
    #[clap(long)]
    metadata_only: bool,

    #[clap(long)]
    observer: Option<String>,

    #[clap(long)]
    intent: Option<String>,

    #[clap(long)]
    notes: Option<String>,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long)]
    no_progress_bars: bool,

    /// The number of files to convert at once. Defaults to the number of CPUs.
    #[clap(short = 'j', long)]
    num_threads: Option<usize>,
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbosity);

    match try_main(args) {
        Ok(0) => (),
        Ok(num_failed) => {
            error!("{num_failed} file(s) failed to convert");
            std::process::exit(1);
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

/// Returns the number of files that failed.
fn try_main(mut args: Args) -> Result<usize, UvxError> {
    let registry = ConfigRegistry::new(args.config_dir.clone());
    if args.list_telescopes {
        info!("Available telescopes: {}", registry.available().iter().join(", "));
        return Ok(0);
    }
    if args.files.is_empty() {
        warn!("No input files given");
        return Ok(0);
    }
    args.files.sort_unstable();

    let config_source = match (&args.config, &args.telescope) {
        (Some(c), t) => {
            if t.is_some() {
                warn!("Both a config and a telescope were given; using the config");
            }
            ConfigSource::Path(c.clone())
        }
        (None, Some(t)) => ConfigSource::Telescope(t.clone()),
        (None, None) => return Err(ConfigError::NoConfigSupplied.into()),
    };
    // Resolve the config once, up front, so a bad name fails the whole batch
    // rather than every file.
    registry.load(&config_source)?;

    let mut context = empty_context();
    for (key, value) in [
        ("observer", &args.observer),
        ("intent", &args.intent),
        ("notes", &args.notes),
    ] {
        if let Some(v) = value {
            context.insert(key.to_string(), Value::from(v.as_str()));
        }
    }
    if args.station.is_some() && !args.platform_yaml {
        warn!("--station only applies with --platform-yaml; ignoring it");
    }
    let opts = ConvertOptions {
        antenna_source: if args.platform_yaml {
            AntennaSource::PlatformYaml {
                station: args.station.clone(),
            }
        } else {
            AntennaSource::LocationsFile
        },
        load_data: !args.metadata_only,
        context: Some(context),
        provenance: None,
    };
    info!(
        "Writing {} (available formats: {})",
        args.format,
        OutputFormat::iter().join(", ")
    );

    if let Some(n) = args.num_threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
        {
            warn!("Couldn't set the number of threads: {e}");
        }
    }
    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir).map_err(ConfigError::from)?;
    }

    let progress = ProgressBar::new(args.files.len() as _)
        .with_style(
            ProgressStyle::default_bar()
                .template(
                    "{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} files ({elapsed_precise}<{eta_precise})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        )
        .with_position(0)
        .with_message("Converting");
    progress.set_draw_target(if args.no_progress_bars {
        ProgressDrawTarget::hidden()
    } else {
        ProgressDrawTarget::stdout()
    });

    let results: Vec<(&PathBuf, Result<PathBuf, UvxError>)> = args
        .files
        .par_iter()
        .progress_with(progress.clone())
        .map(|input| {
            let output = output_path(input, args.output_dir.as_deref(), args.format);
            let result = convert_one(input, &output, args.format, &config_source, &registry, &opts)
                .map(|_| output);
            (input, result)
        })
        .collect();
    progress.abandon_with_message("Finished");

    let mut num_failed = 0;
    for (input, result) in results {
        match result {
            Ok(output) => info!("{} -> {}", input.display(), output.display()),
            Err(e) => {
                error!("{}: {e}", input.display());
                num_failed += 1;
            }
        }
    }
    Ok(num_failed)
}

fn output_path(input: &Path, output_dir: Option<&Path>, format: OutputFormat) -> PathBuf {
    let dir = output_dir
        .or_else(|| input.parent())
        .unwrap_or_else(|| Path::new("."));
    let stem = input.file_stem().unwrap_or(input.as_os_str());
    dir.join(format!("{}.{format}", stem.to_string_lossy()))
}

fn convert_one(
    input: &Path,
    output: &Path,
    format: OutputFormat,
    config_source: &ConfigSource,
    registry: &ConfigRegistry,
    opts: &ConvertOptions,
) -> Result<(), UvxError> {
    let uvx = hdf5_to_uvx(input, config_source, registry, opts)?;
    debug!("Writing {}", output.display());
    match format {
        OutputFormat::Uvx => write_uvx(&uvx, output)?,
        OutputFormat::Uvfits => uvx.to_uvfits(output, &ExportOptions::default())?,
    }
    Ok(())
}

fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.init();
}
