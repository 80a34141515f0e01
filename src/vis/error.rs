use thiserror::Error;

/// The visibilities (or their axes) are not laid out in a way we understand.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Expected a visibility array with shape {expected:?}, but got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("Expected 4 linear polarisation products, but got {0}")]
    NumPolarisations(usize),

    #[error("Unrecognised polarisation products {0:?}; only XX, XY, YX and YY are supported")]
    UnsupportedPolarisations(Vec<String>),

    #[error("{num_baselines} baselines can't be formed from {num_ants} antennas (expected {} with autos or {} for all ordered pairs)", .num_ants * (.num_ants + 1) / 2, .num_ants * .num_ants)]
    BaselineCount { num_ants: usize, num_baselines: usize },

    #[error("Baseline ({ant1}, {ant2}) refers to an antenna outside the {num_ants}-antenna table")]
    BadBaseline {
        ant1: usize,
        ant2: usize,
        num_ants: usize,
    },

    #[error("Data has {0} spectral windows; only a single spectral window is supported")]
    MultipleSpectralWindows(usize),

    #[error("Data has no spectral windows")]
    NoSpectralWindows,

    #[error("Time axes disagree in length: MJD {mjd}, LST {lst}, Unix {unix}")]
    TimeAxes { mjd: usize, lst: usize, unix: usize },

    #[error("Timestep {i_time}: stored {what} {stored} disagrees with {expected} derived from the Unix time and array position")]
    TimeDrift {
        i_time: usize,
        what: &'static str,
        stored: f64,
        expected: f64,
    },

    #[error("The antenna table's columns don't all have {num_ants} rows")]
    AntennaTable { num_ants: usize },

    #[error("There are {got} phase centres for {num_times} timesteps; expected 1 or {num_times}")]
    PhaseCentre { got: usize, num_times: usize },
}
