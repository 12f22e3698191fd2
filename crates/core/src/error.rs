//! Error types surfaced by grid construction and the simulation driver.
//!
//! Operators themselves never fail: they are total on well-formed input.
//! Everything that can go wrong is either rejected at initialization
//! (topology and mass-balance validation) or detected by the driver between
//! steps (non-finite state). Recoverable outcomes such as cancellation or a
//! convergence timeout are reported through [`crate::engine::RunOutcome`],
//! not through this type.

/// Errors that can occur while building or running a simulation.
#[derive(Debug)]
pub enum EngineError {
    /// A neighbor index was out of range, a neighbor relation was asymmetric,
    /// coverage fractions did not tile a face, or a ground-level chain was
    /// broken.
    BadTopology(String),
    /// The ACM2 convective rates supplied by the preprocessor violate column
    /// mass balance: `M2u(k) - M2d(k) + M2d(k+1)·Δz(k+1)/Δz(k)` must vanish
    /// for every cell below the boundary-layer top.
    ConvectiveImbalance {
        /// Row of the offending cell.
        row: usize,
        /// Residual of the balance expression (1/s).
        residual: f64,
        /// The cell's upward mixing rate, used as the comparison scale (1/s).
        m2u: f64,
    },
    /// An emissions pollutant or output variable name the active mechanism
    /// does not know.
    UnknownSpecies(String),
    /// A dry- or wet-deposition scheme name the active mechanism does not
    /// provide.
    UnknownScheme(String),
    /// A NaN or infinity appeared in the concentration state during a run.
    NonFiniteState {
        /// Simulated seconds elapsed when the bad value was detected.
        simulated_seconds: f64,
    },
    /// Saving or restoring the grid failed.
    Persistence(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::BadTopology(msg) => write!(f, "bad grid topology: {msg}"),
            EngineError::ConvectiveImbalance { row, residual, m2u } => write!(
                f,
                "convective mass balance violated at cell {row}: residual {residual:e} against M2u {m2u:e}"
            ),
            EngineError::UnknownSpecies(name) => write!(f, "unknown species or variable '{name}'"),
            EngineError::UnknownScheme(name) => write!(f, "unknown deposition scheme '{name}'"),
            EngineError::NonFiniteState { simulated_seconds } => write!(
                f,
                "non-finite concentration detected after {simulated_seconds} simulated seconds"
            ),
            EngineError::Persistence(msg) => write!(f, "persistence failure: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
