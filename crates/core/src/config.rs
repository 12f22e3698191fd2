//! Engine configuration.
//!
//! Everything tunable about a run lives here: the time-step policy, the
//! advection correction factor, optional meander mixing, convergence
//! criteria and the two legacy scale knobs that older datasets were
//! calibrated against. All fields have sensible defaults for steady-state
//! runs; construct with `EngineConfig::default()` and override what you
//! need.

use serde::{Deserialize, Serialize};

/// How the per-step Δt is derived at initialization.
///
/// The step is computed once when the engine is built and held constant for
/// the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimestepMode {
    /// CFL-bounded step: `Δt = Cmax / √3 / max(u±/Δx, v±/Δy, w±/Δz)` over
    /// all cells.
    Cfl {
        /// Courant number ceiling. 1.0 for steady-state runs; some legacy
        /// configurations used 1.5.
        cmax: f64,
    },
    /// Rule-of-thumb step `Δt = Δx/1000 · 6` taken from the first cell, for
    /// datasets where the CFL bound is overly conservative.
    RuleOfThumb,
}

/// When the driver decides it is done.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConvergenceMode {
    /// Stop once the relative change of every tracked output sum between
    /// consecutive checks falls below `tolerance`.
    Criterion {
        /// Relative-change threshold. 5e-3 reproduces reference runs.
        tolerance: f64,
    },
    /// Run exactly this many convergence-check intervals, then stop.
    FixedIterations {
        /// Number of check intervals to run.
        checks: usize,
    },
}

/// Configuration for the simulation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Time-step derivation policy.
    pub timestep: TimestepMode,

    /// Empirical correction tying advection vigor to the staggered-grid
    /// velocity decomposition. Reference outputs use 2.0.
    pub advection_factor: f64,

    /// Optional plume-meander enhancement of horizontal mixing. `None`
    /// disables the operator; `Some(f)` applies horizontal eddy diffusion
    /// scaled by `f` as an extra phase after the main mixing pass.
    pub meander: Option<f64>,

    /// Convergence policy.
    pub convergence: ConvergenceMode,

    /// Simulated seconds between convergence checks.
    pub check_period: f64,

    /// Hard budget on convergence checks before the driver gives up and
    /// returns the partially-converged state.
    pub max_checks: usize,

    /// Output variables whose grid-wide sums the convergence test tracks.
    pub tracked_outputs: Vec<String>,

    /// Scale applied to all wet-deposition rates at grid build. Kept from a
    /// legacy debugging knob; leave at 1.0 unless recalibrating.
    pub wet_dep_scale: f64,

    /// Scale applied to all face wind speeds at grid build. Kept from a
    /// legacy debugging knob; leave at 1.0 unless recalibrating.
    pub wind_speed_scale: f64,

    /// Dry-deposition scheme requested from the mechanism.
    pub dry_dep_scheme: String,

    /// Wet-deposition scheme requested from the mechanism.
    pub wet_dep_scheme: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timestep: TimestepMode::Cfl { cmax: 1.0 },
            advection_factor: 2.0,
            meander: None,
            convergence: ConvergenceMode::Criterion { tolerance: 5.0e-3 },
            check_period: 3600.0, // one simulated hour between checks
            max_checks: 1000,
            tracked_outputs: vec!["TotalPM25".to_string()],
            wet_dep_scale: 1.0,
            wind_speed_scale: 1.0,
            dry_dep_scheme: "simple".to_string(),
            wet_dep_scheme: "simple".to_string(),
        }
    }
}
