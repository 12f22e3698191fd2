//! Per-cell process operators.
//!
//! Every physical and chemical process is expressed as a [`CellManipulator`]:
//! an opaque operation applied to one cell over one time step. The driver
//! composes manipulators into a per-step pipeline and runs each phase as a
//! parallel loop over all cells.
//!
//! # Phase Order (Canonical)
//!
//! Phases are applied in this strict order each step:
//!
//! 1. **Emissions injection** (with the implicit `Ci ← Cf` swap)
//! 2. **Upwind advection**
//! 3. **Mixing** (ACM2 convective + local eddy diffusion)
//! 4. **Meander mixing** (only if configured)
//! 5. **Dry deposition**
//! 6. **Wet deposition**
//! 7. **Chemistry**
//!
//! Within a phase no ordering is guaranteed across cells: a manipulator may
//! read the beginning-of-step `Ci` of any cell but writes only its own
//! end-of-step `Cf`, so any permutation is correct and no locks are needed.

mod advection;
mod deposition;
mod mixing;

pub use advection::UpwindAdvection;
pub use deposition::{DryDepClass, DryDeposition, WetDepClass, WetDeposition};
pub use mixing::{MeanderMixing, Mixing};

use crate::grid::{Cell, Grid, NeighborRef, SpeciesField};

/// Read-only view of the beginning-of-step state, handed to manipulators.
///
/// Resolves neighbor references to their `Ci` species vectors; boundary
/// ghosts resolve to a shared zero slice, which is how the zero-concentration
/// boundary condition enters every stencil uniformly.
pub struct StepContext<'a> {
    grid: &'a Grid,
    ci: &'a SpeciesField,
    zero: &'a [f64],
}

impl<'a> StepContext<'a> {
    /// Create a context for one phase.
    ///
    /// # Panics
    ///
    /// Panics if `zero` is not a zeroed slice as wide as the species vector.
    #[must_use]
    pub fn new(grid: &'a Grid, ci: &'a SpeciesField, zero: &'a [f64]) -> Self {
        assert!(
            zero.len() == ci.nspecies() && zero.iter().all(|&v| v == 0.0),
            "zero slice must match the species vector"
        );
        Self { grid, ci, zero }
    }

    /// Beginning-of-step concentrations of the cell behind a neighbor
    /// reference. Zero for boundary ghosts.
    #[must_use]
    pub fn conc(&self, target: NeighborRef) -> &'a [f64] {
        match target {
            NeighborRef::Interior(row) => self.ci.cell(row),
            NeighborRef::Boundary(_) => self.zero,
        }
    }

    /// Beginning-of-step concentrations of one interior cell.
    #[must_use]
    pub fn conc_at(&self, row: usize) -> &'a [f64] {
        self.ci.cell(row)
    }

    /// One interior cell of the arena.
    #[must_use]
    pub fn cell(&self, row: usize) -> &'a Cell {
        self.grid.cell(row)
    }
}

/// One physical or chemical process applied to one cell over one step.
///
/// Implementations read `Ci` (their own and any neighbor's, through the
/// context) and write additively into `cf`, their own cell's end-of-step
/// vector. They must be total on well-formed input: no errors, no panics.
pub trait CellManipulator: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Apply the process to `cell` over `dt` seconds.
    fn apply(&self, cell: &Cell, ctx: &StepContext<'_>, cf: &mut [f64], dt: f64);
}

impl std::fmt::Debug for dyn CellManipulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellManipulator")
            .field("name", &self.name())
            .finish()
    }
}
