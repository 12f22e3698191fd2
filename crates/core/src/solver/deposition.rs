//! Dry and wet deposition.
//!
//! Dry deposition acts only in the lowest layer, as an exponential
//! attenuation by the class-specific deposition velocity over the cell
//! height. Wet deposition scavenges at a first-order rate in every layer.
//! Both subtract from `Cf` based on `Ci`, so a rate overshooting one time
//! step can never drive a concentration negative on its own.
//!
//! Which class each species belongs to is the mechanism's business; the
//! operators here just carry the per-species class tables they are built
//! with.

use crate::grid::Cell;
use crate::solver::{CellManipulator, StepContext};

/// Dry-deposition class of one species, selecting which of the cell's
/// deposition velocities applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryDepClass {
    /// Nitrogen oxides.
    Nox,
    /// Sulfur dioxide.
    So2,
    /// Volatile organic compounds.
    Voc,
    /// Ammonia.
    Nh3,
    /// Fine particles.
    Particle,
}

/// Wet-deposition class of one species, selecting which of the cell's
/// scavenging rates applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WetDepClass {
    /// Sulfur dioxide.
    So2,
    /// Any other gas.
    OtherGas,
    /// Fine particles.
    Particle,
}

/// Dry deposition at the surface.
pub struct DryDeposition {
    /// Per-species deposition class, indexed like the species vector.
    classes: Vec<DryDepClass>,
}

impl DryDeposition {
    /// Build the operator from a mechanism's per-species class table.
    #[must_use]
    pub fn new(classes: Vec<DryDepClass>) -> Self {
        Self { classes }
    }
}

impl CellManipulator for DryDeposition {
    fn name(&self) -> &'static str {
        "dry deposition"
    }

    fn apply(&self, cell: &Cell, ctx: &StepContext<'_>, cf: &mut [f64], dt: f64) {
        if cell.layer != 0 {
            return;
        }
        let ci = ctx.conc_at(cell.row);
        let fac = dt / cell.dz;
        for (ii, &class) in self.classes.iter().enumerate() {
            let v = match class {
                DryDepClass::Nox => cell.dry_dep.nox,
                DryDepClass::So2 => cell.dry_dep.so2,
                DryDepClass::Voc => cell.dry_dep.voc,
                DryDepClass::Nh3 => cell.dry_dep.nh3,
                DryDepClass::Particle => cell.dry_dep.particle,
            };
            cf[ii] -= ci[ii] * (1.0 - (-v * fac).exp());
        }
    }
}

/// First-order wet scavenging in every layer.
pub struct WetDeposition {
    /// Per-species scavenging class, indexed like the species vector.
    classes: Vec<WetDepClass>,
}

impl WetDeposition {
    /// Build the operator from a mechanism's per-species class table.
    #[must_use]
    pub fn new(classes: Vec<WetDepClass>) -> Self {
        Self { classes }
    }
}

impl CellManipulator for WetDeposition {
    fn name(&self) -> &'static str {
        "wet deposition"
    }

    fn apply(&self, cell: &Cell, ctx: &StepContext<'_>, cf: &mut [f64], dt: f64) {
        let ci = ctx.conc_at(cell.row);
        for (ii, &class) in self.classes.iter().enumerate() {
            let rate = match class {
                WetDepClass::So2 => cell.so2_wet_dep,
                WetDepClass::OtherGas => cell.other_gas_wet_dep,
                WetDepClass::Particle => cell.particle_wet_dep,
            };
            cf[ii] -= ci[ii] * rate * dt;
        }
    }
}
