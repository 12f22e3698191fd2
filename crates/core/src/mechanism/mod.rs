//! Chemistry mechanism plug-ins.
//!
//! A mechanism owns the species vector: how wide it is, what the indices
//! mean, how named inventory pollutants map onto it, which deposition class
//! each species belongs to, and how output variables are computed from it.
//! Species index assignments never leak to the engine; everything crosses
//! this interface by name.

mod simple;

pub use simple::{SimpleMechanism, SulfurOxidationForm};

use crate::error::EngineError;
use crate::grid::Cell;
use crate::solver::CellManipulator;

/// A chemistry mechanism.
///
/// Chemistry is O(species) per cell and far from the hot loop, so dynamic
/// dispatch here costs nothing measurable and keeps the engine independent
/// of any particular species set.
pub trait Mechanism: Send + Sync {
    /// Width of the per-cell species vector.
    fn species_count(&self) -> usize;

    /// Stable labels for the species, index-aligned with the vector.
    fn species_names(&self) -> &'static [&'static str];

    /// Translate a named inventory pollutant emitted at `rate` μg/s in
    /// `cell` into per-species μg/m³/s contributions added to `emis`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSpecies`] for a pollutant name this mechanism
    /// does not map.
    fn add_emis_flux(
        &self,
        cell: &Cell,
        emis: &mut [f64],
        pollutant: &str,
        rate: f64,
    ) -> Result<(), EngineError>;

    /// The chemistry operator.
    fn chemistry(&self) -> Box<dyn CellManipulator>;

    /// The dry-deposition operator for a named scheme.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownScheme`] if the mechanism has no such scheme.
    fn dry_dep(&self, scheme: &str) -> Result<Box<dyn CellManipulator>, EngineError>;

    /// The wet-deposition operator for a named scheme.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownScheme`] if the mechanism has no such scheme.
    fn wet_dep(&self, scheme: &str) -> Result<Box<dyn CellManipulator>, EngineError>;

    /// Names of the output variables this mechanism can compute.
    fn output_names(&self) -> &'static [&'static str];

    /// Compute one output variable from a cell's species vector.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSpecies`] for a variable name this mechanism
    /// does not define.
    fn value(&self, conc: &[f64], var: &str) -> Result<f64, EngineError>;

    /// Units of one output variable.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSpecies`] for a variable name this mechanism
    /// does not define.
    fn units(&self, var: &str) -> Result<&'static str, EngineError>;
}
