//! Concentration storage.
//!
//! Per-cell species vectors are stored as one flat `row × species` array so
//! a phase can hand every worker a disjoint mutable slice of its own cell
//! while the whole beginning-of-step array stays shared read-only. This is
//! what makes the per-phase parallel loop safe without any per-cell locks.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A dense `row × species` array of f64 values in row-major order.
///
/// Used for the beginning-of-step concentrations `Ci`, the end-of-step
/// concentrations `Cf` and the emissions flux, all indexed by the cell's
/// `row`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesField {
    /// Values in row-major order (`row * nspecies + species`).
    data: Vec<f64>,
    ncells: usize,
    nspecies: usize,
}

impl SpeciesField {
    /// Create a field of zeros for `ncells` cells of `nspecies` species.
    ///
    /// # Panics
    ///
    /// Panics if `nspecies` is zero; a mechanism always defines at least one
    /// species.
    #[must_use]
    pub fn new(ncells: usize, nspecies: usize) -> Self {
        assert!(nspecies > 0, "species vector must not be empty");
        Self {
            data: vec![0.0; ncells * nspecies],
            ncells,
            nspecies,
        }
    }

    /// Number of cells.
    #[must_use]
    pub fn ncells(&self) -> usize {
        self.ncells
    }

    /// Width of the per-cell species vector.
    #[must_use]
    pub fn nspecies(&self) -> usize {
        self.nspecies
    }

    /// The species vector of one cell.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn cell(&self, row: usize) -> &[f64] {
        assert!(row < self.ncells, "row out of bounds");
        &self.data[row * self.nspecies..(row + 1) * self.nspecies]
    }

    /// Mutable species vector of one cell.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn cell_mut(&mut self, row: usize) -> &mut [f64] {
        assert!(row < self.ncells, "row out of bounds");
        &mut self.data[row * self.nspecies..(row + 1) * self.nspecies]
    }

    /// The whole array as a flat slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Sequential iterator over per-cell species vectors.
    pub fn iter_cells(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.nspecies)
    }

    /// Parallel iterator over per-cell species vectors.
    pub fn par_cells(&self) -> impl IndexedParallelIterator<Item = &[f64]> {
        self.data.par_chunks_exact(self.nspecies)
    }

    /// Parallel iterator over mutable per-cell species vectors. Each worker
    /// owns exactly one cell's slice, so writes never race.
    pub fn par_cells_mut(&mut self) -> impl IndexedParallelIterator<Item = &mut [f64]> {
        self.data.par_chunks_exact_mut(self.nspecies)
    }

    /// Overwrite every value.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Copy all values from another field of identical shape.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    pub fn copy_from(&mut self, other: &SpeciesField) {
        assert!(
            self.ncells == other.ncells && self.nspecies == other.nspecies,
            "field shape mismatch"
        );
        self.data.copy_from_slice(&other.data);
    }

    /// Whether any value is NaN or infinite.
    #[must_use]
    pub fn has_non_finite(&self) -> bool {
        self.data.iter().any(|v| !v.is_finite())
    }
}
