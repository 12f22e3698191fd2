//! Grid save/load.
//!
//! Serializes the full grid (topology + rates) together with the current
//! concentration state to an opaque byte stream and restores it later. Row
//! identity is preserved verbatim, so neighbor references remain valid, and
//! every structural invariant is re-validated on load so a corrupted or
//! hand-edited stream cannot produce an unsteppable grid.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::grid::build::Grid;
use crate::grid::field::SpeciesField;

/// A grid plus its concentration state, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedGrid {
    /// Topology, geometry and precomputed rates.
    pub grid: Grid,
    /// Beginning-of-step concentrations (μg/m³).
    pub ci: SpeciesField,
    /// End-of-step concentrations (μg/m³).
    pub cf: SpeciesField,
    /// Emissions flux (μg/m³/s).
    pub emis: SpeciesField,
}

/// Write a grid and its concentration state to a byte stream.
///
/// # Errors
///
/// [`EngineError::Persistence`] if serialization or the underlying writer
/// fails.
pub fn save_grid<W: Write>(saved: &SavedGrid, writer: W) -> Result<(), EngineError> {
    serde_json::to_writer(writer, saved)
        .map_err(|e| EngineError::Persistence(format!("failed to serialize grid: {e}")))
}

/// Restore a grid and its concentration state from a byte stream,
/// re-running full structural validation.
///
/// # Errors
///
/// [`EngineError::Persistence`] if the stream cannot be decoded, or any
/// validation error if the decoded grid violates an invariant.
pub fn load_grid<R: Read>(reader: R) -> Result<SavedGrid, EngineError> {
    let saved: SavedGrid = serde_json::from_reader(reader)
        .map_err(|e| EngineError::Persistence(format!("failed to decode grid: {e}")))?;

    saved.grid.validate()?;

    let n = saved.grid.len();
    let s = saved.grid.nspecies();
    for (name, field) in [("Ci", &saved.ci), ("Cf", &saved.cf), ("emisFlux", &saved.emis)] {
        if field.ncells() != n || field.nspecies() != s {
            return Err(EngineError::Persistence(format!(
                "{name} shape {}x{} does not match grid {n}x{s}",
                field.ncells(),
                field.nspecies()
            )));
        }
    }
    Ok(saved)
}
