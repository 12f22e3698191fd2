//! The in-memory variable-resolution grid: cell arena, neighbor topology,
//! boundary ghosts, concentration storage and persistence.

mod build;
mod cell;
mod field;
mod persistence;

pub use build::{harmonic_mean, Grid};
pub use cell::{
    BoundaryCell, Cell, CellRecord, Direction, DryDepVelocities, FaceNeighbor, GroundNeighbor,
    NeighborRef,
};
pub use field::SpeciesField;
pub use persistence::{load_grid, save_grid, SavedGrid};
