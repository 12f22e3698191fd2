//! Grid construction from preprocessor cell records.
//!
//! Construction resolves the direction-indexed row lists into typed
//! neighbor references, materializes boundary ghosts on open faces,
//! precomputes the face geometry the stencils use, and then validates every
//! structural invariant the operators rely on. A grid that constructs
//! successfully is safe to step without further checks.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::grid::cell::{
    BoundaryCell, Cell, CellRecord, Direction, FaceNeighbor, GroundNeighbor, NeighborRef,
};
use crate::grid::field::SpeciesField;

/// Relative tolerance for the ACM2 column mass-balance check.
const CONVECTIVE_BALANCE_REL_TOL: f64 = 1.0e-8;

/// Tolerance on per-face coverage-fraction sums.
const FRAC_SUM_TOL: f64 = 1.0e-6;

/// Relative tolerance when cross-checking face values seen from both sides.
const FACE_MATCH_REL_TOL: f64 = 1.0e-3;

/// Harmonic mean of two diffusivities, the appropriate average on a face
/// between two different media. Zero if either side is zero.
#[must_use]
pub fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a + b == 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

/// The immutable simulation arena: interior cells keyed by dense `row`
/// index plus the five boundary ghost sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    cells: Vec<Cell>,
    boundary_west: Vec<BoundaryCell>,
    boundary_east: Vec<BoundaryCell>,
    boundary_south: Vec<BoundaryCell>,
    boundary_north: Vec<BoundaryCell>,
    boundary_top: Vec<BoundaryCell>,
    nspecies: usize,
}

impl Grid {
    /// Build a grid from preprocessor records and return it together with
    /// the initial (background) concentration field.
    ///
    /// The legacy scale knobs in `config` are applied here, once: face
    /// winds by `wind_speed_scale` and wet-deposition rates by
    /// `wet_dep_scale`.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadTopology`] if a neighbor index is out of range, a
    /// record's row disagrees with its position, a non-ground cell has no
    /// below neighbors, a background vector has the wrong width, or any
    /// structural invariant fails; [`EngineError::ConvectiveImbalance`] if
    /// the ACM2 rates violate column mass balance.
    pub fn build(
        records: &[CellRecord],
        nspecies: usize,
        config: &EngineConfig,
    ) -> Result<(Grid, SpeciesField), EngineError> {
        if records.is_empty() {
            return Err(EngineError::BadTopology(
                "grid must contain at least one cell".to_string(),
            ));
        }
        for (i, rec) in records.iter().enumerate() {
            if rec.row != i {
                return Err(EngineError::BadTopology(format!(
                    "record at position {i} claims row {}",
                    rec.row
                )));
            }
        }

        let mut grid = Grid {
            cells: Vec::with_capacity(records.len()),
            boundary_west: Vec::new(),
            boundary_east: Vec::new(),
            boundary_south: Vec::new(),
            boundary_north: Vec::new(),
            boundary_top: Vec::new(),
            nspecies,
        };

        for rec in records {
            let mut cell = cell_from_record(rec, config);
            for dir in Direction::ALL {
                let list = match dir {
                    Direction::West => &rec.west,
                    Direction::East => &rec.east,
                    Direction::South => &rec.south,
                    Direction::North => &rec.north,
                    Direction::Below => &rec.below,
                    Direction::Above => &rec.above,
                };
                let neighbors = grid.resolve_face(rec, records, dir, list)?;
                match dir {
                    Direction::West => cell.west = neighbors,
                    Direction::East => cell.east = neighbors,
                    Direction::South => cell.south = neighbors,
                    Direction::North => cell.north = neighbors,
                    Direction::Below => cell.below = neighbors,
                    Direction::Above => cell.above = neighbors,
                }
            }
            cell.ground_level = resolve_ground(rec, records)?;
            grid.cells.push(cell);
        }

        let initial = initial_concentrations(records, nspecies)?;
        grid.validate()?;

        info!(
            cells = grid.cells.len(),
            ghosts = grid.boundary_count(),
            species = nspecies,
            "grid constructed"
        );
        Ok((grid, initial))
    }

    /// Resolve one face's index list into neighbor entries, materializing a
    /// boundary ghost when the list is empty.
    fn resolve_face(
        &mut self,
        rec: &CellRecord,
        records: &[CellRecord],
        dir: Direction,
        list: &[usize],
    ) -> Result<Vec<FaceNeighbor>, EngineError> {
        // The ground is a no-flux boundary: a layer-0 cell is its own
        // below-neighbor regardless of what the record says.
        if dir == Direction::Below && rec.layer == 0 {
            return Ok(vec![FaceNeighbor {
                target: NeighborRef::Interior(rec.row),
                frac: 1.0,
                k_at_face: rec.kzz,
                center_dist: rec.dz,
            }]);
        }

        if list.is_empty() {
            if dir == Direction::Below {
                return Err(EngineError::BadTopology(format!(
                    "cell {} at layer {} has no below neighbors",
                    rec.row, rec.layer
                )));
            }
            let ghost = BoundaryCell {
                dx: rec.dx,
                dy: rec.dy,
                dz: rec.dz,
                kxxyy: rec.kxxyy,
                kzz: rec.kzz,
                interior_row: rec.row,
            };
            let set = self.boundary_set_mut(dir);
            set.push(ghost);
            let slot = set.len() - 1;
            // The ghost inherits this cell's geometry and Ks, so the face
            // values collapse to the cell's own.
            let (k_self, size_self) = match dir {
                Direction::West | Direction::East => (rec.kxxyy, rec.dx),
                Direction::South | Direction::North => (rec.kxxyy, rec.dy),
                Direction::Below | Direction::Above => (rec.kzz, rec.dz),
            };
            return Ok(vec![FaceNeighbor {
                target: NeighborRef::Boundary(slot),
                frac: 1.0,
                k_at_face: k_self,
                center_dist: size_self,
            }]);
        }

        let mut neighbors = Vec::with_capacity(list.len());
        for &j in list {
            let nb = records.get(j).ok_or_else(|| {
                EngineError::BadTopology(format!(
                    "{} index {j} out of range ({} cells) at cell {}",
                    dir.name(),
                    records.len(),
                    rec.row
                ))
            })?;
            let (frac, k_at_face, center_dist) = match dir {
                Direction::West | Direction::East => (
                    (nb.dy / rec.dy).min(1.0),
                    harmonic_mean(rec.kxxyy, nb.kxxyy),
                    0.5 * (rec.dx + nb.dx),
                ),
                Direction::South | Direction::North => (
                    (nb.dx / rec.dx).min(1.0),
                    harmonic_mean(rec.kxxyy, nb.kxxyy),
                    0.5 * (rec.dy + nb.dy),
                ),
                Direction::Below | Direction::Above => (
                    (nb.dx * nb.dy / (rec.dx * rec.dy)).min(1.0),
                    harmonic_mean(rec.kzz, nb.kzz),
                    0.5 * (rec.dz + nb.dz),
                ),
            };
            neighbors.push(FaceNeighbor {
                target: NeighborRef::Interior(j),
                frac,
                k_at_face,
                center_dist,
            });
        }
        Ok(neighbors)
    }

    fn boundary_set_mut(&mut self, dir: Direction) -> &mut Vec<BoundaryCell> {
        match dir {
            Direction::West => &mut self.boundary_west,
            Direction::East => &mut self.boundary_east,
            Direction::South => &mut self.boundary_south,
            Direction::North => &mut self.boundary_north,
            Direction::Above => &mut self.boundary_top,
            Direction::Below => unreachable!("the ground has no ghost set"),
        }
    }

    /// All interior cells, in row order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// One interior cell.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn cell(&self, row: usize) -> &Cell {
        &self.cells[row]
    }

    /// Number of interior cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the grid has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Species vector width this grid was built for.
    #[must_use]
    pub fn nspecies(&self) -> usize {
        self.nspecies
    }

    /// The boundary ghost set for one direction. Empty for `Below`: the
    /// ground is modeled by self-reference, not by ghosts.
    #[must_use]
    pub fn boundary(&self, dir: Direction) -> &[BoundaryCell] {
        match dir {
            Direction::West => &self.boundary_west,
            Direction::East => &self.boundary_east,
            Direction::South => &self.boundary_south,
            Direction::North => &self.boundary_north,
            Direction::Above => &self.boundary_top,
            Direction::Below => &[],
        }
    }

    /// Total ghost count across all boundary sets.
    #[must_use]
    pub fn boundary_count(&self) -> usize {
        self.boundary_west.len()
            + self.boundary_east.len()
            + self.boundary_south.len()
            + self.boundary_north.len()
            + self.boundary_top.len()
    }

    /// Check every structural invariant: neighbor symmetry, face-value
    /// agreement from both sides, coverage-fraction sums, layer integrity,
    /// ground-level chains and ACM2 column mass balance.
    ///
    /// Run automatically by [`Grid::build`] and after deserialization; a
    /// grid that passes is safe to step.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadTopology`] or [`EngineError::ConvectiveImbalance`]
    /// naming the first offending cell.
    pub fn validate(&self) -> Result<(), EngineError> {
        for cell in &self.cells {
            self.validate_faces(cell)?;
            self.validate_layers(cell)?;
            self.validate_ground(cell)?;
            self.validate_convective_balance(cell)?;
        }
        Ok(())
    }

    fn validate_faces(&self, cell: &Cell) -> Result<(), EngineError> {
        for dir in Direction::ALL {
            let neighbors = cell.neighbors(dir);
            if neighbors.is_empty() {
                return Err(EngineError::BadTopology(format!(
                    "cell {} has an unlinked {} face",
                    cell.row,
                    dir.name()
                )));
            }

            let frac_sum: f64 = neighbors.iter().map(|n| n.frac).sum();
            if (frac_sum - 1.0).abs() > FRAC_SUM_TOL {
                return Err(EngineError::BadTopology(format!(
                    "{} coverage fractions at cell {} sum to {frac_sum}, expected 1",
                    dir.name(),
                    cell.row
                )));
            }

            for n in neighbors {
                let Some(other_row) = n.target.interior() else {
                    continue;
                };
                if other_row >= self.cells.len() {
                    return Err(EngineError::BadTopology(format!(
                        "{} neighbor {other_row} of cell {} out of range",
                        dir.name(),
                        cell.row
                    )));
                }
                // A layer-0 cell's self-referential bottom face has no
                // mirror entry to check.
                if other_row == cell.row {
                    continue;
                }
                let other = &self.cells[other_row];
                let mirror = other
                    .neighbors(dir.opposite())
                    .iter()
                    .find(|m| m.target == NeighborRef::Interior(cell.row))
                    .ok_or_else(|| {
                        EngineError::BadTopology(format!(
                            "cell {other_row} does not mirror the {} link from cell {}",
                            dir.name(),
                            cell.row
                        ))
                    })?;
                if !close_rel(mirror.k_at_face, n.k_at_face, FACE_MATCH_REL_TOL)
                    || !close_rel(mirror.center_dist, n.center_dist, FACE_MATCH_REL_TOL)
                {
                    return Err(EngineError::BadTopology(format!(
                        "face values between cells {} and {other_row} disagree across the {} face",
                        cell.row,
                        dir.name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_layers(&self, cell: &Cell) -> Result<(), EngineError> {
        for n in &cell.above {
            if let Some(row) = n.target.interior() {
                if self.cells[row].layer != cell.layer + 1 {
                    return Err(EngineError::BadTopology(format!(
                        "cell {} at layer {} has above neighbor {row} at layer {}",
                        cell.row, cell.layer, self.cells[row].layer
                    )));
                }
            }
        }
        for n in &cell.below {
            let Some(row) = n.target.interior() else {
                return Err(EngineError::BadTopology(format!(
                    "cell {} has a ghost below neighbor",
                    cell.row
                )));
            };
            if cell.layer == 0 {
                if row != cell.row {
                    return Err(EngineError::BadTopology(format!(
                        "ground cell {} must be its own below neighbor",
                        cell.row
                    )));
                }
            } else if self.cells[row].layer + 1 != cell.layer {
                return Err(EngineError::BadTopology(format!(
                    "cell {} at layer {} has below neighbor {row} at layer {}",
                    cell.row, cell.layer, self.cells[row].layer
                )));
            }
        }
        Ok(())
    }

    fn validate_ground(&self, cell: &Cell) -> Result<(), EngineError> {
        if cell.ground_level.is_empty() {
            return Err(EngineError::BadTopology(format!(
                "cell {} has no ground-level projection",
                cell.row
            )));
        }
        for g in &cell.ground_level {
            if g.row >= self.cells.len() {
                return Err(EngineError::BadTopology(format!(
                    "ground-level index {} of cell {} out of range",
                    g.row, cell.row
                )));
            }
            if self.cells[g.row].layer != 0 {
                return Err(EngineError::BadTopology(format!(
                    "ground-level projection of cell {} hits cell {} at layer {}",
                    cell.row,
                    g.row,
                    self.cells[g.row].layer
                )));
            }
        }
        if cell.layer == 0 && !cell.ground_level.iter().any(|g| g.row == cell.row) {
            return Err(EngineError::BadTopology(format!(
                "ground cell {} is missing from its own ground-level projection",
                cell.row
            )));
        }
        Ok(())
    }

    fn validate_convective_balance(&self, cell: &Cell) -> Result<(), EngineError> {
        if !cell.below_pbl() {
            return Ok(());
        }
        let Some(above_row) = cell.above.first().and_then(|n| n.target.interior()) else {
            return Ok(());
        };
        let above = &self.cells[above_row];
        let residual = cell.m2u - cell.m2d + above.m2d * above.dz / cell.dz;
        if residual.abs() > CONVECTIVE_BALANCE_REL_TOL * cell.m2u.abs() {
            return Err(EngineError::ConvectiveImbalance {
                row: cell.row,
                residual,
                m2u: cell.m2u,
            });
        }
        Ok(())
    }
}

fn close_rel(a: f64, b: f64, rel_tol: f64) -> bool {
    (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}

fn cell_from_record(rec: &CellRecord, config: &EngineConfig) -> Cell {
    let ws = config.wind_speed_scale;
    let wd = config.wet_dep_scale;
    Cell {
        row: rec.row,
        layer: rec.layer,
        dx: rec.dx,
        dy: rec.dy,
        dz: rec.dz,
        volume: rec.dx * rec.dy * rec.dz,
        u_plus: rec.u_plus * ws,
        u_minus: rec.u_minus * ws,
        v_plus: rec.v_plus * ws,
        v_minus: rec.v_minus * ws,
        w_plus: rec.w_plus * ws,
        w_minus: rec.w_minus * ws,
        kxxyy: rec.kxxyy,
        kzz: rec.kzz,
        m2u: rec.m2u,
        m2d: rec.m2d,
        pbl_top_layer: rec.pbl_top_layer,
        so2_oxidation: rec.so2_oxidation,
        nh_partitioning: rec.nh_partitioning,
        no_partitioning: rec.no_partitioning,
        aorg_partitioning: rec.aorg_partitioning,
        so2_wet_dep: rec.so2_wet_dep * wd,
        other_gas_wet_dep: rec.other_gas_wet_dep * wd,
        particle_wet_dep: rec.particle_wet_dep * wd,
        dry_dep: rec.dry_dep,
        temperature: rec.temperature,
        wind_speed: rec.wind_speed,
        s1: rec.s1,
        sclass: rec.sclass,
        west: Vec::new(),
        east: Vec::new(),
        south: Vec::new(),
        north: Vec::new(),
        below: Vec::new(),
        above: Vec::new(),
        ground_level: Vec::new(),
    }
}

fn resolve_ground(
    rec: &CellRecord,
    records: &[CellRecord],
) -> Result<Vec<GroundNeighbor>, EngineError> {
    let mut ground = Vec::with_capacity(rec.ground_level.len());
    for &j in &rec.ground_level {
        let g = records.get(j).ok_or_else(|| {
            EngineError::BadTopology(format!(
                "ground-level index {j} out of range ({} cells) at cell {}",
                records.len(),
                rec.row
            ))
        })?;
        ground.push(GroundNeighbor {
            row: j,
            frac: (g.dx * g.dy / (rec.dx * rec.dy)).min(1.0),
        });
    }
    Ok(ground)
}

fn initial_concentrations(
    records: &[CellRecord],
    nspecies: usize,
) -> Result<SpeciesField, EngineError> {
    let mut initial = SpeciesField::new(records.len(), nspecies);
    for rec in records {
        if rec.background.is_empty() {
            continue;
        }
        if rec.background.len() != nspecies {
            return Err(EngineError::BadTopology(format!(
                "cell {} carries {} background values for {nspecies} species",
                rec.row,
                rec.background.len()
            )));
        }
        initial.cell_mut(rec.row).copy_from_slice(&rec.background);
    }
    Ok(initial)
}
