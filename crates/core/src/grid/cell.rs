//! Cell records and neighbor topology.
//!
//! The grid is an arena of cells keyed by a dense `row` index. Neighbor
//! relations are stored as typed indices, never pointers: an interior
//! neighbor is a row in the arena, a boundary neighbor is a slot in the
//! ghost set for that face's direction. Each neighbor entry also caches the
//! face geometry the transport stencils need (coverage fraction, staggered
//! face diffusivity, center-to-center distance) so operators stay within a
//! local star of the arena during a phase.

use serde::{Deserialize, Serialize};

/// The six face directions plus the ground-level projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Negative x.
    West,
    /// Positive x.
    East,
    /// Negative y.
    South,
    /// Positive y.
    North,
    /// Negative z.
    Below,
    /// Positive z.
    Above,
}

impl Direction {
    /// All six directions in stencil order.
    pub const ALL: [Direction; 6] = [
        Direction::West,
        Direction::East,
        Direction::South,
        Direction::North,
        Direction::Below,
        Direction::Above,
    ];

    /// The direction on the other side of a shared face.
    #[must_use]
    pub fn opposite(self) -> Direction {
        match self {
            Direction::West => Direction::East,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::North => Direction::South,
            Direction::Below => Direction::Above,
            Direction::Above => Direction::Below,
        }
    }

    /// Lowercase name for log and error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Direction::West => "west",
            Direction::East => "east",
            Direction::South => "south",
            Direction::North => "north",
            Direction::Below => "below",
            Direction::Above => "above",
        }
    }
}

/// A typed reference to the cell on the other side of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborRef {
    /// Another cell in the arena, by row.
    Interior(usize),
    /// A ghost in the boundary set for this face's direction. Ghost cells
    /// hold concentration zero for the whole simulation.
    Boundary(usize),
}

impl NeighborRef {
    /// Row index if this is an interior reference.
    #[must_use]
    pub fn interior(self) -> Option<usize> {
        match self {
            NeighborRef::Interior(row) => Some(row),
            NeighborRef::Boundary(_) => None,
        }
    }
}

/// One neighbor on one face, with the precomputed face geometry.
///
/// Variable resolution means a face can abut several smaller neighbors;
/// each gets its own entry and the coverage fractions tile the face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceNeighbor {
    /// The cell on the other side.
    pub target: NeighborRef,
    /// Fraction of this face covered by the neighbor, `min(ratio, 1)`.
    pub frac: f64,
    /// Harmonic-mean diffusivity at the shared face (m²/s). Identical seen
    /// from either side of the face.
    pub k_at_face: f64,
    /// Center-to-center distance, arithmetic mean of the two cell sizes (m).
    pub center_dist: f64,
}

/// Projection of a cell onto the ground-level cell(s) directly beneath it,
/// used by the non-local convective mixing terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundNeighbor {
    /// Row of the layer-0 cell.
    pub row: usize,
    /// Area fraction of this cell's footprint over that ground cell.
    pub frac: f64,
}

/// Dry-deposition velocities by pollutant class (m/s), valid at layer 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DryDepVelocities {
    /// Nitrogen oxides.
    pub nox: f64,
    /// Sulfur dioxide.
    pub so2: f64,
    /// Volatile organic compounds.
    pub voc: f64,
    /// Ammonia.
    pub nh3: f64,
    /// Fine particulate matter.
    pub particle: f64,
}

/// One cell of the simulation arena.
///
/// Geometry, topology, winds and rates are immutable after grid
/// construction; concentrations live in the separate
/// [`SpeciesField`](crate::grid::SpeciesField) arrays keyed by `row`.
///
/// Winds are stored pre-split into nonnegative directional magnitudes on
/// the staggered (Arakawa-C) faces, which keeps the advection inner loop
/// branch-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Master index of this cell in the arena.
    pub row: usize,
    /// Vertical layer, 0 at the ground.
    pub layer: usize,

    /// Cell size along x (m).
    pub dx: f64,
    /// Cell size along y (m).
    pub dy: f64,
    /// Cell size along z (m).
    pub dz: f64,
    /// `dx · dy · dz` (m³).
    pub volume: f64,

    /// Eastward wind magnitude on the x faces (m/s).
    pub u_plus: f64,
    /// Westward wind magnitude on the x faces (m/s).
    pub u_minus: f64,
    /// Northward wind magnitude on the y faces (m/s).
    pub v_plus: f64,
    /// Southward wind magnitude on the y faces (m/s).
    pub v_minus: f64,
    /// Upward wind magnitude on the z faces (m/s).
    pub w_plus: f64,
    /// Downward wind magnitude on the z faces (m/s).
    pub w_minus: f64,

    /// Cell-center horizontal eddy diffusivity (m²/s).
    pub kxxyy: f64,
    /// Cell-center vertical eddy diffusivity (m²/s).
    pub kzz: f64,

    /// ACM2 non-local upward mixing rate into this cell (1/s).
    pub m2u: f64,
    /// ACM2 non-local downward mixing rate out of this cell (1/s).
    pub m2d: f64,
    /// Fractional layer index of the boundary-layer top.
    pub pbl_top_layer: f64,

    /// First-order SO₂ → sulfate oxidation rate (1/s).
    pub so2_oxidation: f64,
    /// Equilibrium particulate fraction of total ammonia-N, 0..1.
    pub nh_partitioning: f64,
    /// Equilibrium particulate fraction of total nitrate-N, 0..1.
    pub no_partitioning: f64,
    /// Equilibrium particulate fraction of anthropogenic organics, 0..1.
    pub aorg_partitioning: f64,

    /// Wet scavenging rate for SO₂ (1/s).
    pub so2_wet_dep: f64,
    /// Wet scavenging rate for other gases (1/s).
    pub other_gas_wet_dep: f64,
    /// Wet scavenging rate for particles (1/s).
    pub particle_wet_dep: f64,
    /// Dry-deposition velocities by class (m/s).
    pub dry_dep: DryDepVelocities,

    /// Ambient temperature (K); carried through for diagnostic output.
    pub temperature: f64,
    /// Scalar wind speed (m/s); carried through for diagnostic output.
    pub wind_speed: f64,
    /// Atmospheric stability parameter; carried through for output.
    pub s1: f64,
    /// Atmospheric stability class; carried through for output.
    pub sclass: f64,

    /// Neighbors on the west face.
    pub west: Vec<FaceNeighbor>,
    /// Neighbors on the east face.
    pub east: Vec<FaceNeighbor>,
    /// Neighbors on the south face.
    pub south: Vec<FaceNeighbor>,
    /// Neighbors on the north face.
    pub north: Vec<FaceNeighbor>,
    /// Neighbors on the bottom face. For layer-0 cells this is the cell
    /// itself, modeling no flux through the ground.
    pub below: Vec<FaceNeighbor>,
    /// Neighbors on the top face.
    pub above: Vec<FaceNeighbor>,
    /// Layer-0 cells directly beneath this cell.
    pub ground_level: Vec<GroundNeighbor>,
}

impl Cell {
    /// Neighbor list for one face direction.
    #[must_use]
    pub fn neighbors(&self, dir: Direction) -> &[FaceNeighbor] {
        match dir {
            Direction::West => &self.west,
            Direction::East => &self.east,
            Direction::South => &self.south,
            Direction::North => &self.north,
            Direction::Below => &self.below,
            Direction::Above => &self.above,
        }
    }

    /// Whether this cell sits below the boundary-layer top, where the
    /// non-local convective mixing terms apply.
    #[must_use]
    pub fn below_pbl(&self) -> bool {
        (self.layer as f64) < self.pbl_top_layer
    }

    /// The cell size along the axis a face direction crosses.
    #[must_use]
    pub fn size_along(&self, dir: Direction) -> f64 {
        match dir {
            Direction::West | Direction::East => self.dx,
            Direction::South | Direction::North => self.dy,
            Direction::Below | Direction::Above => self.dz,
        }
    }
}

/// A ghost cell representing one of the five open boundaries (west, east,
/// south, north, top).
///
/// Ghosts inherit the geometry and cell-center diffusivities of the
/// interior cell they border, and hold concentration zero throughout the
/// simulation. The bottom boundary needs no ghost: a layer-0 cell is its
/// own below-neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCell {
    /// Inherited cell size along x (m).
    pub dx: f64,
    /// Inherited cell size along y (m).
    pub dy: f64,
    /// Inherited cell size along z (m).
    pub dz: f64,
    /// Inherited cell-center horizontal diffusivity (m²/s).
    pub kxxyy: f64,
    /// Inherited cell-center vertical diffusivity (m²/s).
    pub kzz: f64,
    /// Row of the interior cell this ghost borders.
    pub interior_row: usize,
}

/// One cell record as produced by the meteorology/chemistry preprocessor.
///
/// Neighbor relations arrive as direction-indexed lists of row indices;
/// grid construction resolves them to typed references and computes the
/// derived face geometry. An empty list on a face means the cell touches
/// the domain boundary there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellRecord {
    /// Master index of this cell; must equal its position in the record
    /// sequence.
    pub row: usize,
    /// Vertical layer, 0 at the ground.
    pub layer: usize,
    /// Cell size along x (m).
    pub dx: f64,
    /// Cell size along y (m).
    pub dy: f64,
    /// Cell size along z (m).
    pub dz: f64,

    /// Eastward wind magnitude (m/s).
    pub u_plus: f64,
    /// Westward wind magnitude (m/s).
    pub u_minus: f64,
    /// Northward wind magnitude (m/s).
    pub v_plus: f64,
    /// Southward wind magnitude (m/s).
    pub v_minus: f64,
    /// Upward wind magnitude (m/s).
    pub w_plus: f64,
    /// Downward wind magnitude (m/s).
    pub w_minus: f64,

    /// Cell-center horizontal eddy diffusivity (m²/s).
    pub kxxyy: f64,
    /// Cell-center vertical eddy diffusivity (m²/s).
    pub kzz: f64,
    /// ACM2 non-local upward mixing rate (1/s).
    pub m2u: f64,
    /// ACM2 non-local downward mixing rate (1/s).
    pub m2d: f64,
    /// Fractional layer index of the boundary-layer top.
    pub pbl_top_layer: f64,

    /// SO₂ oxidation rate (1/s).
    pub so2_oxidation: f64,
    /// Particulate fraction of total ammonia-N at equilibrium.
    pub nh_partitioning: f64,
    /// Particulate fraction of total nitrate-N at equilibrium.
    pub no_partitioning: f64,
    /// Particulate fraction of anthropogenic organics at equilibrium.
    pub aorg_partitioning: f64,
    /// Wet scavenging rate for SO₂ (1/s).
    pub so2_wet_dep: f64,
    /// Wet scavenging rate for other gases (1/s).
    pub other_gas_wet_dep: f64,
    /// Wet scavenging rate for particles (1/s).
    pub particle_wet_dep: f64,
    /// Dry-deposition velocities by class (m/s).
    pub dry_dep: DryDepVelocities,

    /// Ambient temperature (K).
    pub temperature: f64,
    /// Scalar wind speed (m/s).
    pub wind_speed: f64,
    /// Atmospheric stability parameter.
    pub s1: f64,
    /// Atmospheric stability class.
    pub sclass: f64,

    /// Row indices of west neighbors; empty at the domain boundary.
    pub west: Vec<usize>,
    /// Row indices of east neighbors; empty at the domain boundary.
    pub east: Vec<usize>,
    /// Row indices of south neighbors; empty at the domain boundary.
    pub south: Vec<usize>,
    /// Row indices of north neighbors; empty at the domain boundary.
    pub north: Vec<usize>,
    /// Row indices of below neighbors; ignored for layer-0 cells.
    pub below: Vec<usize>,
    /// Row indices of above neighbors; empty at the domain top.
    pub above: Vec<usize>,
    /// Row indices of the layer-0 cells beneath this cell.
    pub ground_level: Vec<usize>,

    /// Background concentrations per species (μg/m³); empty to start from
    /// zero.
    pub background: Vec<f64>,
}
