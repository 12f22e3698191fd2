//! Shared builders for integration tests: a regular box grid with an
//! ACM2-consistent convective profile, in the shape the meteorology
//! preprocessor would produce.
#![allow(dead_code)]

use airshed_core::grid::{CellRecord, DryDepVelocities};

/// Parameters of a regular `nx × ny × nz` test grid.
pub struct GridSpec {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Boundary-layer top as a layer count; layers below it get the
    /// convective profile.
    pub nz_pbl: usize,
    /// Uniform eastward wind (m/s).
    pub u: f64,
    /// Horizontal eddy diffusivity (m²/s).
    pub kxxyy: f64,
    /// Vertical eddy diffusivity (m²/s).
    pub kzz: f64,
    /// ACM2 base rate (1/s): every PBL cell gets `m2u = m0` and
    /// `m2d = m0·(nz_pbl − k)`, which satisfies the column balance exactly
    /// on uniform layers.
    pub m0: f64,
    /// SO₂ oxidation rate (1/s).
    pub so2_oxidation: f64,
    /// All three wet scavenging rates (1/s).
    pub wet_dep: f64,
    /// Dry-deposition velocities (m/s).
    pub dry_dep: DryDepVelocities,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            nx: 4,
            ny: 4,
            nz: 4,
            nz_pbl: 2,
            u: 2.0,
            kxxyy: 5.0,
            kzz: 1.0e-3,
            m0: 1.0e-5,
            so2_oxidation: 1.0e-5,
            wet_dep: 1.0e-6,
            dry_dep: DryDepVelocities {
                nox: 0.002,
                so2: 0.005,
                voc: 0.001,
                nh3: 0.005,
                particle: 0.001,
            },
        }
    }
}

/// Dense row index of cell `(i, j, k)` in a grid built from `spec`.
pub fn row(spec: &GridSpec, i: usize, j: usize, k: usize) -> usize {
    k * spec.nx * spec.ny + j * spec.nx + i
}

/// Build preprocessor records for a regular box grid.
pub fn records(spec: &GridSpec) -> Vec<CellRecord> {
    let mut out = Vec::with_capacity(spec.nx * spec.ny * spec.nz);
    for k in 0..spec.nz {
        for j in 0..spec.ny {
            for i in 0..spec.nx {
                let (m2u, m2d) = if k < spec.nz_pbl {
                    (spec.m0, spec.m0 * (spec.nz_pbl - k) as f64)
                } else {
                    (0.0, 0.0)
                };
                out.push(CellRecord {
                    row: row(spec, i, j, k),
                    layer: k,
                    dx: 1000.0,
                    dy: 1000.0,
                    dz: 50.0,
                    u_plus: spec.u,
                    u_minus: 0.0,
                    v_plus: 0.0,
                    v_minus: 0.0,
                    w_plus: 0.0,
                    w_minus: 0.0,
                    kxxyy: spec.kxxyy,
                    kzz: spec.kzz,
                    m2u,
                    m2d,
                    pbl_top_layer: spec.nz_pbl as f64,
                    so2_oxidation: spec.so2_oxidation,
                    nh_partitioning: 0.4,
                    no_partitioning: 0.6,
                    aorg_partitioning: 0.5,
                    so2_wet_dep: spec.wet_dep,
                    other_gas_wet_dep: spec.wet_dep,
                    particle_wet_dep: spec.wet_dep,
                    dry_dep: spec.dry_dep,
                    temperature: 290.0,
                    wind_speed: spec.u,
                    s1: 0.1,
                    sclass: 1.0,
                    west: if i > 0 {
                        vec![row(spec, i - 1, j, k)]
                    } else {
                        Vec::new()
                    },
                    east: if i + 1 < spec.nx {
                        vec![row(spec, i + 1, j, k)]
                    } else {
                        Vec::new()
                    },
                    south: if j > 0 {
                        vec![row(spec, i, j - 1, k)]
                    } else {
                        Vec::new()
                    },
                    north: if j + 1 < spec.ny {
                        vec![row(spec, i, j + 1, k)]
                    } else {
                        Vec::new()
                    },
                    below: if k > 0 {
                        vec![row(spec, i, j, k - 1)]
                    } else {
                        Vec::new()
                    },
                    above: if k + 1 < spec.nz {
                        vec![row(spec, i, j, k + 1)]
                    } else {
                        Vec::new()
                    },
                    ground_level: vec![row(spec, i, j, 0)],
                    background: Vec::new(),
                });
            }
        }
    }
    out
}

#[ctor::ctor]
fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
