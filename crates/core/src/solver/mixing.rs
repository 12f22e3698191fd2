//! Turbulent mixing.
//!
//! Vertical mixing follows ACM2 (Pleim 2007), a combined local + non-local
//! boundary-layer scheme. Within the PBL every cell receives non-local
//! upward convection directly from the ground-level cells beneath it and
//! returns mass through a local downward rate:
//!
//! ```text
//! ∂c/∂t = M2u·c_ground + Σ_above (M2d_a·c_a·Δz_a/Δz − M2d·c)
//! ```
//!
//! balanced so that `M2u(k) − M2d(k) + M2d(k+1)·Δz(k+1)/Δz(k) = 0` below
//! the PBL top (validated at grid construction). Above the PBL, and on all
//! horizontal faces, only local eddy diffusion applies, in gradient form
//! with the harmonic-mean face diffusivity:
//!
//! ```text
//! ∂c/∂t = K_face·(c_nbr − c)/Δ_half / Δ_own
//! ```

use crate::grid::{Cell, FaceNeighbor};
use crate::solver::{CellManipulator, StepContext};

/// Local gradient diffusion across one face list.
fn diffuse_face(
    ctx: &StepContext<'_>,
    cf: &mut [f64],
    ci: &[f64],
    neighbors: &[FaceNeighbor],
    inv_own_size: f64,
    dt: f64,
) {
    for n in neighbors {
        let nc = ctx.conc(n.target);
        let scale = n.k_at_face / n.center_dist * inv_own_size * n.frac * dt;
        for (cfv, (&nv, &cv)) in cf.iter_mut().zip(nc.iter().zip(ci)) {
            *cfv += scale * (nv - cv);
        }
    }
}

/// ACM2 convective mixing plus local eddy diffusion.
pub struct Mixing;

impl CellManipulator for Mixing {
    fn name(&self) -> &'static str {
        "mixing"
    }

    fn apply(&self, cell: &Cell, ctx: &StepContext<'_>, cf: &mut [f64], dt: f64) {
        let ci = ctx.conc_at(cell.row);

        if cell.below_pbl() {
            // Non-local upward convection straight from the ground cells.
            for g in &cell.ground_level {
                let gc = ctx.conc_at(g.row);
                let scale = cell.m2u * g.frac * dt;
                for (cfv, &gv) in cf.iter_mut().zip(gc) {
                    *cfv += scale * gv;
                }
            }
            // Downward return flow from above, less this cell's own export.
            for n in &cell.above {
                let nc = ctx.conc(n.target);
                let (m2d_a, dz_a) = n
                    .target
                    .interior()
                    .map_or((0.0, 0.0), |row| {
                        let a = ctx.cell(row);
                        (a.m2d, a.dz)
                    });
                let down = m2d_a * dz_a / cell.dz;
                for (cfv, (&nv, &cv)) in cf.iter_mut().zip(nc.iter().zip(ci)) {
                    *cfv += (down * nv - cell.m2d * cv) * n.frac * dt;
                }
            }
        }

        let inv_dz = 1.0 / cell.dz;
        diffuse_face(ctx, cf, ci, &cell.above, inv_dz, dt);
        diffuse_face(ctx, cf, ci, &cell.below, inv_dz, dt);

        let inv_dx = 1.0 / cell.dx;
        diffuse_face(ctx, cf, ci, &cell.west, inv_dx, dt);
        diffuse_face(ctx, cf, ci, &cell.east, inv_dx, dt);

        let inv_dy = 1.0 / cell.dy;
        diffuse_face(ctx, cf, ci, &cell.south, inv_dy, dt);
        diffuse_face(ctx, cf, ci, &cell.north, inv_dy, dt);
    }
}

/// Optional plume-meander enhancement: an extra horizontal diffusion pass
/// scaled by a configurable factor. Disabled by default.
pub struct MeanderMixing {
    /// Multiplier on the horizontal face diffusivities.
    pub factor: f64,
}

impl CellManipulator for MeanderMixing {
    fn name(&self) -> &'static str {
        "meander"
    }

    fn apply(&self, cell: &Cell, ctx: &StepContext<'_>, cf: &mut [f64], dt: f64) {
        let ci = ctx.conc_at(cell.row);
        let scaled_dt = self.factor * dt;

        let inv_dx = 1.0 / cell.dx;
        diffuse_face(ctx, cf, ci, &cell.west, inv_dx, scaled_dt);
        diffuse_face(ctx, cf, ci, &cell.east, inv_dx, scaled_dt);

        let inv_dy = 1.0 / cell.dy;
        diffuse_face(ctx, cf, ci, &cell.south, inv_dy, scaled_dt);
        diffuse_face(ctx, cf, ci, &cell.north, inv_dy, scaled_dt);
    }
}
