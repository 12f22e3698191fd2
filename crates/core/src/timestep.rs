//! Time-step derivation.
//!
//! The step is set once at initialization and held constant: steady-state
//! iteration has no reason to re-derive it, and a fixed Δt keeps every
//! operator's per-step factors constant. The CFL bound uses the largest
//! directional Courant number anywhere in the grid with a √3 safety factor
//! for the three spatial dimensions.

use tracing::{info, warn};

use crate::config::TimestepMode;
use crate::grid::Grid;

/// CFL-bounded step: `Δt = cmax / √3 / max(u±/Δx, v±/Δy, w±/Δz)` over all
/// cells. `None` when the air is completely still and the bound is
/// undefined.
#[must_use]
pub fn cfl_timestep(grid: &Grid, cmax: f64) -> Option<f64> {
    let max_courant = grid
        .cells()
        .iter()
        .map(|c| {
            (c.u_plus.max(c.u_minus) / c.dx)
                .max(c.v_plus.max(c.v_minus) / c.dy)
                .max(c.w_plus.max(c.w_minus) / c.dz)
        })
        .fold(0.0_f64, f64::max);
    if max_courant > 0.0 {
        Some(cmax / 3.0_f64.sqrt() / max_courant)
    } else {
        None
    }
}

/// Rule-of-thumb step `Δt = Δx/1000 · 6`, taken from the first cell.
///
/// # Panics
///
/// Panics on an empty grid.
#[must_use]
pub fn rule_of_thumb_timestep(grid: &Grid) -> f64 {
    grid.cells()[0].dx / 1000.0 * 6.0
}

/// Derive the per-step Δt for a grid under the configured policy.
#[must_use]
pub fn derive_timestep(grid: &Grid, mode: TimestepMode) -> f64 {
    let dt = match mode {
        TimestepMode::Cfl { cmax } => cfl_timestep(grid, cmax).unwrap_or_else(|| {
            warn!("still air everywhere; falling back to rule-of-thumb step");
            rule_of_thumb_timestep(grid)
        }),
        TimestepMode::RuleOfThumb => rule_of_thumb_timestep(grid),
    };
    info!(dt, "time step fixed for the run");
    dt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::grid::{CellRecord, DryDepVelocities};
    use approx::assert_relative_eq;

    fn windy_cell(u_plus: f64, w_minus: f64) -> Vec<CellRecord> {
        vec![CellRecord {
            row: 0,
            layer: 0,
            dx: 1000.0,
            dy: 1000.0,
            dz: 50.0,
            u_plus,
            u_minus: 0.0,
            v_plus: 0.0,
            v_minus: 0.0,
            w_plus: 0.0,
            w_minus,
            kxxyy: 0.0,
            kzz: 0.0,
            m2u: 0.0,
            m2d: 0.0,
            pbl_top_layer: 0.0,
            so2_oxidation: 0.0,
            nh_partitioning: 0.5,
            no_partitioning: 0.5,
            aorg_partitioning: 0.5,
            so2_wet_dep: 0.0,
            other_gas_wet_dep: 0.0,
            particle_wet_dep: 0.0,
            dry_dep: DryDepVelocities::default(),
            temperature: 290.0,
            wind_speed: 0.0,
            s1: 0.0,
            sclass: 0.0,
            west: Vec::new(),
            east: Vec::new(),
            south: Vec::new(),
            north: Vec::new(),
            below: Vec::new(),
            above: Vec::new(),
            ground_level: vec![0],
            background: Vec::new(),
        }]
    }

    #[test]
    fn test_cfl_uses_the_largest_directional_courant_number() {
        let records = windy_cell(10.0, 1.0);
        let (grid, _) = crate::grid::Grid::build(&records, 1, &EngineConfig::default()).unwrap();

        // w/Δz = 1/50 dominates u/Δx = 10/1000.
        let dt = cfl_timestep(&grid, 1.0).unwrap();
        assert_relative_eq!(dt, 1.0 / 3.0_f64.sqrt() / 0.02, max_relative = 1e-12);

        // cmax scales the step linearly.
        let dt15 = cfl_timestep(&grid, 1.5).unwrap();
        assert_relative_eq!(dt15, 1.5 * dt, max_relative = 1e-12);
    }

    #[test]
    fn test_still_air_falls_back_to_rule_of_thumb() {
        let records = windy_cell(0.0, 0.0);
        let (grid, _) = crate::grid::Grid::build(&records, 1, &EngineConfig::default()).unwrap();

        assert!(cfl_timestep(&grid, 1.0).is_none());
        let dt = derive_timestep(&grid, TimestepMode::Cfl { cmax: 1.0 });
        assert_relative_eq!(dt, 6.0, max_relative = 1e-12);
        assert_relative_eq!(rule_of_thumb_timestep(&grid), 6.0, max_relative = 1e-12);
    }
}
