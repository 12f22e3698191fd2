//! The simulation driver.
//!
//! An [`Engine`] owns the immutable grid, the active mechanism, the
//! per-step operator pipeline and the mutable concentration state. Each
//! step runs the canonical phase sequence as parallel loops over all cells,
//! under an exclusive acquisition of the engine-wide readers-writer
//! barrier; external diagnostics acquire the same barrier shared to read a
//! consistent snapshot. All state is instance-scoped: two engines in one
//! process never interact.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{ConvergenceMode, EngineConfig};
use crate::error::EngineError;
use crate::grid::{load_grid, save_grid, Cell, CellRecord, Grid, SavedGrid, SpeciesField};
use crate::mechanism::Mechanism;
use crate::solver::{CellManipulator, MeanderMixing, Mixing, StepContext, UpwindAdvection};
use crate::timestep::derive_timestep;

/// A clonable cancellation handle. Cancel from any thread; the driver polls
/// it between phases and between convergence checks and returns the
/// partially-converged state.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, un-cancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every tracked output sum changed less than the tolerance between
    /// consecutive checks.
    Converged,
    /// The configured number of fixed iterations completed.
    FixedIterationsDone,
    /// The check budget ran out before convergence; the state is whatever
    /// the last step produced.
    TimedOut,
    /// Cancellation was requested; the state is whatever the last step
    /// produced.
    Cancelled,
}

/// One convergence check's measurements.
#[derive(Debug, Clone)]
pub struct ConvergenceCheck {
    /// Grid-wide sum of each tracked output variable.
    pub sums: Vec<f64>,
    /// Largest relative change against the previous check; infinite on the
    /// first check.
    pub max_rel_change: f64,
}

/// What a run did, returned by [`Engine::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Steps taken.
    pub steps: usize,
    /// Simulated seconds advanced.
    pub simulated_seconds: f64,
    /// Every convergence check, in order.
    pub checks: Vec<ConvergenceCheck>,
}

/// The mutable concentration state, guarded as one unit so readers always
/// see a whole step.
struct ConcState {
    ci: SpeciesField,
    cf: SpeciesField,
    emis: SpeciesField,
}

/// The steady-state chemical transport engine.
pub struct Engine {
    grid: Grid,
    mechanism: Box<dyn Mechanism>,
    config: EngineConfig,
    pipeline: Vec<Box<dyn CellManipulator>>,
    state: RwLock<ConcState>,
    zero: Vec<f64>,
    dt: f64,
}

impl Engine {
    /// Build an engine from preprocessor cell records.
    ///
    /// # Errors
    ///
    /// Any grid construction or validation error, or
    /// [`EngineError::UnknownScheme`] if the configured deposition schemes
    /// are not provided by the mechanism.
    pub fn new(
        records: &[CellRecord],
        mechanism: Box<dyn Mechanism>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let (grid, initial) = Grid::build(records, mechanism.species_count(), &config)?;
        let emis = SpeciesField::new(grid.len(), mechanism.species_count());
        Self::from_parts(grid, initial.clone(), initial, emis, mechanism, config)
    }

    /// Restore an engine from a stream produced by [`Engine::save`].
    ///
    /// # Errors
    ///
    /// [`EngineError::Persistence`] for a corrupt stream or a species-count
    /// mismatch with the mechanism, or any validation error if the decoded
    /// grid violates an invariant.
    pub fn load<R: Read>(
        reader: R,
        mechanism: Box<dyn Mechanism>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let saved = load_grid(reader)?;
        if saved.grid.nspecies() != mechanism.species_count() {
            return Err(EngineError::Persistence(format!(
                "saved grid has {} species, mechanism defines {}",
                saved.grid.nspecies(),
                mechanism.species_count()
            )));
        }
        Self::from_parts(saved.grid, saved.ci, saved.cf, saved.emis, mechanism, config)
    }

    fn from_parts(
        grid: Grid,
        ci: SpeciesField,
        cf: SpeciesField,
        emis: SpeciesField,
        mechanism: Box<dyn Mechanism>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let dt = derive_timestep(&grid, config.timestep);

        let mut pipeline: Vec<Box<dyn CellManipulator>> = vec![
            Box::new(UpwindAdvection {
                factor: config.advection_factor,
            }),
            Box::new(Mixing),
        ];
        if let Some(factor) = config.meander {
            pipeline.push(Box::new(MeanderMixing { factor }));
        }
        pipeline.push(mechanism.dry_dep(&config.dry_dep_scheme)?);
        pipeline.push(mechanism.wet_dep(&config.wet_dep_scheme)?);
        pipeline.push(mechanism.chemistry());

        let zero = vec![0.0; mechanism.species_count()];
        Ok(Self {
            grid,
            mechanism,
            config,
            pipeline,
            state: RwLock::new(ConcState { ci, cf, emis }),
            zero,
            dt,
        })
    }

    /// The immutable grid.
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// The active mechanism.
    #[must_use]
    pub fn mechanism(&self) -> &dyn Mechanism {
        self.mechanism.as_ref()
    }

    /// The fixed per-step Δt (s).
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    fn state_read(&self) -> RwLockReadGuard<'_, ConcState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_write(&self) -> RwLockWriteGuard<'_, ConcState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a point emission of a named inventory pollutant into one
    /// cell, at `rate` μg/s. Emissions accumulate; call repeatedly to stack
    /// sources.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadTopology`] for an out-of-range row,
    /// [`EngineError::UnknownSpecies`] for a pollutant the mechanism does
    /// not map.
    pub fn add_emissions(
        &mut self,
        row: usize,
        pollutant: &str,
        rate: f64,
    ) -> Result<(), EngineError> {
        if row >= self.grid.len() {
            return Err(EngineError::BadTopology(format!(
                "emission row {row} out of range ({} cells)",
                self.grid.len()
            )));
        }
        let cell = self.grid.cell(row);
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        self.mechanism
            .add_emis_flux(cell, state.emis.cell_mut(row), pollutant, rate)
    }

    /// Advance one step: emissions injection with the `Ci ← Cf` swap, then
    /// every operator phase in canonical order, all under the exclusive
    /// barrier. The cancel flag is polled between phases; on cancellation
    /// the remaining phases are skipped, the partially-applied `Cf` is left
    /// in place, and `false` is returned.
    fn step(&self, state: &mut ConcState, cancel: &CancelFlag) -> bool {
        let dt = self.dt;
        let ConcState { ci, cf, emis } = state;

        // Phase (a): inject emissions into Cf and copy it into Ci. The copy
        // is the inter-step swap: after it, Ci is the beginning-of-step
        // state every later phase reads.
        cf.par_cells_mut()
            .zip(ci.par_cells_mut())
            .zip(emis.par_cells())
            .for_each(|((cfc, cic), ec)| {
                for ((cfv, civ), &ev) in cfc.iter_mut().zip(cic.iter_mut()).zip(ec) {
                    *cfv += ev * dt;
                    *civ = *cfv;
                }
            });

        // Phases (b)–(g): each operator reads Ci everywhere and writes its
        // own cell's Cf, so cells parallelize freely within a phase.
        for op in &self.pipeline {
            if cancel.is_cancelled() {
                return false;
            }
            let ctx = StepContext::new(&self.grid, ci, &self.zero);
            cf.par_cells_mut().enumerate().for_each(|(row, cfc)| {
                op.apply(self.grid.cell(row), &ctx, cfc, dt);
            });
        }
        true
    }

    /// Iterate to steady state.
    ///
    /// Steps in groups of one check period, then compares the grid-wide
    /// sums of the tracked output variables against the previous check.
    /// Returns the run summary; `TimedOut` and `Cancelled` outcomes leave
    /// the partially-converged state in place rather than failing.
    ///
    /// # Errors
    ///
    /// [`EngineError::NonFiniteState`] if a NaN or infinity appears in the
    /// concentrations, or [`EngineError::UnknownSpecies`] if a tracked
    /// output name is unknown to the mechanism.
    pub fn run(&self, cancel: &CancelFlag) -> Result<RunSummary, EngineError> {
        let steps_per_check = ((self.config.check_period / self.dt).ceil() as usize).max(1);
        let mut summary = RunSummary {
            outcome: RunOutcome::TimedOut,
            steps: 0,
            simulated_seconds: 0.0,
            checks: Vec::new(),
        };
        let mut prev_sums: Option<Vec<f64>> = None;

        info!(
            dt = self.dt,
            steps_per_check,
            cells = self.grid.len(),
            "starting steady-state iteration"
        );

        'run: for check in 0..self.config.max_checks {
            for _ in 0..steps_per_check {
                if cancel.is_cancelled() {
                    warn!("cancelled; returning partially-converged state");
                    summary.outcome = RunOutcome::Cancelled;
                    break 'run;
                }
                let mut state = self.state_write();
                let completed = self.step(&mut state, cancel);
                drop(state);
                if !completed {
                    warn!("cancelled mid-step; returning partially-converged state");
                    summary.outcome = RunOutcome::Cancelled;
                    break 'run;
                }
                summary.steps += 1;
                summary.simulated_seconds += self.dt;
            }

            let state = self.state_read();
            if state.cf.has_non_finite() {
                return Err(EngineError::NonFiniteState {
                    simulated_seconds: summary.simulated_seconds,
                });
            }
            let sums = self.tracked_sums(&state.cf)?;
            drop(state);

            let max_rel_change = prev_sums.as_ref().map_or(f64::INFINITY, |prev| {
                sums.iter()
                    .zip(prev)
                    .map(|(&new, &old)| relative_change(new, old))
                    .fold(0.0_f64, f64::max)
            });
            debug!(check, ?sums, max_rel_change, "convergence check");
            summary.checks.push(ConvergenceCheck {
                sums: sums.clone(),
                max_rel_change,
            });
            prev_sums = Some(sums);

            match self.config.convergence {
                ConvergenceMode::Criterion { tolerance } => {
                    if max_rel_change < tolerance {
                        summary.outcome = RunOutcome::Converged;
                        break 'run;
                    }
                }
                ConvergenceMode::FixedIterations { checks } => {
                    if check + 1 >= checks {
                        summary.outcome = RunOutcome::FixedIterationsDone;
                        break 'run;
                    }
                }
            }
        }

        match summary.outcome {
            RunOutcome::TimedOut => warn!(
                checks = summary.checks.len(),
                "check budget exhausted before convergence"
            ),
            outcome => info!(
                ?outcome,
                steps = summary.steps,
                simulated_seconds = summary.simulated_seconds,
                "run finished"
            ),
        }
        Ok(summary)
    }

    /// Grid-wide sum of each tracked output variable.
    fn tracked_sums(&self, cf: &SpeciesField) -> Result<Vec<f64>, EngineError> {
        self.config
            .tracked_outputs
            .iter()
            .map(|var| {
                self.grid
                    .cells()
                    .iter()
                    .map(|cell| self.cell_value(cell, cf.cell(cell.row), var))
                    .sum()
            })
            .collect()
    }

    /// One output value for one cell: meteorological passthroughs first,
    /// then whatever the mechanism defines.
    fn cell_value(&self, cell: &Cell, conc: &[f64], var: &str) -> Result<f64, EngineError> {
        match var {
            "Temperature" => Ok(cell.temperature),
            "WindSpeed" => Ok(cell.wind_speed),
            "S1" => Ok(cell.s1),
            "SClass" => Ok(cell.sclass),
            _ => self.mechanism.value(conc, var),
        }
    }

    /// Current value of one output variable in one cell. Acquires the
    /// barrier shared, so it is safe to call from diagnostic threads while
    /// a run is in progress.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSpecies`] for an unknown variable name.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn value(&self, row: usize, var: &str) -> Result<f64, EngineError> {
        let state = self.state_read();
        self.cell_value(self.grid.cell(row), state.cf.cell(row), var)
    }

    /// Units of one output variable.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSpecies`] for an unknown variable name.
    pub fn units(&self, var: &str) -> Result<&'static str, EngineError> {
        match var {
            "Temperature" => Ok("K"),
            "WindSpeed" => Ok("m/s"),
            "S1" | "SClass" => Ok("-"),
            _ => self.mechanism.units(var),
        }
    }

    /// Evaluate an output expression for every cell, returning a flat array
    /// indexed by `row`. An expression is one or more output variable names
    /// joined by `+`, e.g. `"pSO4+pNH4+pNO3+PrimaryPM25+SOA"`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSpecies`] if any term is unknown.
    pub fn output(&self, expr: &str) -> Result<Vec<f64>, EngineError> {
        let terms: Vec<&str> = expr.split('+').map(str::trim).collect();
        let state = self.state_read();
        self.grid
            .cells()
            .iter()
            .map(|cell| {
                let conc = state.cf.cell(cell.row);
                terms
                    .iter()
                    .map(|term| self.cell_value(cell, conc, term))
                    .sum()
            })
            .collect()
    }

    /// Current species vector of one cell, in mechanism index order.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn concentrations(&self, row: usize) -> Vec<f64> {
        self.state_read().cf.cell(row).to_vec()
    }

    /// Serialize the grid, rates and current concentration state to a byte
    /// stream. The counterpart of [`Engine::load`].
    ///
    /// # Errors
    ///
    /// [`EngineError::Persistence`] if serialization or the writer fails.
    pub fn save<W: Write>(&self, writer: W) -> Result<(), EngineError> {
        let state = self.state_read();
        let saved = SavedGrid {
            grid: self.grid.clone(),
            ci: state.ci.clone(),
            cf: state.cf.clone(),
            emis: state.emis.clone(),
        };
        drop(state);
        save_grid(&saved, writer)
    }
}

/// Relative change between consecutive check sums. Zero against zero
/// counts as converged; anything against zero does not.
fn relative_change(new: f64, old: f64) -> f64 {
    if old == 0.0 {
        if new == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        ((new - old) / old).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimestepMode;
    use crate::grid::DryDepVelocities;
    use crate::mechanism::SimpleMechanism;
    use approx::assert_relative_eq;

    /// A 2×1×2 grid (two columns, two layers) with a gentle eastward wind.
    fn quad_records() -> Vec<CellRecord> {
        let base = |row: usize, layer: usize| CellRecord {
            row,
            layer,
            dx: 1000.0,
            dy: 1000.0,
            dz: 50.0,
            u_plus: 10.0,
            u_minus: 0.0,
            v_plus: 0.0,
            v_minus: 0.0,
            w_plus: 0.0,
            w_minus: 0.0,
            kxxyy: 5.0,
            kzz: 0.5,
            m2u: 0.0,
            m2d: 0.0,
            pbl_top_layer: 0.0,
            so2_oxidation: 1.0e-5,
            nh_partitioning: 0.5,
            no_partitioning: 0.5,
            aorg_partitioning: 0.5,
            so2_wet_dep: 1.0e-6,
            other_gas_wet_dep: 1.0e-6,
            particle_wet_dep: 1.0e-6,
            dry_dep: DryDepVelocities {
                nox: 0.002,
                so2: 0.005,
                voc: 0.001,
                nh3: 0.005,
                particle: 0.001,
            },
            temperature: 295.0,
            wind_speed: 10.0,
            s1: 0.1,
            sclass: 1.0,
            west: Vec::new(),
            east: Vec::new(),
            south: Vec::new(),
            north: Vec::new(),
            below: Vec::new(),
            above: Vec::new(),
            ground_level: Vec::new(),
            background: Vec::new(),
        };
        // Rows: 0 = (x0, ground), 1 = (x1, ground), 2 = (x0, upper),
        // 3 = (x1, upper).
        let mut g0 = base(0, 0);
        let mut g1 = base(1, 0);
        let mut u0 = base(2, 1);
        let mut u1 = base(3, 1);
        g0.east = vec![1];
        g1.west = vec![0];
        u0.east = vec![3];
        u1.west = vec![2];
        g0.above = vec![2];
        g1.above = vec![3];
        u0.below = vec![0];
        u1.below = vec![1];
        g0.ground_level = vec![0];
        g1.ground_level = vec![1];
        u0.ground_level = vec![0];
        u1.ground_level = vec![1];
        vec![g0, g1, u0, u1]
    }

    fn fixed_config(checks: usize) -> EngineConfig {
        EngineConfig {
            convergence: ConvergenceMode::FixedIterations { checks },
            check_period: 600.0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_cfl_step_is_fixed_at_init() {
        let engine = Engine::new(
            &quad_records(),
            Box::new(SimpleMechanism::new()),
            EngineConfig::default(),
        )
        .unwrap();
        // u/Δx = 0.01 dominates; Δt = 1/√3/0.01.
        assert_relative_eq!(engine.dt(), 100.0 / 3.0_f64.sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn test_emissions_reach_steady_state_fields() {
        let mut engine = Engine::new(
            &quad_records(),
            Box::new(SimpleMechanism::new()),
            fixed_config(2),
        )
        .unwrap();
        engine.add_emissions(0, "PM2_5", 1.0e6).unwrap();
        engine.add_emissions(0, "SOx", 1.0e6).unwrap();

        let summary = engine.run(&CancelFlag::new()).unwrap();
        assert_eq!(summary.outcome, RunOutcome::FixedIterationsDone);
        assert_eq!(summary.checks.len(), 2);
        assert!(summary.steps > 0);

        let pm = engine.output("PrimaryPM25").unwrap();
        assert_eq!(pm.len(), 4);
        assert!(pm[0] > 0.0, "source cell must accumulate PM2.5");
        assert!(pm[1] > 0.0, "downwind cell must receive PM2.5");
        assert!(pm.iter().all(|v| v.is_finite() && *v >= 0.0));

        // Sulfate forms from the emitted SOx.
        let so4 = engine.output("pSO4").unwrap();
        assert!(so4[0] > 0.0);
    }

    #[test]
    fn test_unknown_emission_row_and_pollutant_are_rejected() {
        let mut engine = Engine::new(
            &quad_records(),
            Box::new(SimpleMechanism::new()),
            fixed_config(1),
        )
        .unwrap();
        assert!(matches!(
            engine.add_emissions(99, "PM2_5", 1.0).unwrap_err(),
            EngineError::BadTopology(_)
        ));
        assert!(matches!(
            engine.add_emissions(0, "CO2", 1.0).unwrap_err(),
            EngineError::UnknownSpecies(_)
        ));
    }

    #[test]
    fn test_cancel_returns_partial_state() {
        let engine = Engine::new(
            &quad_records(),
            Box::new(SimpleMechanism::new()),
            fixed_config(100),
        )
        .unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let summary = engine.run(&cancel).unwrap();
        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(summary.steps, 0);
    }

    #[test]
    fn test_unknown_tracked_output_fails_the_run() {
        let mut config = fixed_config(1);
        config.tracked_outputs = vec!["Ozone".to_string()];
        let engine = Engine::new(
            &quad_records(),
            Box::new(SimpleMechanism::new()),
            config,
        )
        .unwrap();
        assert!(matches!(
            engine.run(&CancelFlag::new()).unwrap_err(),
            EngineError::UnknownSpecies(_)
        ));
    }

    #[test]
    fn test_met_variables_pass_through() {
        let engine = Engine::new(
            &quad_records(),
            Box::new(SimpleMechanism::new()),
            EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(engine.value(0, "Temperature").unwrap(), 295.0);
        assert_eq!(engine.units("Temperature").unwrap(), "K");
        assert_eq!(engine.value(0, "WindSpeed").unwrap(), 10.0);
        assert_eq!(engine.units("TotalPM25").unwrap(), "μg/m³");
    }

    #[test]
    fn test_output_expressions_sum_terms() {
        let mut engine = Engine::new(
            &quad_records(),
            Box::new(SimpleMechanism::new()),
            fixed_config(1),
        )
        .unwrap();
        engine.add_emissions(0, "PM2_5", 1.0e6).unwrap();
        engine.run(&CancelFlag::new()).unwrap();

        let combined = engine.output("PrimaryPM25+SOA").unwrap();
        let pm = engine.output("PrimaryPM25").unwrap();
        let soa = engine.output("SOA").unwrap();
        for row in 0..4 {
            assert_relative_eq!(combined[row], pm[row] + soa[row], max_relative = 1e-12);
        }
        assert!(engine.output("PrimaryPM25+Nope").is_err());
    }

    #[test]
    fn test_save_load_round_trip_preserves_state() {
        let mut engine = Engine::new(
            &quad_records(),
            Box::new(SimpleMechanism::new()),
            fixed_config(1),
        )
        .unwrap();
        engine.add_emissions(0, "PM2_5", 1.0e6).unwrap();
        engine.run(&CancelFlag::new()).unwrap();

        let mut buf = Vec::new();
        engine.save(&mut buf).unwrap();
        let restored = Engine::load(
            buf.as_slice(),
            Box::new(SimpleMechanism::new()),
            fixed_config(1),
        )
        .unwrap();

        let before = engine.output("TotalPM25").unwrap();
        let after = restored.output("TotalPM25").unwrap();
        for row in 0..4 {
            assert_relative_eq!(after[row], before[row], max_relative = 1e-12);
        }
    }

    #[test]
    fn test_rule_of_thumb_timestep_mode() {
        let config = EngineConfig {
            timestep: TimestepMode::RuleOfThumb,
            ..EngineConfig::default()
        };
        let engine = Engine::new(
            &quad_records(),
            Box::new(SimpleMechanism::new()),
            config,
        )
        .unwrap();
        assert_relative_eq!(engine.dt(), 6.0, max_relative = 1e-12);
    }
}
