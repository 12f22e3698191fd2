//! The simple nine-species mechanism.
//!
//! Tracks gas/particle pairs for organics, ammonia-N, sulfur and nitrate-N
//! plus inert primary PM2.5. Secondary formation is reduced to a
//! first-order SO₂ oxidation and precomputed equilibrium partitioning
//! fractions, which is what makes a steady-state run cheap enough to
//! iterate to convergence.
//!
//! Nitrogen and sulfur species are tracked as element mass (N, S); emission
//! inputs and particulate outputs convert by molar-mass ratio at the
//! interface.

use rustc_hash::FxHashMap;

use crate::error::EngineError;
use crate::grid::Cell;
use crate::mechanism::Mechanism;
use crate::solver::{
    CellManipulator, DryDepClass, DryDeposition, StepContext, WetDepClass, WetDeposition,
};

// Species indices. Private to the mechanism by design.
const IG_ORG: usize = 0;
const IP_ORG: usize = 1;
const IPM25: usize = 2;
const IG_NH: usize = 3;
const IP_NH: usize = 4;
const IG_S: usize = 5;
const IP_S: usize = 6;
const IG_NO: usize = 7;
const IP_NO: usize = 8;

const SPECIES_NAMES: [&str; 9] = [
    "gOrg", "pOrg", "PM2_5", "gNH", "pNH", "gS", "pS", "gNO", "pNO",
];

// Molar masses (g/mol).
const MW_NOX: f64 = 46.0055; // as NO2
const MW_N: f64 = 14.0067;
const MW_NO3: f64 = 62.00501;
const MW_NH3: f64 = 17.03056;
const MW_NH4: f64 = 18.03851;
const MW_S: f64 = 32.0655;
const MW_SO2: f64 = 64.0644;
const MW_SO4: f64 = 96.0632;

// Mass conversions between emitted/reported compounds and tracked elements.
const NOX_TO_N: f64 = MW_N / MW_NOX;
const N_TO_NO3: f64 = MW_NO3 / MW_N;
const NH3_TO_N: f64 = MW_N / MW_NH3;
const N_TO_NH4: f64 = MW_NH4 / MW_N;
const SOX_TO_S: f64 = MW_S / MW_SO2;
const S_TO_SO4: f64 = MW_SO4 / MW_S;

const OUTPUT_NAMES: [&str; 10] = [
    "VOC",
    "SOA",
    "PrimaryPM25",
    "NH3",
    "pNH4",
    "SOx",
    "pSO4",
    "NOx",
    "pNO3",
    "TotalPM25",
];

/// Which discretization the SO₂ oxidation step uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SulfurOxidationForm {
    /// `ΔS = Ci[gS]·(1 − exp(−k·Δt))`: conserves mass for any `k·Δt`.
    #[default]
    Exponential,
    /// `ΔS = k·Ci[gS]·Δt`: the legacy form, which overshoots once `k·Δt`
    /// approaches 1. Kept selectable for comparison runs only.
    Linear,
}

/// The simple nine-species mechanism.
pub struct SimpleMechanism {
    so2_form: SulfurOxidationForm,
    outputs: FxHashMap<&'static str, fn(&[f64]) -> f64>,
}

impl SimpleMechanism {
    /// Mechanism with the default (exponential) sulfur oxidation.
    #[must_use]
    pub fn new() -> Self {
        Self::with_so2_form(SulfurOxidationForm::default())
    }

    /// Mechanism with an explicit sulfur oxidation form.
    #[must_use]
    pub fn with_so2_form(so2_form: SulfurOxidationForm) -> Self {
        let mut outputs: FxHashMap<&'static str, fn(&[f64]) -> f64> = FxHashMap::default();
        outputs.insert("VOC", |c| c[IG_ORG]);
        outputs.insert("SOA", |c| c[IP_ORG]);
        outputs.insert("PrimaryPM25", |c| c[IPM25]);
        outputs.insert("NH3", |c| c[IG_NH] / NH3_TO_N);
        outputs.insert("pNH4", |c| c[IP_NH] * N_TO_NH4);
        outputs.insert("SOx", |c| c[IG_S] / SOX_TO_S);
        outputs.insert("pSO4", |c| c[IP_S] * S_TO_SO4);
        outputs.insert("NOx", |c| c[IG_NO] / NOX_TO_N);
        outputs.insert("pNO3", |c| c[IP_NO] * N_TO_NO3);
        outputs.insert("TotalPM25", |c| {
            c[IPM25] + c[IP_ORG] + c[IP_NH] * N_TO_NH4 + c[IP_S] * S_TO_SO4 + c[IP_NO] * N_TO_NO3
        });
        Self { so2_form, outputs }
    }
}

impl Default for SimpleMechanism {
    fn default() -> Self {
        Self::new()
    }
}

impl Mechanism for SimpleMechanism {
    fn species_count(&self) -> usize {
        SPECIES_NAMES.len()
    }

    fn species_names(&self) -> &'static [&'static str] {
        &SPECIES_NAMES
    }

    fn add_emis_flux(
        &self,
        cell: &Cell,
        emis: &mut [f64],
        pollutant: &str,
        rate: f64,
    ) -> Result<(), EngineError> {
        let flux = rate / cell.volume; // μg/s → μg/m³/s
        match pollutant {
            "VOC" => emis[IG_ORG] += flux,
            "NOx" => emis[IG_NO] += flux * NOX_TO_N,
            "NH3" => emis[IG_NH] += flux * NH3_TO_N,
            "SOx" => emis[IG_S] += flux * SOX_TO_S,
            "PM2_5" => emis[IPM25] += flux,
            _ => return Err(EngineError::UnknownSpecies(pollutant.to_string())),
        }
        Ok(())
    }

    fn chemistry(&self) -> Box<dyn CellManipulator> {
        Box::new(SimpleChemistry {
            form: self.so2_form,
        })
    }

    fn dry_dep(&self, scheme: &str) -> Result<Box<dyn CellManipulator>, EngineError> {
        if scheme != "simple" {
            return Err(EngineError::UnknownScheme(scheme.to_string()));
        }
        Ok(Box::new(DryDeposition::new(vec![
            DryDepClass::Voc,      // gOrg
            DryDepClass::Particle, // pOrg
            DryDepClass::Particle, // PM2_5
            DryDepClass::Nh3,      // gNH
            DryDepClass::Particle, // pNH
            DryDepClass::So2,      // gS
            DryDepClass::Particle, // pS
            DryDepClass::Nox,      // gNO
            DryDepClass::Particle, // pNO
        ])))
    }

    fn wet_dep(&self, scheme: &str) -> Result<Box<dyn CellManipulator>, EngineError> {
        if scheme != "simple" {
            return Err(EngineError::UnknownScheme(scheme.to_string()));
        }
        Ok(Box::new(WetDeposition::new(vec![
            WetDepClass::OtherGas, // gOrg
            WetDepClass::Particle, // pOrg
            WetDepClass::Particle, // PM2_5
            WetDepClass::OtherGas, // gNH
            WetDepClass::Particle, // pNH
            WetDepClass::So2,      // gS
            WetDepClass::Particle, // pS
            WetDepClass::OtherGas, // gNO
            WetDepClass::Particle, // pNO
        ])))
    }

    fn output_names(&self) -> &'static [&'static str] {
        &OUTPUT_NAMES
    }

    fn value(&self, conc: &[f64], var: &str) -> Result<f64, EngineError> {
        self.outputs
            .get(var)
            .map(|f| f(conc))
            .ok_or_else(|| EngineError::UnknownSpecies(var.to_string()))
    }

    fn units(&self, var: &str) -> Result<&'static str, EngineError> {
        if self.outputs.contains_key(var) {
            Ok("μg/m³")
        } else {
            Err(EngineError::UnknownSpecies(var.to_string()))
        }
    }
}

/// Split a gas/particle pair so the particulate share of the pair's
/// beginning-of-step total matches the equilibrium fraction.
fn partition(ci: &[f64], cf: &mut [f64], ig: usize, ip: usize, frac: f64) {
    let total = ci[ig] + ci[ip];
    cf[ip] = total * frac;
    cf[ig] = total * (1.0 - frac);
}

/// The simple mechanism's chemistry operator.
struct SimpleChemistry {
    form: SulfurOxidationForm,
}

impl CellManipulator for SimpleChemistry {
    fn name(&self) -> &'static str {
        "chemistry"
    }

    fn apply(&self, cell: &Cell, ctx: &StepContext<'_>, cf: &mut [f64], dt: f64) {
        let ci = ctx.conc_at(cell.row);

        // Sulfur oxidation: gas-phase S converts irreversibly to sulfate.
        let delta_s = match self.form {
            SulfurOxidationForm::Exponential => {
                ci[IG_S] * (1.0 - (-cell.so2_oxidation * dt).exp())
            }
            SulfurOxidationForm::Linear => cell.so2_oxidation * ci[IG_S] * dt,
        };
        cf[IP_S] += delta_s;
        cf[IG_S] -= delta_s;

        // Re-equilibrate each gas/particle pair from its beginning-of-step
        // total. Element mass is untouched; only the split moves.
        partition(ci, cf, IG_NH, IP_NH, cell.nh_partitioning);
        partition(ci, cf, IG_NO, IP_NO, cell.no_partitioning);
        partition(ci, cf, IG_ORG, IP_ORG, cell.aorg_partitioning);
    }
}
