//! Sequence-pair simulated-annealing cores.
//!
//! The annealing engine is split into a shared state machine
//! ([`base::SaCoreBase`]) generic over the placeable object kind, and two
//! concrete cores specializing the perturbation set and penalty model:
//! [`hard::SaCoreHardMacro`] for rigid macros and [`soft::SaCoreSoftMacro`]
//! for resizable cluster abstractions.
//!
//! # Pipeline
//!
//! 1. **Construct** — outline, objects, nets, constraints, weights, seed
//! 2. **Initialize** — normalization sampling + initial temperature
//! 3. **Run** — fast SA with geometric cooling and best-valid tracking
//! 4. **Read back** — geometry, per-penalty values, cost trace

pub mod base;
pub mod hard;
pub mod soft;

use crate::placeable::Placeable;
use self::base::SaCoreBase;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Annealing floor temperature; cooling decays geometrically towards it.
pub(crate) const T_MIN: f32 = 1e-10;

/// Relative slack on the outline fit check.
pub(crate) const FIT_TOLERANCE: f32 = 0.001;

/// Normalization factors at or below this threshold mark a penalty as
/// degenerate; the factor is clamped to 1.0.
pub(crate) const NORM_THRESHOLD: f32 = 1e-4;

/// Weights of the shared cost terms.
///
/// A single immutable configuration value passed at construction; each term
/// contributes `weight * raw / normalization` to the total cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    /// Weight for the bounding-area term.
    pub area: f32,
    /// Weight for the outline-overflow term.
    pub outline: f32,
    /// Weight for the wirelength term.
    pub wirelength: f32,
    /// Weight for the guidance-region term.
    pub guidance: f32,
    /// Weight for the fence-region term.
    pub fence: f32,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            area: 0.1,
            outline: 100.0,
            wirelength: 100.0,
            guidance: 10.0,
            fence: 10.0,
        }
    }
}

/// Weights of the soft-macro-only cost terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftCostWeights {
    /// Weight pulling macro-bearing clusters towards the die boundary.
    pub boundary: f32,
    /// Weight penalizing macro overlap with blockages and fixed macros.
    pub macro_blockage: f32,
    /// Weight penalizing notch-shaped dead space.
    pub notch: f32,
}

impl Default for SoftCostWeights {
    fn default() -> Self {
        Self {
            boundary: 50.0,
            macro_blockage: 10.0,
            notch: 10.0,
        }
    }
}

/// Fast-SA hyperparameters and run controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaParams {
    /// Target initial acceptance probability used to derive `T0`.
    pub init_prob: f32,
    /// Number of outer annealing steps.
    pub max_num_step: usize,
    /// Number of perturbation trials per outer step.
    pub num_perturb_per_step: usize,
    /// Random seed; the same seed reproduces the same run exactly.
    pub seed: u64,
    /// When `false`, any trial leaving the floorplan outside the outline is
    /// reverted regardless of cost.
    pub invalid_states_allowed: bool,
}

impl Default for SaParams {
    fn default() -> Self {
        Self {
            init_prob: 0.95,
            max_num_step: 1000,
            num_perturb_per_step: 60,
            seed: 0,
            invalid_states_allowed: true,
        }
    }
}

/// Probabilities of the perturbation actions.
///
/// `shape` selects the kind-specific move: orientation flips for hard
/// macros, cluster resizing for soft macros. The values are renormalized to
/// sum to 1 at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionProbs {
    /// Swap two entries of the positive sequence.
    pub pos_swap: f32,
    /// Swap two entries of the negative sequence.
    pub neg_swap: f32,
    /// Apply the same swap to both sequences.
    pub double_swap: f32,
    /// Exchange the roles of two objects in both sequences.
    pub exchange: f32,
    /// Kind-specific move (flip / resize).
    pub shape: f32,
}

impl Default for ActionProbs {
    fn default() -> Self {
        Self {
            pos_swap: 0.2,
            neg_swap: 0.2,
            double_swap: 0.2,
            exchange: 0.2,
            shape: 0.2,
        }
    }
}

impl ActionProbs {
    /// Returns the probabilities scaled to sum to 1.
    ///
    /// # Panics
    ///
    /// Panics if all probabilities are zero (caller misuse).
    pub fn normalized(self) -> Self {
        let sum = self.pos_swap + self.neg_swap + self.double_swap + self.exchange + self.shape;
        assert!(sum > 0.0, "action probabilities must not all be zero");
        Self {
            pos_swap: self.pos_swap / sum,
            neg_swap: self.neg_swap / sum,
            double_swap: self.double_swap / sum,
            exchange: self.exchange / sum,
            shape: self.shape / sum,
        }
    }

    /// Maps a uniform draw in `[0, 1)` to an action via cumulative ranges.
    pub(crate) fn pick(&self, draw: f32) -> Action {
        let t1 = self.pos_swap;
        let t2 = t1 + self.neg_swap;
        let t3 = t2 + self.double_swap;
        let t4 = t3 + self.exchange;
        if draw <= t1 {
            Action::PosSwap
        } else if draw <= t2 {
            Action::NegSwap
        } else if draw <= t3 {
            Action::DoubleSwap
        } else if draw <= t4 {
            Action::Exchange
        } else {
            Action::Shape
        }
    }
}

/// The perturbation applied last, used to pick the matching restore path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    /// No perturbation has been applied yet.
    None,
    /// Swap in the positive sequence.
    PosSwap,
    /// Swap in the negative sequence.
    NegSwap,
    /// Identical swap in both sequences.
    DoubleSwap,
    /// Role exchange of two objects.
    Exchange,
    /// Kind-specific shape move (flip / resize).
    Shape,
}

/// A sequence pair: two permutations of the movable object indices.
///
/// The pair `(pos, neg)` uniquely determines the relative ordering of every
/// object pair and therefore a packing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePair {
    /// The positive sequence.
    pub pos: Vec<usize>,
    /// The negative sequence.
    pub neg: Vec<usize>,
}

impl SequencePair {
    /// Creates the identity sequence pair over `n` objects.
    pub fn identity(n: usize) -> Self {
        Self {
            pos: (0..n).collect(),
            neg: (0..n).collect(),
        }
    }

    /// Returns whether both sequences are permutations of `0..n`.
    pub fn is_consistent(&self, n: usize) -> bool {
        let check = |seq: &[usize]| {
            if seq.len() != n {
                return false;
            }
            let mut seen = vec![false; n];
            for &v in seq {
                if v >= n || seen[v] {
                    return false;
                }
                seen[v] = true;
            }
            true
        };
        check(&self.pos) && check(&self.neg)
    }
}

/// The public surface of an annealing core, as seen by the batch runner
/// and the orchestration layer.
pub trait SaCore {
    /// Builds the initial sequence pair, runs the normalization sampling
    /// pass, and derives the initial temperature.
    fn initialize(&mut self);

    /// Runs the full annealing schedule (initializing first if needed) and
    /// leaves the core in its final, packed state.
    fn run(&mut self);

    /// Returns whether the current floorplan fits the outline.
    fn is_valid(&self) -> bool;

    /// Returns the current normalized total cost.
    fn norm_cost(&self) -> f32;

    /// Returns the current floorplan width.
    fn width(&self) -> f32;

    /// Returns the current floorplan height.
    fn height(&self) -> f32;

    /// Returns the `(temperature, cost)` trace, one row per outer step.
    fn cost_trace(&self) -> &[(f32, f32)];

    /// Writes the cost trace as plain-text `temperature value` rows.
    fn write_cost_file(&self, path: &Path) -> io::Result<()>;
}

/// The internal capability set the fast-SA driver needs from a core.
pub(crate) trait AnnealCore {
    /// The placeable object kind this core anneals.
    type Macro: Placeable + Clone;

    /// Shared state.
    fn base(&self) -> &SaCoreBase<Self::Macro>;

    /// Shared state, mutable.
    fn base_mut(&mut self) -> &mut SaCoreBase<Self::Macro>;

    /// Applies one random perturbation, re-packs, and recomputes penalties.
    fn perturb(&mut self);

    /// Reverts the last perturbation from the saved snapshot.
    fn restore(&mut self);

    /// Recomputes every penalty from the current packed geometry.
    fn cal_penalty(&mut self);

    /// Returns the normalized total cost from the current penalty values.
    fn cost(&self) -> f32;

    /// Runs the normalization sampling pass and derives `T0`.
    fn setup(&mut self);

    /// Kind-specific post-processing after the schedule completes.
    fn post_process(&mut self) {}
}

impl<C: AnnealCore> SaCore for C {
    fn initialize(&mut self) {
        if self.base().initialized {
            return;
        }
        self.setup();
        self.base_mut().initialized = true;
    }

    fn run(&mut self) {
        SaCore::initialize(self);
        fast_sa(self);
        self.post_process();
    }

    fn is_valid(&self) -> bool {
        self.base().is_valid()
    }

    fn norm_cost(&self) -> f32 {
        self.cost()
    }

    fn width(&self) -> f32 {
        self.base().width
    }

    fn height(&self) -> f32 {
        self.base().height
    }

    fn cost_trace(&self) -> &[(f32, f32)] {
        &self.base().cost_trace
    }

    fn write_cost_file(&self, path: &Path) -> io::Result<()> {
        self.base().write_cost_file(path)
    }
}

/// The fast-SA schedule: fixed-length geometric cooling with Metropolis
/// acceptance, best/best-valid tracking, and a final re-pack.
pub(crate) fn fast_sa<C: AnnealCore>(core: &mut C) {
    let params = core.base().params;
    let t0 = core.base().init_temperature;
    let decay = ((T_MIN / t0).ln() / params.max_num_step as f32).exp();

    core.base_mut().pack_floorplan();
    core.cal_penalty();
    let mut pre_cost = core.cost();
    let valid = core.base().is_valid();
    core.base_mut().note_result(pre_cost, valid);

    let mut t = t0;
    for _ in 0..params.max_num_step {
        for _ in 0..params.num_perturb_per_step {
            core.perturb();
            let cost = core.cost();
            let delta = cost - pre_cost;
            let num: f32 = core.base_mut().rng.gen();
            let prob = if delta > 0.0 { (-delta / t).exp() } else { 1.0 };
            let valid = core.base().is_valid();
            if num < prob && (params.invalid_states_allowed || valid) {
                pre_cost = cost;
                core.base_mut().note_result(cost, valid);
            } else {
                core.restore();
            }
        }
        t *= decay;
        core.base_mut().cost_trace.push((t, pre_cost));
    }

    // Restores between trials skip re-packing, so the tracked geometry can
    // be stale; one final pack recomputes it before read-back.
    core.base_mut().pack_floorplan();
    core.cal_penalty();
    if !core.base().is_valid() && core.base().has_best_valid() {
        core.base_mut().restore_best_valid();
        core.base_mut().pack_floorplan();
        core.cal_penalty();
    }
}

/// Clamps a degenerate normalization factor to 1.0.
pub(crate) fn clamp_norm(value: f32) -> f32 {
    if value <= NORM_THRESHOLD {
        1.0
    } else {
        value
    }
}
