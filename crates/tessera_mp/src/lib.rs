//! Macro placement engine for the Tessera toolchain.
//!
//! This crate places rectangular objects — rigid hard macros and soft
//! cluster abstractions — inside a bounded outline so that they do not
//! overlap, respect fence/guide constraints, and minimize a weighted
//! combination of area, wirelength, outline overflow, and layout-quality
//! penalties. It is the per-level optimizer of a hierarchical flow: the
//! clustering engine hands over one level's siblings, and the engine packs
//! them with sequence-pair simulated annealing.
//!
//! # Pipeline
//!
//! 1. **Adapt** — flatten a cluster snapshot into objects, nets, constraints
//! 2. **Anneal** — N parallel fast-SA instances over sequence pairs
//! 3. **Select** — lowest-cost valid floorplan across the batch
//! 4. **Read back** — final shapes and positions via accessors
//!
//! # Usage
//!
//! ```ignore
//! use tessera_mp::place_clusters;
//!
//! let result = place_clusters(&request, &sink)?;
//! assert!(result.core.is_valid());
//! let shapes = result.core.macros();
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod batch;
pub mod core;
pub mod hard_macro;
pub mod ids;
pub mod net;
pub mod orientation;
pub mod placeable;
pub mod shape;
pub mod soft_macro;
pub mod tilings;

pub use adapter::{
    build_soft_problem, ClusterKind, ClusterSnapshot, Connection, SoftProblem, TerminalSnapshot,
};
pub use batch::{run_batch, BatchResult};
pub use crate::core::hard::SaCoreHardMacro;
pub use crate::core::soft::SaCoreSoftMacro;
pub use crate::core::{ActionProbs, CostWeights, SaCore, SaParams, SequencePair, SoftCostWeights};
pub use hard_macro::HardMacro;
pub use ids::MacroId;
pub use net::{merge_nets, BundledNet};
pub use orientation::Orientation;
pub use placeable::Placeable;
pub use shape::ShapeCurve;
pub use soft_macro::{SoftMacro, SoftMacroKind};
pub use tilings::enumerate_macro_tilings;

use tessera_common::{Rect, TesseraResult};
use tessera_diagnostics::DiagnosticSink;

/// Everything needed to place one hierarchy level's siblings.
#[derive(Debug, Clone)]
pub struct PlacementRequest {
    /// Top-level design boundary (the boundary penalty's frame).
    pub root: Rect,
    /// This level's outline within the parent frame.
    pub outline: Rect,
    /// Child clusters to place.
    pub clusters: Vec<ClusterSnapshot>,
    /// Fixed terminals visible at this level.
    pub terminals: Vec<TerminalSnapshot>,
    /// Pairwise connection weights by name.
    pub connections: Vec<Connection>,
    /// Blockages in the parent frame.
    pub blockages: Vec<Rect>,
    /// Shared cost weights.
    pub weights: CostWeights,
    /// Soft-only cost weights.
    pub soft_weights: SoftCostWeights,
    /// Perturbation action probabilities.
    pub probs: ActionProbs,
    /// Annealing hyperparameters; per-run seeds derive from `params.seed`.
    pub params: SaParams,
    /// Number of parallel annealing instances.
    pub num_runs: usize,
}

/// Places one hierarchy level's clusters: adapts the snapshot, runs a batch
/// of parallel annealing instances, and returns the best valid one.
///
/// Run `i` of the batch anneals with seed `params.seed + i`. Diagnostics
/// about invalid candidates are emitted into the sink.
pub fn place_clusters(
    request: &PlacementRequest,
    sink: &DiagnosticSink,
) -> TesseraResult<BatchResult<SaCoreSoftMacro>> {
    let problem = build_soft_problem(
        &request.outline,
        &request.clusters,
        &request.terminals,
        &request.connections,
        &request.blockages,
    );

    run_batch(request.num_runs, sink, |run_index| {
        let mut sa = SaCoreSoftMacro::new(
            request.root,
            request.outline,
            problem.macros.clone(),
            problem.terminals.clone(),
            request.weights,
            request.soft_weights,
            None,
            request.probs,
            SaParams {
                seed: request.params.seed + run_index as u64,
                ..request.params
            },
        );
        sa.set_nets(problem.nets.clone());
        sa.set_fences(problem.fences.clone());
        sa.set_guides(problem.guides.clone());
        sa.add_blockages(problem.blockages.clone());
        sa
    })
}
