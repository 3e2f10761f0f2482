//! Parallel multi-start batch execution.
//!
//! A batch runs N independent annealing instances of the same problem
//! (different seeds and/or outline variants), each owning a private deep
//! copy of all mutable state. Instances run on separate worker threads with
//! no shared mutable state; after the join, the lowest-cost valid result
//! wins (the first one on exact ties).

use crate::core::SaCore;
use rayon::prelude::*;
use tessera_common::{InternalError, TesseraResult};
use tessera_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};

/// The winning core of a batch and which run produced it.
pub struct BatchResult<C> {
    /// The completed annealing core, queryable for geometry and cost.
    pub core: C,
    /// Index of the winning run within the batch.
    pub run_index: usize,
}

/// Runs `num_runs` annealing instances in parallel and selects the best
/// valid result.
///
/// `make_core` is called once per run index to construct that instance
/// (callers derive per-run seeds and outline variants from the index).
/// Invalid candidates are reported to the sink as warnings; if no run
/// produces a valid floorplan, an error diagnostic is emitted and an
/// [`InternalError`] returned.
///
/// # Panics
///
/// Panics if `num_runs` is zero (caller misuse).
pub fn run_batch<C, F>(
    num_runs: usize,
    sink: &DiagnosticSink,
    make_core: F,
) -> TesseraResult<BatchResult<C>>
where
    C: SaCore + Send,
    F: Fn(usize) -> C + Sync,
{
    assert!(num_runs > 0, "batch needs at least one run");

    let cores: Vec<C> = (0..num_runs)
        .into_par_iter()
        .map(|i| {
            let mut core = make_core(i);
            core.run();
            core
        })
        .collect();

    let mut best: Option<BatchResult<C>> = None;
    for (run_index, core) in cores.into_iter().enumerate() {
        if !core.is_valid() {
            sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Batch, 1),
                    format!("annealing run {run_index} produced an invalid floorplan"),
                )
                .with_note(format!(
                    "packed {:.3} x {:.3}, cost {:.6}",
                    core.width(),
                    core.height(),
                    core.norm_cost()
                )),
            );
            continue;
        }
        let better = match &best {
            None => true,
            Some(b) => core.norm_cost() < b.core.norm_cost(),
        };
        if better {
            best = Some(BatchResult { core, run_index });
        }
    }

    best.ok_or_else(|| {
        sink.emit(Diagnostic::error(
            DiagnosticCode::new(Category::Batch, 2),
            format!("no annealing run out of {num_runs} produced a valid floorplan"),
        ));
        InternalError::new("no annealing run produced a valid floorplan")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hard::SaCoreHardMacro;
    use crate::core::{ActionProbs, CostWeights, SaParams};
    use crate::hard_macro::HardMacro;
    use tessera_common::Rect;

    fn make_core(outline: Rect, seed: u64) -> SaCoreHardMacro {
        let macros = vec![
            HardMacro::new("a", 10.0, 10.0),
            HardMacro::new("b", 10.0, 10.0),
            HardMacro::new("c", 5.0, 5.0),
        ];
        SaCoreHardMacro::new(
            outline,
            macros,
            Vec::new(),
            CostWeights::default(),
            ActionProbs::default(),
            SaParams {
                max_num_step: 50,
                num_perturb_per_step: 20,
                seed,
                ..SaParams::default()
            },
        )
    }

    #[test]
    fn batch_picks_valid_result() {
        let sink = DiagnosticSink::new();
        let outline = Rect::from_size(30.0, 30.0);
        let result = run_batch(4, &sink, |i| make_core(outline, 100 + i as u64)).unwrap();
        assert!(result.core.is_valid());
        assert!(result.run_index < 4);
        assert!(!sink.has_errors());
    }

    #[test]
    fn batch_is_deterministic() {
        let outline = Rect::from_size(30.0, 30.0);
        let run = || {
            let sink = DiagnosticSink::new();
            let result = run_batch(4, &sink, |i| make_core(outline, 7 + i as u64)).unwrap();
            (result.run_index, result.core.norm_cost())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn batch_with_impossible_outline_errors() {
        let sink = DiagnosticSink::new();
        // Total macro area 225 in a 10x10 outline: nothing fits.
        let outline = Rect::from_size(10.0, 10.0);
        let result = run_batch(3, &sink, |i| make_core(outline, i as u64));
        assert!(result.is_err());
        assert!(sink.has_errors());
        // One warning per invalid run plus the final error.
        assert_eq!(sink.diagnostics().len(), 4);
    }

    #[test]
    #[should_panic(expected = "at least one run")]
    fn zero_runs_panics() {
        let sink = DiagnosticSink::new();
        let _ = run_batch(0, &sink, |i| make_core(Rect::from_size(30.0, 30.0), i as u64));
    }
}
