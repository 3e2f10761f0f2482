//! Discrete tiling enumeration for macro-array clusters.
//!
//! The feasible shapes of a cluster made only of hard macros are the
//! bounding boxes of its tight packings. They are found by annealing the
//! cluster's macros with area-driven weights inside a ladder of varied
//! outlines around the nominal one, then collecting the distinct resulting
//! bounding boxes that fit. The result feeds the discrete
//! [`ShapeCurve`](crate::ShapeCurve) of the owning soft macro.

use crate::core::hard::SaCoreHardMacro;
use crate::core::{ActionProbs, CostWeights, SaCore, SaParams};
use crate::hard_macro::HardMacro;
use crate::placeable::Placeable;
use rayon::prelude::*;
use tessera_common::Rect;

/// Enumerates feasible `(width, height)` tilings for a macro-array cluster.
///
/// `outline` is the nominal shape of the owning cluster; `num_runs`
/// annealing instances are launched over outline variants whose widths are
/// scaled by `1 ± i/num_runs`. Tilings exceeding the nominal outline are
/// dropped; the result is deduplicated and sorted by area, then width.
pub fn enumerate_macro_tilings(
    outline: &Rect,
    macros: &[HardMacro],
    num_runs: usize,
    params: SaParams,
) -> Vec<(f32, f32)> {
    if macros.is_empty() || num_runs == 0 {
        return Vec::new();
    }
    if macros.len() == 1 {
        return vec![(macros[0].width(), macros[0].height())];
    }

    // Vary the outline to steer the packer towards different aspect ratios.
    let vary_step = 1.0 / num_runs as f32;
    let mut vary_factors = vec![1.0f32];
    for i in 1..=num_runs / 2 + 1 {
        let up = 1.0 + i as f32 * vary_step;
        let down = 1.0 - i as f32 * vary_step;
        vary_factors.push(up);
        if down > 0.0 {
            vary_factors.push(down);
        }
    }
    vary_factors.truncate(num_runs);

    let weights = CostWeights {
        area: 1.0,
        outline: 1.0,
        wirelength: 0.0,
        guidance: 0.0,
        fence: 0.0,
    };
    // Shape moves are pointless here: flips keep the footprint.
    let probs = ActionProbs {
        shape: 0.0,
        ..ActionProbs::default()
    };
    let params = SaParams {
        num_perturb_per_step: params.num_perturb_per_step.max(macros.len()),
        ..params
    };

    let mut tilings: Vec<(f32, f32)> = vary_factors
        .par_iter()
        .enumerate()
        .map(|(i, factor)| {
            let width = outline.width() * factor;
            let height = outline.area() / width;
            let mut sa = SaCoreHardMacro::new(
                Rect::from_size(width, height),
                macros.to_vec(),
                Vec::new(),
                weights,
                probs,
                SaParams {
                    seed: params.seed + i as u64,
                    ..params
                },
            );
            sa.run();
            (sa.width(), sa.height())
        })
        .collect();

    tilings.retain(|&(w, h)| w <= outline.width() && h <= outline.height());
    tilings.sort_by(|a, b| (a.0 * a.1).total_cmp(&(b.0 * b.1)).then(a.0.total_cmp(&b.0)));
    tilings.dedup_by(|a, b| (a.0 - b.0).abs() < 1e-6 && (a.1 - b.1).abs() < 1e-6);
    tilings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params(seed: u64) -> SaParams {
        SaParams {
            max_num_step: 50,
            num_perturb_per_step: 20,
            seed,
            ..SaParams::default()
        }
    }

    #[test]
    fn empty_cluster_has_no_tilings() {
        let outline = Rect::from_size(20.0, 20.0);
        assert!(enumerate_macro_tilings(&outline, &[], 4, fast_params(0)).is_empty());
    }

    #[test]
    fn single_macro_is_its_own_tiling() {
        let outline = Rect::from_size(20.0, 20.0);
        let macros = vec![HardMacro::new("m", 7.0, 3.0)];
        assert_eq!(
            enumerate_macro_tilings(&outline, &macros, 4, fast_params(0)),
            vec![(7.0, 3.0)]
        );
    }

    #[test]
    fn tilings_fit_and_cover_macro_area() {
        let outline = Rect::from_size(20.0, 20.0);
        let macros = vec![
            HardMacro::new("m0", 10.0, 10.0),
            HardMacro::new("m1", 10.0, 10.0),
        ];
        let tilings = enumerate_macro_tilings(&outline, &macros, 5, fast_params(1));
        assert!(!tilings.is_empty());
        for &(w, h) in &tilings {
            assert!(w <= 20.0 && h <= 20.0);
            // A bounding box can never be smaller than the summed area.
            assert!(w * h >= 200.0 - 1e-3);
        }
        // Sorted by area.
        for pair in tilings.windows(2) {
            assert!(pair[0].0 * pair[0].1 <= pair[1].0 * pair[1].1 + 1e-3);
        }
    }

    #[test]
    fn tilings_are_deterministic() {
        let outline = Rect::from_size(30.0, 20.0);
        let macros = vec![
            HardMacro::new("m0", 8.0, 6.0),
            HardMacro::new("m1", 8.0, 6.0),
            HardMacro::new("m2", 8.0, 6.0),
        ];
        let a = enumerate_macro_tilings(&outline, &macros, 4, fast_params(5));
        let b = enumerate_macro_tilings(&outline, &macros, 4, fast_params(5));
        assert_eq!(a, b);
    }
}
