//! Annealing core for rigid (hard) macros.
//!
//! Specializes the shared engine with the orientation-flip move and the
//! four-penalty cost model (area, outline, wirelength, guidance, fence).

use crate::core::base::SaCoreBase;
use crate::core::{
    clamp_norm, Action, ActionProbs, AnnealCore, CostWeights, SaParams, SequencePair,
};
use crate::hard_macro::HardMacro;
use crate::ids::MacroId;
use crate::net::BundledNet;
use rand::Rng;
use std::collections::BTreeMap;
use tessera_common::Rect;

/// Sequence-pair simulated annealing over rigid macros.
pub struct SaCoreHardMacro {
    base: SaCoreBase<HardMacro>,
}

impl SaCoreHardMacro {
    /// Creates a core for the given problem.
    ///
    /// `macros` are the sequence-pair-controlled objects (fixed-position
    /// macros allowed); `terminals` are fixed objects that only participate
    /// through nets.
    pub fn new(
        outline: Rect,
        macros: Vec<HardMacro>,
        terminals: Vec<HardMacro>,
        weights: CostWeights,
        probs: ActionProbs,
        params: SaParams,
    ) -> Self {
        Self {
            base: SaCoreBase::new(outline, macros, terminals, weights, probs, params),
        }
    }

    /// Installs the bundled nets.
    pub fn set_nets(&mut self, nets: Vec<BundledNet>) {
        self.base.set_nets(nets);
    }

    /// Installs the fence map (outline-local coordinates).
    pub fn set_fences(&mut self, fences: BTreeMap<MacroId, Rect>) {
        self.base.set_fences(fences);
    }

    /// Installs the guide map (outline-local coordinates).
    pub fn set_guides(&mut self, guides: BTreeMap<MacroId, Rect>) {
        self.base.set_guides(guides);
    }

    /// Supplies an initial sequence pair.
    pub fn set_initial_sequence_pair(&mut self, pair: SequencePair) {
        self.base.set_initial_sequence_pair(pair);
    }

    /// Returns the final shapes and positions.
    pub fn macros(&self) -> &[HardMacro] {
        &self.base.macros
    }

    /// Returns the raw area penalty.
    pub fn area_penalty(&self) -> f32 {
        self.base.area_penalty()
    }

    /// Returns the raw outline-overflow penalty.
    pub fn outline_penalty(&self) -> f32 {
        self.base.outline_penalty
    }

    /// Returns the outline normalization factor.
    pub fn norm_outline_penalty(&self) -> f32 {
        self.base.norm_outline
    }

    /// Returns the raw weighted wirelength.
    pub fn wirelength(&self) -> f32 {
        self.base.wirelength
    }

    /// Returns the wirelength normalization factor.
    pub fn norm_wirelength(&self) -> f32 {
        self.base.norm_wirelength
    }

    /// Returns the raw guidance penalty.
    pub fn guidance_penalty(&self) -> f32 {
        self.base.guidance_penalty
    }

    /// Returns the guidance normalization factor.
    pub fn norm_guidance_penalty(&self) -> f32 {
        self.base.norm_guidance
    }

    /// Returns the raw fence penalty.
    pub fn fence_penalty(&self) -> f32 {
        self.base.fence_penalty
    }

    /// Returns the fence normalization factor.
    pub fn norm_fence_penalty(&self) -> f32 {
        self.base.norm_fence
    }

    /// Returns the cost of the best valid result seen, if any.
    pub fn best_valid_cost(&self) -> Option<f32> {
        self.base.best_valid_cost()
    }

    /// Flips every macro about a randomly chosen axis.
    ///
    /// Orientation flips keep the footprint, so the packing itself is
    /// unchanged; only pin positions (and thus wirelength) move.
    fn flip_all_macros(&mut self) {
        let horizontal = self.base.rng.gen::<f32>() <= 0.5;
        let n = self.base.num_movable;
        for m in &mut self.base.macros[..n] {
            m.flip(horizontal);
        }
    }
}

impl AnnealCore for SaCoreHardMacro {
    type Macro = HardMacro;

    fn base(&self) -> &SaCoreBase<HardMacro> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SaCoreBase<HardMacro> {
        &mut self.base
    }

    fn perturb(&mut self) {
        if self.base.num_movable == 0 {
            return;
        }
        self.base.save_shared();

        let draw = self.base.rng.gen::<f32>();
        let action = self.base.probs.pick(draw);
        self.base.action = action;
        match action {
            Action::PosSwap => self.base.single_seq_swap(true),
            Action::NegSwap => self.base.single_seq_swap(false),
            Action::DoubleSwap => self.base.double_seq_swap(),
            Action::Exchange => self.base.exchange_macros(),
            Action::Shape => {
                self.base.pre_macros.clone_from(&self.base.macros);
                self.flip_all_macros();
            }
            Action::None => unreachable!("pick never returns None"),
        }

        self.base.pack_floorplan();
        self.cal_penalty();
    }

    fn restore(&mut self) {
        if self.base.num_movable == 0 {
            return;
        }
        if self.base.action == Action::Shape {
            self.base.macros.clone_from(&self.base.pre_macros);
        }
        self.base.restore_shared();
    }

    fn cal_penalty(&mut self) {
        self.base.cal_outline_penalty();
        self.base.cal_wirelength();
        self.base.cal_guidance_penalty();
        self.base.cal_fence_penalty();
    }

    fn cost(&self) -> f32 {
        let b = &self.base;
        let w = &b.weights;
        let mut cost = 0.0;
        if b.norm_area > 0.0 {
            cost += w.area * b.area_penalty() / b.norm_area;
        }
        if b.norm_outline > 0.0 {
            cost += w.outline * b.outline_penalty / b.norm_outline;
        }
        if b.norm_wirelength > 0.0 {
            cost += w.wirelength * b.wirelength / b.norm_wirelength;
        }
        if b.norm_guidance > 0.0 {
            cost += w.guidance * b.guidance_penalty / b.norm_guidance;
        }
        if b.norm_fence > 0.0 {
            cost += w.fence * b.fence_penalty / b.norm_fence;
        }
        cost
    }

    fn setup(&mut self) {
        self.base.init_sequence_pair();
        self.base.pack_floorplan();
        self.cal_penalty();

        let samples = self.base.params.num_perturb_per_step;
        let mut width_list = Vec::with_capacity(samples);
        let mut height_list = Vec::with_capacity(samples);
        let mut outline_list = Vec::with_capacity(samples);
        let mut wirelength_list = Vec::with_capacity(samples);
        let mut guidance_list = Vec::with_capacity(samples);
        let mut fence_list = Vec::with_capacity(samples);
        for _ in 0..samples {
            self.perturb();
            width_list.push(self.base.width);
            height_list.push(self.base.height);
            outline_list.push(self.base.outline_penalty);
            wirelength_list.push(self.base.wirelength);
            guidance_list.push(self.base.guidance_penalty);
            fence_list.push(self.base.fence_penalty);
        }

        self.base.norm_outline = clamp_norm(SaCoreBase::<HardMacro>::cal_average(&outline_list));
        self.base.norm_wirelength =
            clamp_norm(SaCoreBase::<HardMacro>::cal_average(&wirelength_list));
        self.base.norm_guidance = clamp_norm(SaCoreBase::<HardMacro>::cal_average(&guidance_list));
        self.base.norm_fence = clamp_norm(SaCoreBase::<HardMacro>::cal_average(&fence_list));

        // Replay the samples through the normalized cost to derive T0 from
        // the average cost delta.
        let mut cost_list = Vec::with_capacity(samples);
        for i in 0..samples {
            self.base.width = width_list[i];
            self.base.height = height_list[i];
            self.base.outline_penalty = outline_list[i];
            self.base.wirelength = wirelength_list[i];
            self.base.guidance_penalty = guidance_list[i];
            self.base.fence_penalty = fence_list[i];
            cost_list.push(self.cost());
        }
        let mut delta_cost = 0.0;
        for i in 1..cost_list.len() {
            delta_cost += (cost_list[i] - cost_list[i - 1]).abs();
        }
        self.base.init_temperature = if cost_list.len() > 1 && delta_cost > 0.0 {
            -(delta_cost / (cost_list.len() - 1) as f32) / self.base.params.init_prob.ln()
        } else {
            1.0
        };

        self.base.pack_floorplan();
        self.cal_penalty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SaCore;
    use crate::placeable::Placeable;

    fn zero_weights() -> CostWeights {
        CostWeights {
            area: 0.0,
            outline: 0.0,
            wirelength: 0.0,
            guidance: 0.0,
            fence: 0.0,
        }
    }

    fn small_params(seed: u64) -> SaParams {
        SaParams {
            init_prob: 0.95,
            max_num_step: 100,
            num_perturb_per_step: 30,
            seed,
            invalid_states_allowed: true,
        }
    }

    #[test]
    fn two_macros_fit_outline() {
        // Two unconnected 10x10 macros in a 30x10 outline with only the
        // outline term active: the best result does not overflow.
        let macros = vec![HardMacro::new("a", 10.0, 10.0), HardMacro::new("b", 10.0, 10.0)];
        let weights = CostWeights {
            outline: 1.0,
            ..zero_weights()
        };
        let mut sa = SaCoreHardMacro::new(
            Rect::from_size(30.0, 10.0),
            macros,
            Vec::new(),
            weights,
            ActionProbs::default(),
            small_params(11),
        );
        sa.run();
        assert!(sa.is_valid());
        assert_eq!(sa.outline_penalty(), 0.0);

        let a = &sa.macros()[0];
        let b = &sa.macros()[1];
        let ra = Rect::new(a.x(), a.y(), a.x() + a.width(), a.y() + a.height());
        let rb = Rect::new(b.x(), b.y(), b.x() + b.width(), b.y() + b.height());
        assert_eq!(ra.overlap_area(&rb), 0.0);
    }

    #[test]
    fn chain_net_places_middle_macro_between() {
        // A-B and B-C nets with only wirelength active: the chain collapses
        // so that B lies between A and C.
        let macros = vec![
            HardMacro::new("a", 10.0, 10.0),
            HardMacro::new("b", 10.0, 10.0),
            HardMacro::new("c", 10.0, 10.0),
        ];
        let weights = CostWeights {
            wirelength: 1.0,
            ..zero_weights()
        };
        let mut sa = SaCoreHardMacro::new(
            Rect::from_size(100.0, 100.0),
            macros,
            Vec::new(),
            weights,
            ActionProbs::default(),
            small_params(3),
        );
        sa.set_nets(vec![
            BundledNet::new(MacroId::from_raw(0), MacroId::from_raw(1), 1.0),
            BundledNet::new(MacroId::from_raw(1), MacroId::from_raw(2), 1.0),
        ]);
        sa.run();

        let pin = |i: usize| (sa.macros()[i].pin_x(), sa.macros()[i].pin_y());
        let (ax, ay) = pin(0);
        let (bx, by) = pin(1);
        let (cx, cy) = pin(2);
        let chain = (ax - bx).abs() + (ay - by).abs() + (bx - cx).abs() + (by - cy).abs();
        let direct = (ax - cx).abs() + (ay - cy).abs();
        // Manhattan chain length equals the direct distance iff B is inside
        // the A-C bounding box.
        assert!(chain - direct < 1e-3, "chain {chain} direct {direct}");
    }

    #[test]
    fn perturb_restore_is_bit_identical() {
        let macros = (0..5)
            .map(|i| HardMacro::new(format!("m{i}"), 4.0 + i as f32, 6.0))
            .collect();
        let mut sa = SaCoreHardMacro::new(
            Rect::from_size(60.0, 60.0),
            macros,
            Vec::new(),
            CostWeights::default(),
            ActionProbs::default(),
            small_params(5),
        );
        sa.initialize();
        for _ in 0..200 {
            let macros_before = sa.base.macros.clone();
            let pos_before = sa.base.pos_seq.clone();
            let neg_before = sa.base.neg_seq.clone();
            let state_before = (
                sa.base.width,
                sa.base.height,
                sa.base.outline_penalty,
                sa.base.wirelength,
                sa.base.guidance_penalty,
                sa.base.fence_penalty,
            );
            sa.perturb();
            sa.restore();
            assert_eq!(sa.base.macros, macros_before);
            assert_eq!(sa.base.pos_seq, pos_before);
            assert_eq!(sa.base.neg_seq, neg_before);
            assert_eq!(
                (
                    sa.base.width,
                    sa.base.height,
                    sa.base.outline_penalty,
                    sa.base.wirelength,
                    sa.base.guidance_penalty,
                    sa.base.fence_penalty,
                ),
                state_before
            );
        }
    }

    #[test]
    fn same_seed_reproduces_run() {
        let build = || {
            let macros = (0..6)
                .map(|i| HardMacro::new(format!("m{i}"), 5.0 + i as f32, 8.0))
                .collect();
            let mut sa = SaCoreHardMacro::new(
                Rect::from_size(50.0, 50.0),
                macros,
                Vec::new(),
                CostWeights::default(),
                ActionProbs::default(),
                small_params(42),
            );
            sa.set_nets(vec![
                BundledNet::new(MacroId::from_raw(0), MacroId::from_raw(3), 2.0),
                BundledNet::new(MacroId::from_raw(1), MacroId::from_raw(4), 1.0),
            ]);
            sa.run();
            sa
        };
        let a = build();
        let b = build();
        assert_eq!(a.norm_cost(), b.norm_cost());
        assert_eq!(a.width(), b.width());
        assert_eq!(a.height(), b.height());
        assert_eq!(a.base.pos_seq, b.base.pos_seq);
        assert_eq!(a.base.neg_seq, b.base.neg_seq);
        for (ma, mb) in a.macros().iter().zip(b.macros()) {
            assert_eq!(ma, mb);
        }
    }

    #[test]
    fn normalization_is_deterministic() {
        let build = || {
            let macros = (0..4)
                .map(|i| HardMacro::new(format!("m{i}"), 4.0, 4.0 + i as f32))
                .collect();
            let mut sa = SaCoreHardMacro::new(
                Rect::from_size(30.0, 30.0),
                macros,
                Vec::new(),
                CostWeights::default(),
                ActionProbs::default(),
                small_params(9),
            );
            sa.set_nets(vec![BundledNet::new(
                MacroId::from_raw(0),
                MacroId::from_raw(2),
                1.0,
            )]);
            sa.initialize();
            sa
        };
        let a = build();
        let b = build();
        assert_eq!(a.norm_outline_penalty(), b.norm_outline_penalty());
        assert_eq!(a.norm_wirelength(), b.norm_wirelength());
        assert_eq!(a.base.init_temperature, b.base.init_temperature);
    }

    #[test]
    fn degenerate_norms_clamp_to_one() {
        // A single macro: no swap changes anything, outline never overflows,
        // no nets. All sampled penalties are zero, so every factor clamps.
        let macros = vec![HardMacro::new("solo", 5.0, 5.0)];
        let mut sa = SaCoreHardMacro::new(
            Rect::from_size(30.0, 30.0),
            macros,
            Vec::new(),
            CostWeights::default(),
            ActionProbs::default(),
            small_params(1),
        );
        sa.initialize();
        assert_eq!(sa.norm_outline_penalty(), 1.0);
        assert_eq!(sa.norm_wirelength(), 1.0);
        assert_eq!(sa.base.init_temperature, 1.0);
    }

    #[test]
    fn trace_has_one_row_per_step() {
        let macros = vec![HardMacro::new("a", 4.0, 4.0), HardMacro::new("b", 4.0, 4.0)];
        let mut sa = SaCoreHardMacro::new(
            Rect::from_size(20.0, 20.0),
            macros,
            Vec::new(),
            CostWeights::default(),
            ActionProbs::default(),
            small_params(2),
        );
        sa.run();
        assert_eq!(sa.cost_trace().len(), 100);
        // Temperature decays monotonically.
        for pair in sa.cost_trace().windows(2) {
            assert!(pair[1].0 < pair[0].0);
        }
    }

    #[test]
    fn flip_only_moves_pins() {
        let macros = vec![HardMacro::with_halo("a", 10.0, 10.0, 0.0, 0.0, 2.0, 3.0)];
        let probs = ActionProbs {
            pos_swap: 0.0,
            neg_swap: 0.0,
            double_swap: 0.0,
            exchange: 0.0,
            shape: 1.0,
        };
        let mut sa = SaCoreHardMacro::new(
            Rect::from_size(20.0, 20.0),
            macros,
            Vec::new(),
            CostWeights::default(),
            probs,
            small_params(8),
        );
        sa.initialize();
        let width_before = sa.width();
        sa.perturb();
        assert_eq!(sa.width(), width_before);
        assert_ne!(sa.macros()[0].orientation(), crate::Orientation::R0);
    }

    #[test]
    fn empty_core_runs() {
        let mut sa = SaCoreHardMacro::new(
            Rect::from_size(10.0, 10.0),
            Vec::new(),
            Vec::new(),
            CostWeights::default(),
            ActionProbs::default(),
            small_params(0),
        );
        sa.run();
        assert!(sa.is_valid());
        assert_eq!(sa.width(), 0.0);
    }
}
