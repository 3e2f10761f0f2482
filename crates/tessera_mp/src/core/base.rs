//! Shared annealing-core state: sequence pair, packer, pair-permutation
//! moves, and the penalties common to both object kinds.
//!
//! `SaCoreBase` owns a private deep copy of every mutable piece of the
//! placement problem. Nothing is shared between concurrently running cores,
//! so batch execution needs no synchronization.

use crate::core::{Action, ActionProbs, CostWeights, SaParams, SequencePair, FIT_TOLERANCE};
use crate::ids::MacroId;
use crate::net::BundledNet;
use crate::placeable::Placeable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

/// A restorable result snapshot: enough to regenerate the floorplan by
/// re-running the packer.
#[derive(Debug, Clone)]
pub(crate) struct BestResult<M> {
    /// Normalized cost at the time of the snapshot.
    pub cost: f32,
    /// Object shapes and positions.
    pub macros: Vec<M>,
    /// Positive sequence.
    pub pos_seq: Vec<usize>,
    /// Negative sequence.
    pub neg_seq: Vec<usize>,
}

/// State shared by both annealing cores.
pub(crate) struct SaCoreBase<M> {
    /// The outline to pack into, in the parent's coordinate frame; packing
    /// itself works in the outline-local frame.
    pub outline: tessera_common::Rect,
    /// All objects: the sequence-pair-controlled prefix of `num_movable`
    /// entries, then fixed terminals.
    pub macros: Vec<M>,
    /// Length of the sequence-pair-controlled prefix.
    pub num_movable: usize,
    /// Bundled connections (terminals may index past `num_movable`).
    pub nets: Vec<BundledNet>,
    /// Hard constraint regions, outline-local, keyed by object.
    pub fences: BTreeMap<MacroId, tessera_common::Rect>,
    /// Soft attraction regions, outline-local, keyed by object.
    pub guides: BTreeMap<MacroId, tessera_common::Rect>,
    /// Shared cost weights.
    pub weights: CostWeights,
    /// Normalized action probabilities.
    pub probs: ActionProbs,
    /// Annealing hyperparameters.
    pub params: SaParams,
    /// Deterministically seeded generator.
    pub rng: StdRng,

    /// Positive sequence over `0..num_movable`.
    pub pos_seq: Vec<usize>,
    /// Negative sequence over `0..num_movable`.
    pub neg_seq: Vec<usize>,
    /// Caller-supplied initial sequence pair, if any.
    pub initial_pair: Option<SequencePair>,

    /// Packed floorplan width.
    pub width: f32,
    /// Packed floorplan height.
    pub height: f32,

    /// Raw outline-overflow penalty.
    pub outline_penalty: f32,
    /// Raw weighted wirelength.
    pub wirelength: f32,
    /// Raw guidance penalty.
    pub guidance_penalty: f32,
    /// Raw fence penalty.
    pub fence_penalty: f32,

    /// Normalization factor for the area term (fixed at 1.0).
    pub norm_area: f32,
    /// Normalization factor for the outline term.
    pub norm_outline: f32,
    /// Normalization factor for the wirelength term.
    pub norm_wirelength: f32,
    /// Normalization factor for the guidance term.
    pub norm_guidance: f32,
    /// Normalization factor for the fence term.
    pub norm_fence: f32,

    /// Initial annealing temperature derived during `initialize()`.
    pub init_temperature: f32,

    /// The last perturbation, selecting the restore path.
    pub action: Action,
    /// Object index mutated by the last shape move.
    pub target_macro: usize,
    pre_pos_seq: Vec<usize>,
    pre_neg_seq: Vec<usize>,
    pre_positions: Vec<(f32, f32)>,
    /// Object snapshot taken before shape moves.
    pub pre_macros: Vec<M>,
    pre_width: f32,
    pre_height: f32,
    pre_outline_penalty: f32,
    pre_wirelength: f32,
    pre_guidance_penalty: f32,
    pre_fence_penalty: f32,

    /// `(temperature, cost)` rows, one per outer step.
    pub cost_trace: Vec<(f32, f32)>,
    pub(crate) best: Option<BestResult<M>>,
    best_is_valid: bool,
    pub(crate) best_valid: Option<BestResult<M>>,
    /// Whether `initialize()` has completed.
    pub initialized: bool,
}

impl<M: Placeable + Clone> SaCoreBase<M> {
    /// Creates the shared state from the placement problem snapshot.
    ///
    /// `movable` is the sequence-pair-controlled object list (objects with a
    /// fixed position may appear here; they keep their coordinates but
    /// occupy space in the packing sweep). `terminals` are appended after
    /// the movable prefix and only participate through nets.
    pub fn new(
        outline: tessera_common::Rect,
        movable: Vec<M>,
        terminals: Vec<M>,
        weights: CostWeights,
        probs: ActionProbs,
        params: SaParams,
    ) -> Self {
        let num_movable = movable.len();
        let mut macros = movable;
        macros.extend(terminals);
        Self {
            outline,
            macros,
            num_movable,
            nets: Vec::new(),
            fences: BTreeMap::new(),
            guides: BTreeMap::new(),
            weights,
            probs: probs.normalized(),
            params,
            rng: StdRng::seed_from_u64(params.seed),
            pos_seq: Vec::new(),
            neg_seq: Vec::new(),
            initial_pair: None,
            width: 0.0,
            height: 0.0,
            outline_penalty: 0.0,
            wirelength: 0.0,
            guidance_penalty: 0.0,
            fence_penalty: 0.0,
            norm_area: 1.0,
            norm_outline: 1.0,
            norm_wirelength: 1.0,
            norm_guidance: 1.0,
            norm_fence: 1.0,
            init_temperature: 1.0,
            action: Action::None,
            target_macro: 0,
            pre_pos_seq: Vec::new(),
            pre_neg_seq: Vec::new(),
            pre_positions: Vec::new(),
            pre_macros: Vec::new(),
            pre_width: 0.0,
            pre_height: 0.0,
            pre_outline_penalty: 0.0,
            pre_wirelength: 0.0,
            pre_guidance_penalty: 0.0,
            pre_fence_penalty: 0.0,
            cost_trace: Vec::new(),
            best: None,
            best_is_valid: false,
            best_valid: None,
            initialized: false,
        }
    }

    /// Installs the bundled nets.
    ///
    /// # Panics
    ///
    /// Panics if a net terminal indexes past the object array (caller
    /// misuse).
    pub fn set_nets(&mut self, nets: Vec<BundledNet>) {
        for net in &nets {
            assert!(
                net.source.index() < self.macros.len() && net.target.index() < self.macros.len(),
                "net terminal out of range: {} -- {}",
                net.source,
                net.target
            );
        }
        self.nets = nets;
    }

    /// Installs the fence map (outline-local coordinates).
    ///
    /// # Panics
    ///
    /// Panics if a fence is attached to a non-movable object (caller misuse).
    pub fn set_fences(&mut self, fences: BTreeMap<MacroId, tessera_common::Rect>) {
        for id in fences.keys() {
            assert!(
                id.index() < self.num_movable,
                "fence attached to out-of-range object {id}"
            );
        }
        self.fences = fences;
    }

    /// Installs the guide map (outline-local coordinates).
    ///
    /// # Panics
    ///
    /// Panics if a guide is attached to a non-movable object (caller misuse).
    pub fn set_guides(&mut self, guides: BTreeMap<MacroId, tessera_common::Rect>) {
        for id in guides.keys() {
            assert!(
                id.index() < self.num_movable,
                "guide attached to out-of-range object {id}"
            );
        }
        self.guides = guides;
    }

    /// Supplies an initial sequence pair (used to seed tight-packing array
    /// layouts).
    ///
    /// # Panics
    ///
    /// Panics if the pair is not a pair of permutations over the movable
    /// objects (caller misuse).
    pub fn set_initial_sequence_pair(&mut self, pair: SequencePair) {
        assert!(
            pair.is_consistent(self.num_movable),
            "initial sequence pair is not a permutation pair over {} objects",
            self.num_movable
        );
        self.initial_pair = Some(pair);
    }

    /// Builds the starting sequence pair: the caller-supplied one, or the
    /// identity permutation.
    pub fn init_sequence_pair(&mut self) {
        let pair = self
            .initial_pair
            .clone()
            .unwrap_or_else(|| SequencePair::identity(self.num_movable));
        self.pos_seq = pair.pos;
        self.neg_seq = pair.neg;
    }

    /// Evaluates the sequence pair into concrete coordinates and the packed
    /// bounding width/height (classic two-pass longest-path packing).
    ///
    /// Fixed objects in the movable prefix keep their coordinates (their
    /// setters are no-ops) but still push the accumulation front.
    pub fn pack_floorplan(&mut self) {
        let n = self.num_movable;
        if n == 0 {
            self.width = 0.0;
            self.height = 0.0;
            return;
        }
        debug_assert_eq!(self.pos_seq.len(), n, "sequence pair not initialized");

        for m in &mut self.macros[..n] {
            m.set_x(0.0);
            m.set_y(0.0);
        }

        // Position of each object in the negative sequence.
        let mut neg_pos = vec![0usize; n];
        for (i, &b) in self.neg_seq.iter().enumerate() {
            neg_pos[b] = i;
        }

        // X pass over the positive sequence.
        let mut length = vec![0.0f32; n];
        for &b in &self.pos_seq {
            let p = neg_pos[b];
            self.macros[b].set_x(length[p]);
            let t = self.macros[b].x() + self.macros[b].width();
            for slot in length.iter_mut().skip(p) {
                if t > *slot {
                    *slot = t;
                } else {
                    break;
                }
            }
        }
        self.width = length[n - 1];

        // Y pass over the reversed positive sequence.
        for slot in length.iter_mut() {
            *slot = 0.0;
        }
        for &b in self.pos_seq.iter().rev() {
            let p = neg_pos[b];
            self.macros[b].set_y(length[p]);
            let t = self.macros[b].y() + self.macros[b].height();
            for slot in length.iter_mut().skip(p) {
                if t > *slot {
                    *slot = t;
                } else {
                    break;
                }
            }
        }
        self.height = length[n - 1];
    }

    /// Swaps two random entries of the positive (or negative) sequence.
    pub fn single_seq_swap(&mut self, pos: bool) {
        let n = self.num_movable;
        if n <= 1 {
            return;
        }
        let (i, j) = self.two_distinct_indices(n);
        if pos {
            self.pos_seq.swap(i, j);
        } else {
            self.neg_seq.swap(i, j);
        }
    }

    /// Applies the same index swap to both sequences.
    pub fn double_seq_swap(&mut self) {
        let n = self.num_movable;
        if n <= 1 {
            return;
        }
        let (i, j) = self.two_distinct_indices(n);
        self.pos_seq.swap(i, j);
        self.neg_seq.swap(i, j);
    }

    /// Exchanges the roles of two objects: swaps them in the positive
    /// sequence, then swaps the same two values in the negative sequence.
    ///
    /// # Panics
    ///
    /// Panics if the negative sequence does not contain both values; that
    /// would mean the pair stopped being a permutation pair, which is a bug
    /// in the move set.
    pub fn exchange_macros(&mut self) {
        let n = self.num_movable;
        if n <= 1 {
            return;
        }
        let (i, j) = self.two_distinct_indices(n);
        self.pos_seq.swap(i, j);
        let a = self.pos_seq[i];
        let b = self.pos_seq[j];
        let na = self
            .neg_seq
            .iter()
            .position(|&v| v == a)
            .expect("negative sequence lost an index during exchange");
        let nb = self
            .neg_seq
            .iter()
            .position(|&v| v == b)
            .expect("negative sequence lost an index during exchange");
        self.neg_seq.swap(na, nb);
    }

    fn two_distinct_indices(&mut self, n: usize) -> (usize, usize) {
        let i = self.rng.gen_range(0..n);
        let mut j = self.rng.gen_range(0..n);
        while j == i {
            j = self.rng.gen_range(0..n);
        }
        (i, j)
    }

    /// Saves the shared state touched by every perturbation, including the
    /// coordinates the packer will overwrite.
    pub fn save_shared(&mut self) {
        self.pre_pos_seq.clone_from(&self.pos_seq);
        self.pre_neg_seq.clone_from(&self.neg_seq);
        self.pre_positions.clear();
        self.pre_positions
            .extend(self.macros[..self.num_movable].iter().map(|m| (m.x(), m.y())));
        self.pre_width = self.width;
        self.pre_height = self.height;
        self.pre_outline_penalty = self.outline_penalty;
        self.pre_wirelength = self.wirelength;
        self.pre_guidance_penalty = self.guidance_penalty;
        self.pre_fence_penalty = self.fence_penalty;
    }

    /// Restores the shared state for the recorded action.
    ///
    /// Re-packing is skipped for speed; positions are restored from the
    /// saved snapshot instead, so a rejected trial leaves the core
    /// bit-identical to its pre-perturbation state.
    pub fn restore_shared(&mut self) {
        match self.action {
            Action::None => return,
            Action::PosSwap => self.pos_seq.clone_from(&self.pre_pos_seq),
            Action::NegSwap => self.neg_seq.clone_from(&self.pre_neg_seq),
            Action::DoubleSwap | Action::Exchange => {
                self.pos_seq.clone_from(&self.pre_pos_seq);
                self.neg_seq.clone_from(&self.pre_neg_seq);
            }
            Action::Shape => {}
        }
        for (i, &(x, y)) in self.pre_positions.iter().enumerate() {
            self.macros[i].set_x(x);
            self.macros[i].set_y(y);
        }
        self.width = self.pre_width;
        self.height = self.pre_height;
        self.outline_penalty = self.pre_outline_penalty;
        self.wirelength = self.pre_wirelength;
        self.guidance_penalty = self.pre_guidance_penalty;
        self.fence_penalty = self.pre_fence_penalty;
    }

    /// Returns the area penalty: packed bounding area over outline area.
    pub fn area_penalty(&self) -> f32 {
        self.width * self.height / (self.outline.width() * self.outline.height())
    }

    /// Computes the outline-overflow penalty: zero iff the packing fits,
    /// growing with either dimension's overflow, normalized by outline area.
    pub fn cal_outline_penalty(&mut self) {
        let ow = self.outline.width();
        let oh = self.outline.height();
        let max_width = ow.max(self.width);
        let max_height = oh.max(self.height);
        self.outline_penalty = (max_width * max_height - ow * oh) / (ow * oh);
    }

    /// Computes the weighted wirelength.
    ///
    /// Per net, the Manhattan distance between the endpoint pins — or, when
    /// an endpoint is an unplaced IO pin group, the distance from the other
    /// endpoint's pin to the nearest permitted boundary region. Normalized
    /// by the total weight and the outline half-perimeter.
    pub fn cal_wirelength(&mut self) {
        self.wirelength = 0.0;
        if self.nets.is_empty() {
            return;
        }
        let tot_weight: f32 = self.nets.iter().map(|n| n.weight).sum();
        if tot_weight <= 0.0 {
            return;
        }
        let mut wl = 0.0;
        for net in &self.nets {
            let src = &self.macros[net.source.index()];
            let dst = &self.macros[net.target.index()];
            let dist = if let Some(regions) = dst.unplaced_io_regions() {
                self.dist_to_nearest_region(src.pin_x(), src.pin_y(), regions)
            } else if let Some(regions) = src.unplaced_io_regions() {
                self.dist_to_nearest_region(dst.pin_x(), dst.pin_y(), regions)
            } else {
                (src.pin_x() - dst.pin_x()).abs() + (src.pin_y() - dst.pin_y()).abs()
            };
            wl += net.weight * dist;
        }
        self.wirelength = wl / tot_weight / (self.outline.width() + self.outline.height());
    }

    /// Manhattan distance from an outline-local pin to the nearest of the
    /// given regions (regions are in the parent frame, like the outline).
    fn dist_to_nearest_region(&self, pin_x: f32, pin_y: f32, regions: &[tessera_common::Rect]) -> f32 {
        let gx = pin_x + self.outline.lx;
        let gy = pin_y + self.outline.ly;
        let mut best = f32::MAX;
        for region in regions {
            let dx = (region.lx - gx).max(0.0).max(gx - region.ux);
            let dy = (region.ly - gy).max(0.0).max(gy - region.uy);
            best = best.min(dx + dy);
        }
        best
    }

    /// Computes the guidance penalty: the unrealized overlap between each
    /// guided object and its guide rectangle, averaged over guided objects.
    pub fn cal_guidance_penalty(&mut self) {
        self.guidance_penalty = 0.0;
        if self.guides.is_empty() {
            return;
        }
        for (id, guide) in &self.guides {
            let m = &self.macros[id.index()];
            let bbox = tessera_common::Rect::new(
                m.x(),
                m.y(),
                m.x() + m.width(),
                m.y() + m.height(),
            );
            let realizable = m.width().min(guide.width()) * m.height().min(guide.height());
            self.guidance_penalty += realizable - bbox.overlap_area(guide);
        }
        self.guidance_penalty /= self.guides.len() as f32;
    }

    /// Computes the fence penalty: the squared normalized excess distance of
    /// each fenced object's center beyond the region where the object still
    /// fits inside its fence, averaged over fenced objects.
    pub fn cal_fence_penalty(&mut self) {
        self.fence_penalty = 0.0;
        if self.fences.is_empty() {
            return;
        }
        let ow = self.outline.width();
        let oh = self.outline.height();
        for (id, fence) in &self.fences {
            let m = &self.macros[id.index()];
            let cx = m.x() + m.width() / 2.0;
            let cy = m.y() + m.height() / 2.0;
            let (tol_lx, tol_ux) = tolerance_span(fence.lx, fence.ux, m.width());
            let (tol_ly, tol_uy) = tolerance_span(fence.ly, fence.uy, m.height());
            let ex = ((tol_lx - cx).max(0.0).max(cx - tol_ux)) / ow;
            let ey = ((tol_ly - cy).max(0.0).max(cy - tol_uy)) / oh;
            self.fence_penalty += ex * ex + ey * ey;
        }
        self.fence_penalty /= self.fences.len() as f32;
    }

    /// Returns whether the packed floorplan fits the outline (with a small
    /// relative slack).
    pub fn is_valid(&self) -> bool {
        self.width <= self.outline.width() * (1.0 + FIT_TOLERANCE)
            && self.height <= self.outline.height() * (1.0 + FIT_TOLERANCE)
    }

    /// Records a committed trial into the best / best-valid snapshots.
    ///
    /// The overall best prefers valid results over invalid ones even at
    /// higher cost; among equally valid results, lower cost wins.
    pub fn note_result(&mut self, cost: f32, valid: bool) {
        let replace_best = match &self.best {
            None => true,
            Some(best) => {
                (valid && !self.best_is_valid)
                    || (valid == self.best_is_valid && cost < best.cost)
            }
        };
        if replace_best {
            self.best = Some(self.snapshot(cost));
            self.best_is_valid = valid;
        }
        if valid {
            let replace = match &self.best_valid {
                None => true,
                Some(best) => cost < best.cost,
            };
            if replace {
                self.best_valid = Some(self.snapshot(cost));
            }
        }
    }

    fn snapshot(&self, cost: f32) -> BestResult<M> {
        BestResult {
            cost,
            macros: self.macros.clone(),
            pos_seq: self.pos_seq.clone(),
            neg_seq: self.neg_seq.clone(),
        }
    }

    /// Returns whether a valid result has ever been recorded.
    pub fn has_best_valid(&self) -> bool {
        self.best_valid.is_some()
    }

    /// Returns the cost of the best valid result seen, if any.
    pub fn best_valid_cost(&self) -> Option<f32> {
        self.best_valid.as_ref().map(|b| b.cost)
    }

    /// Restores the best valid result as the current state.
    ///
    /// # Panics
    ///
    /// Panics if no valid result was recorded; callers must check
    /// [`has_best_valid`](Self::has_best_valid) first.
    pub fn restore_best_valid(&mut self) {
        let best = self
            .best_valid
            .as_ref()
            .expect("restore_best_valid without a recorded valid result");
        self.macros = best.macros.clone();
        self.pos_seq = best.pos_seq.clone();
        self.neg_seq = best.neg_seq.clone();
    }

    /// Averages a sampled penalty list (zero for an empty list).
    pub fn cal_average(values: &[f32]) -> f32 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f32>() / values.len() as f32
    }

    /// Writes the `(temperature, cost)` trace as plain-text rows.
    pub fn write_cost_file(&self, path: &Path) -> io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        for (temperature, cost) in &self.cost_trace {
            writeln!(file, "{temperature} {cost}")?;
        }
        Ok(())
    }
}

/// The span a rectangle's center may occupy so the whole extent stays
/// inside `[lo, hi]`; collapses to the midpoint when the extent is larger
/// than the span.
fn tolerance_span(lo: f32, hi: f32, extent: f32) -> (f32, f32) {
    let tol_lo = lo + extent / 2.0;
    let tol_hi = hi - extent / 2.0;
    if tol_lo > tol_hi {
        let mid = (lo + hi) / 2.0;
        (mid, mid)
    } else {
        (tol_lo, tol_hi)
    }
}
