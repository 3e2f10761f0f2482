//! Annealing core for resizable (soft) macros.
//!
//! Specializes the shared engine with the cluster-resize move and the
//! soft-only penalties: boundary attraction for macro-bearing clusters,
//! overlap with macro blockages and fixed macros, and notch-shaped dead
//! space. After the schedule completes, the floorplan is post-processed:
//! re-centered inside the outline, macro clusters near a boundary are
//! snapped flush, and std-cell/mixed clusters absorb remaining dead space.

use crate::core::base::SaCoreBase;
use crate::core::{
    clamp_norm, Action, ActionProbs, AnnealCore, CostWeights, SaParams, SequencePair,
    SoftCostWeights, FIT_TOLERANCE,
};
use crate::ids::MacroId;
use crate::net::BundledNet;
use crate::placeable::Placeable;
use crate::soft_macro::SoftMacro;
use rand::Rng;
use std::collections::BTreeMap;
use tessera_common::Rect;

/// Tolerance used when tightening alignment thresholds to macro sizes.
const ALIGN_TOLERANCE: f32 = 0.1;

/// Fraction of the outline used to cap alignment thresholds.
const ALIGN_RATIO: f32 = 0.1;

/// Probability of resizing uniformly at random instead of snapping to a
/// neighbor's edge.
const RANDOM_RESIZE_PROB: f32 = 0.4;

/// Sequence-pair simulated annealing over soft macros.
pub struct SaCoreSoftMacro {
    base: SaCoreBase<SoftMacro>,
    /// Top-level design boundary; the boundary penalty is measured against
    /// it, not against the immediate parent outline.
    root: Rect,
    soft_weights: SoftCostWeights,
    notch_h_th: f32,
    notch_v_th: f32,
    blockages: Vec<Rect>,
    fixed_macros: Vec<Rect>,

    boundary_penalty: f32,
    macro_blockage_penalty: f32,
    notch_penalty: f32,
    norm_boundary: f32,
    norm_macro_blockage: f32,
    norm_notch: f32,

    pre_boundary_penalty: f32,
    pre_macro_blockage_penalty: f32,
    pre_notch_penalty: f32,
}

impl SaCoreSoftMacro {
    /// Creates a core for the given problem.
    ///
    /// `root` is the top-level design rectangle and `outline` this level's
    /// placement region within it. `notch_thresholds` are the `(horizontal,
    /// vertical)` span limits below which a constrained empty region counts
    /// as a notch; they default to a tenth of the outline.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        root: Rect,
        outline: Rect,
        macros: Vec<SoftMacro>,
        terminals: Vec<SoftMacro>,
        weights: CostWeights,
        soft_weights: SoftCostWeights,
        notch_thresholds: Option<(f32, f32)>,
        probs: ActionProbs,
        params: SaParams,
    ) -> Self {
        let (notch_h_th, notch_v_th) =
            notch_thresholds.unwrap_or((outline.width() / 10.0, outline.height() / 10.0));
        Self {
            base: SaCoreBase::new(outline, macros, terminals, weights, probs, params),
            root,
            soft_weights,
            notch_h_th,
            notch_v_th,
            blockages: Vec::new(),
            fixed_macros: Vec::new(),
            boundary_penalty: 0.0,
            macro_blockage_penalty: 0.0,
            notch_penalty: 0.0,
            norm_boundary: 1.0,
            norm_macro_blockage: 1.0,
            norm_notch: 1.0,
            pre_boundary_penalty: 0.0,
            pre_macro_blockage_penalty: 0.0,
            pre_notch_penalty: 0.0,
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

    /// Adds macro blockages already clipped to the outline (outline-local).
    pub fn add_blockages(&mut self, blockages: Vec<Rect>) {
        self.blockages.extend(blockages);
    }

    /// Adds fixed-macro rectangles (outline-local) penalized like blockages
    /// but without the macro-dominance discount.
    pub fn add_fixed_macros(&mut self, rects: Vec<Rect>) {
        self.fixed_macros.extend(rects);
    }

    /// Returns the final shapes and positions.
    pub fn macros(&self) -> &[SoftMacro] {
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

    /// Returns the raw boundary penalty.
    pub fn boundary_penalty(&self) -> f32 {
        self.boundary_penalty
    }

    /// Returns the boundary normalization factor.
    pub fn norm_boundary_penalty(&self) -> f32 {
        self.norm_boundary
    }

    /// Returns the raw macro-blockage overlap penalty.
    pub fn macro_blockage_penalty(&self) -> f32 {
        self.macro_blockage_penalty
    }

    /// Returns the macro-blockage normalization factor.
    pub fn norm_macro_blockage_penalty(&self) -> f32 {
        self.norm_macro_blockage
    }

    /// Returns the raw notch penalty.
    pub fn notch_penalty(&self) -> f32 {
        self.notch_penalty
    }

    /// Returns the notch normalization factor.
    pub fn norm_notch_penalty(&self) -> f32 {
        self.norm_notch
    }

    /// Returns the cost of the best valid result seen, if any.
    pub fn best_valid_cost(&self) -> Option<f32> {
        self.base.best_valid_cost()
    }

    /// Resizes one randomly chosen cluster.
    ///
    /// Macro clusters jump to a random tiling. Other clusters either resize
    /// uniformly at random along their shape curve or snap one edge to the
    /// nearest neighboring object's edge (grow/shrink width, grow/shrink
    /// height, one of four rules).
    fn resize_one_cluster(&mut self) {
        let idx = self.base.rng.gen_range(0..self.base.num_movable);
        self.base.target_macro = idx;

        if self.base.macros[idx].is_macro_cluster() {
            let mut m = self.base.macros[idx].clone();
            m.resize_randomly(&mut self.base.rng);
            self.base.macros[idx] = m;
            return;
        }

        let lx = self.base.macros[idx].x();
        let ly = self.base.macros[idx].y();
        let ux = lx + self.base.macros[idx].width();
        let uy = ly + self.base.macros[idx].height();
        let outline_width = self.base.outline.width();
        let outline_height = self.base.outline.height();

        // Outside the outline there is no meaningful neighbor edge.
        if ux >= outline_width || uy >= outline_height {
            let mut m = self.base.macros[idx].clone();
            m.resize_randomly(&mut self.base.rng);
            self.base.macros[idx] = m;
            return;
        }

        if self.base.rng.gen::<f32>() < RANDOM_RESIZE_PROB {
            let mut m = self.base.macros[idx].clone();
            m.resize_randomly(&mut self.base.rng);
            self.base.macros[idx] = m;
            return;
        }

        let option = self.base.rng.gen::<f32>();
        if option <= 0.25 {
            // Grow the width to the nearest right edge beyond this macro.
            let mut e_x2 = outline_width;
            for m in &self.base.macros {
                let cur_x2 = m.x() + m.width();
                if cur_x2 > ux && cur_x2 < e_x2 {
                    e_x2 = cur_x2;
                }
            }
            self.base.macros[idx].set_width(e_x2 - lx);
        } else if option <= 0.5 {
            // Shrink the width back to the nearest enclosed right edge.
            let mut d_x2 = lx;
            for m in &self.base.macros {
                let cur_x2 = m.x() + m.width();
                if cur_x2 < ux && cur_x2 > d_x2 {
                    d_x2 = cur_x2;
                }
            }
            if d_x2 <= lx {
                return;
            }
            self.base.macros[idx].set_width(d_x2 - lx);
        } else if option <= 0.75 {
            // Grow the height to the nearest top edge beyond this macro.
            let mut a_y2 = outline_height;
            for m in &self.base.macros {
                let cur_y2 = m.y() + m.height();
                if cur_y2 > uy && cur_y2 < a_y2 {
                    a_y2 = cur_y2;
                }
            }
            self.base.macros[idx].set_height(a_y2 - ly);
        } else {
            // Shrink the height back to the nearest enclosed top edge.
            let mut c_y2 = ly;
            for m in &self.base.macros {
                let cur_y2 = m.y() + m.height();
                if cur_y2 < uy && cur_y2 > c_y2 {
                    c_y2 = cur_y2;
                }
            }
            if c_y2 <= ly {
                return;
            }
            self.base.macros[idx].set_height(c_y2 - ly);
        }
    }

    /// Computes the boundary penalty: for every macro-bearing cluster, the
    /// Manhattan distance from its global extent to the nearest root-design
    /// boundary, weighted by its macro count and averaged over all macros.
    fn cal_boundary_penalty(&mut self) {
        self.boundary_penalty = 0.0;
        if self.soft_weights.boundary <= 0.0 {
            return;
        }
        let movable = &self.base.macros[..self.base.num_movable];
        let tot_num_macros: u32 = movable.iter().map(|m| m.num_macros()).sum();
        if tot_num_macros == 0 {
            return;
        }
        for m in movable {
            if m.num_macros() == 0 {
                continue;
            }
            let global_lx = m.x() + self.base.outline.lx - self.root.lx;
            let global_ly = m.y() + self.base.outline.ly - self.root.ly;
            let global_ux = global_lx + m.width();
            let global_uy = global_ly + m.height();
            let x_dist = global_lx.min((self.root.width() - global_ux).abs());
            let y_dist = global_ly.min((self.root.height() - global_uy).abs());
            self.boundary_penalty += x_dist.min(y_dist) * m.num_macros() as f32;
        }
        self.boundary_penalty /= tot_num_macros as f32;
    }

    /// Computes the overlap penalty between macro-bearing clusters and
    /// blockages / fixed macros.
    ///
    /// Overlap with a blockage is discounted by the cluster's macro-area
    /// fraction, so mixed clusters dominated by standard cells pay less;
    /// overlap with a fixed macro is charged in full. Both are weighted by
    /// the cluster's macro count and averaged over all macros.
    fn cal_macro_blockage_penalty(&mut self) {
        self.macro_blockage_penalty = 0.0;
        if (self.blockages.is_empty() && self.fixed_macros.is_empty())
            || self.soft_weights.macro_blockage <= 0.0
        {
            return;
        }
        let movable = &self.base.macros[..self.base.num_movable];
        let tot_num_macros: u32 = movable.iter().map(|m| m.num_macros()).sum();
        if tot_num_macros == 0 {
            return;
        }
        for m in movable {
            if m.num_macros() == 0 {
                continue;
            }
            let bbox = m.bbox();
            let count = m.num_macros() as f32;
            for blockage in &self.blockages {
                self.macro_blockage_penalty +=
                    bbox.overlap_area(blockage) * count * m.macro_area_fraction();
            }
            for fixed in &self.fixed_macros {
                self.macro_blockage_penalty += bbox.overlap_area(fixed) * count;
            }
        }
        self.macro_blockage_penalty /= tot_num_macros as f32;
    }

    /// Computes the notch penalty.
    ///
    /// A floorplan that cannot fit the outline is one giant notch. Otherwise
    /// macro clusters are aligned and dead space filled on a scratch copy,
    /// a coordinate grid is built from the non-std-cell object edges, and
    /// every constrained empty region contributes
    /// `sqrt(region_area / outline_area)`.
    fn cal_notch_penalty(&mut self) {
        self.notch_penalty = 0.0;
        if self.soft_weights.notch <= 0.0 {
            return;
        }
        let outline_width = self.base.outline.width();
        let outline_height = self.base.outline.height();
        let outline_area = outline_width * outline_height;
        if self.base.width > outline_width * (1.0 + FIT_TOLERANCE)
            || self.base.height > outline_height * (1.0 + FIT_TOLERANCE)
        {
            let area = self.base.width.max(outline_width) * self.base.height.max(outline_height);
            self.notch_penalty = (area / outline_area).sqrt();
            return;
        }

        // Alignment and filling reshape the floorplan; measure on a scratch
        // copy and restore afterwards.
        let saved = self.base.macros.clone();
        self.align_macro_clusters();
        self.fill_dead_space();

        let movable = &self.base.macros[..self.base.num_movable];
        let mut xs = vec![0.0, outline_width];
        let mut ys = vec![0.0, outline_height];
        let mut relevant = vec![false; movable.len()];
        for (i, m) in movable.iter().enumerate() {
            if m.area() <= 0.0 || (!m.is_macro_cluster() && !m.is_mixed_cluster()) {
                continue;
            }
            relevant[i] = true;
            xs.push(m.x());
            xs.push(m.x() + m.width());
            ys.push(m.y());
            ys.push(m.y() + m.height());
        }
        let xs = sorted_grid(xs);
        let ys = sorted_grid(ys);
        let num_x = xs.len() - 1;
        let num_y = ys.len() - 1;
        let mut grid = vec![vec![-1i32; num_x]; num_y];
        for (i, m) in movable.iter().enumerate() {
            if !relevant[i] {
                continue;
            }
            let (x_start, x_end) = segment_range(m.x(), m.x() + m.width(), &xs);
            let (y_start, y_end) = segment_range(m.y(), m.y() + m.height(), &ys);
            for row in grid.iter_mut().take(y_end).skip(y_start) {
                for cell in row.iter_mut().take(x_end).skip(x_start) {
                    *cell = i as i32;
                }
            }
        }

        // Expand every unvisited empty cell into a maximal empty rectangle
        // and classify it by which sides placed content blocks.
        let mut visited = vec![vec![false; num_x]; num_y];
        for j in 0..num_y {
            for i in 0..num_x {
                if grid[j][i] != -1 || visited[j][i] {
                    continue;
                }
                let (x_start, x_end, y_start, y_end) = expand_empty(&grid, i, j, num_x, num_y);
                for row in visited.iter_mut().take(y_end).skip(y_start) {
                    for cell in row.iter_mut().take(x_end).skip(x_start) {
                        *cell = true;
                    }
                }
                let left_blocked = x_start > 0
                    && (y_start..y_end).any(|y| grid[y][x_start - 1] != -1);
                let right_blocked =
                    x_end < num_x && (y_start..y_end).any(|y| grid[y][x_end] != -1);
                let bottom_blocked =
                    y_start > 0 && (x_start..x_end).any(|x| grid[y_start - 1][x] != -1);
                let top_blocked =
                    y_end < num_y && (x_start..x_end).any(|x| grid[y_end][x] != -1);

                let span_w = xs[x_end] - xs[x_start];
                let span_h = ys[y_end] - ys[y_start];
                let is_notch = (left_blocked && right_blocked && bottom_blocked && top_blocked)
                    || (left_blocked && right_blocked && span_w <= self.notch_h_th)
                    || (bottom_blocked && top_blocked && span_h <= self.notch_v_th);
                if is_notch {
                    self.notch_penalty += (span_w * span_h / outline_area).sqrt();
                }
            }
        }

        self.base.macros = saved;
    }

    /// Snaps macro clusters flush to an outline edge when they already sit
    /// within the (size-tightened) notch thresholds of it.
    fn align_macro_clusters(&mut self) {
        let outline_width = self.base.outline.width();
        let outline_height = self.base.outline.height();
        if self.base.width > outline_width || self.base.height > outline_height {
            return;
        }
        let movable = &self.base.macros[..self.base.num_movable];
        let mut adjust_h = self.notch_h_th;
        let mut adjust_v = self.notch_v_th;
        for m in movable {
            if m.is_macro_cluster() {
                adjust_h = adjust_h.min(m.width() * (1.0 - ALIGN_TOLERANCE));
                adjust_v = adjust_v.min(m.height() * (1.0 - ALIGN_TOLERANCE));
            }
        }
        adjust_h = adjust_h.min(outline_width * ALIGN_RATIO);
        adjust_v = adjust_v.min(outline_height * ALIGN_RATIO);

        for m in &mut self.base.macros[..self.base.num_movable] {
            if !m.is_macro_cluster() {
                continue;
            }
            let lx = m.x();
            let ly = m.y();
            let ux = lx + m.width();
            let uy = ly + m.height();
            let mut x = lx;
            let mut y = ly;
            if lx <= adjust_h {
                x = 0.0;
            } else if outline_width - ux <= adjust_h {
                x = outline_width - m.width();
            }
            if ly <= adjust_v {
                y = 0.0;
            } else if outline_height - uy <= adjust_v {
                y = outline_height - m.height();
            }
            m.override_location(x, y);
        }
    }

    /// Grows mixed clusters (then std-cell clusters) into adjacent empty
    /// grid cells, absorbing dead space without moving any macro cluster.
    fn fill_dead_space(&mut self) {
        let outline_width = self.base.outline.width();
        let outline_height = self.base.outline.height();
        if self.base.width > outline_width * (1.0 + FIT_TOLERANCE)
            || self.base.height > outline_height * (1.0 + FIT_TOLERANCE)
        {
            return;
        }

        let n = self.base.num_movable;
        let mut xs = vec![0.0, outline_width];
        let mut ys = vec![0.0, outline_height];
        for m in &self.base.macros[..n] {
            if m.area() <= 0.0 {
                continue;
            }
            xs.push(m.x());
            xs.push(m.x() + m.width());
            ys.push(m.y());
            ys.push(m.y() + m.height());
        }
        let xs = sorted_grid(xs);
        let ys = sorted_grid(ys);
        let num_x = xs.len() - 1;
        let num_y = ys.len() - 1;
        let mut grid = vec![vec![-1i32; num_x]; num_y];
        for i in 0..n {
            let m = &self.base.macros[i];
            if m.area() <= 0.0 {
                continue;
            }
            let (x_start, x_end) = segment_range(m.x(), m.x() + m.width(), &xs);
            let (y_start, y_end) = segment_range(m.y(), m.y() + m.height(), &ys);
            for row in grid.iter_mut().take(y_end).skip(y_start) {
                for cell in row.iter_mut().take(x_end).skip(x_start) {
                    *cell = i as i32;
                }
            }
        }

        // Mixed clusters expand first, std-cell clusters mop up after.
        for order in 0..2 {
            for i in 0..n {
                let m = &self.base.macros[i];
                if m.area() <= 0.0 {
                    continue;
                }
                let expand = if order == 0 {
                    m.is_mixed_cluster()
                } else {
                    m.is_std_cell_cluster()
                };
                if !expand {
                    continue;
                }
                let (mut x_start, mut x_end) = segment_range(m.x(), m.x() + m.width(), &xs);
                let (mut y_start, mut y_end) = segment_range(m.y(), m.y() + m.height(), &ys);

                // Left.
                while x_start > 0 && (y_start..y_end).all(|y| grid[y][x_start - 1] == -1) {
                    x_start -= 1;
                    for row in grid.iter_mut().take(y_end).skip(y_start) {
                        row[x_start] = i as i32;
                    }
                }
                // Top.
                while y_end < num_y && (x_start..x_end).all(|x| grid[y_end][x] == -1) {
                    for cell in grid[y_end].iter_mut().take(x_end).skip(x_start) {
                        *cell = i as i32;
                    }
                    y_end += 1;
                }
                // Right.
                while x_end < num_x && (y_start..y_end).all(|y| grid[y][x_end] == -1) {
                    for row in grid.iter_mut().take(y_end).skip(y_start) {
                        row[x_end] = i as i32;
                    }
                    x_end += 1;
                }
                // Bottom.
                while y_start > 0 && (x_start..x_end).all(|x| grid[y_start - 1][x] == -1) {
                    y_start -= 1;
                    for row in grid.iter_mut().skip(y_start).take(1) {
                        for cell in row.iter_mut().take(x_end).skip(x_start) {
                            *cell = i as i32;
                        }
                    }
                }

                let m = &mut self.base.macros[i];
                m.override_location(xs[x_start], ys[y_start]);
                m.override_shape(xs[x_end] - xs[x_start], ys[y_end] - ys[y_start]);
            }
        }
    }

    /// Re-centers the packed floorplan inside the outline, keeping the
    /// change only if the cost does not worsen.
    fn attempt_centralization(&mut self, pre_cost: f32) {
        if self.base.outline_penalty > 0.0 {
            return;
        }
        let n = self.base.num_movable;
        let saved: Vec<(f32, f32)> = self.base.macros[..n].iter().map(|m| (m.x(), m.y())).collect();
        let offset_x = (self.base.outline.width() - self.base.width) / 2.0;
        let offset_y = (self.base.outline.height() - self.base.height) / 2.0;
        for m in &mut self.base.macros[..n] {
            let x = m.x() + offset_x;
            let y = m.y() + offset_y;
            m.set_x(x);
            m.set_y(y);
        }
        self.cal_penalty();
        if self.cost() > pre_cost {
            for (m, &(x, y)) in self.base.macros[..n].iter_mut().zip(&saved) {
                m.set_x(x);
                m.set_y(y);
            }
            self.cal_penalty();
        }
    }

    /// Snaps near-boundary macro clusters flush to the nearest edge,
    /// reverting if the cost worsens.
    fn attempt_macro_cluster_alignment(&mut self, pre_cost: f32) {
        let n = self.base.num_movable;
        let saved: Vec<(f32, f32)> = self.base.macros[..n].iter().map(|m| (m.x(), m.y())).collect();
        self.align_macro_clusters();
        self.cal_penalty();
        if self.cost() > pre_cost {
            for (m, &(x, y)) in self.base.macros[..n].iter_mut().zip(&saved) {
                m.override_location(x, y);
            }
            self.cal_penalty();
        }
    }
}

impl AnnealCore for SaCoreSoftMacro {
    type Macro = SoftMacro;

    fn base(&self) -> &SaCoreBase<SoftMacro> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SaCoreBase<SoftMacro> {
        &mut self.base
    }

    fn perturb(&mut self) {
        if self.base.num_movable == 0 {
            return;
        }
        self.base.save_shared();
        self.pre_boundary_penalty = self.boundary_penalty;
        self.pre_macro_blockage_penalty = self.macro_blockage_penalty;
        self.pre_notch_penalty = self.notch_penalty;

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
                self.resize_one_cluster();
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
            let idx = self.base.target_macro;
            self.base.macros[idx] = self.base.pre_macros[idx].clone();
        }
        self.base.restore_shared();
        self.boundary_penalty = self.pre_boundary_penalty;
        self.macro_blockage_penalty = self.pre_macro_blockage_penalty;
        self.notch_penalty = self.pre_notch_penalty;
    }

    fn cal_penalty(&mut self) {
        self.base.cal_outline_penalty();
        self.base.cal_wirelength();
        self.base.cal_guidance_penalty();
        self.base.cal_fence_penalty();
        self.cal_boundary_penalty();
        self.cal_macro_blockage_penalty();
        self.cal_notch_penalty();
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
        if self.norm_boundary > 0.0 {
            cost += self.soft_weights.boundary * self.boundary_penalty / self.norm_boundary;
        }
        if self.norm_macro_blockage > 0.0 {
            cost += self.soft_weights.macro_blockage * self.macro_blockage_penalty
                / self.norm_macro_blockage;
        }
        if self.norm_notch > 0.0 {
            cost += self.soft_weights.notch * self.notch_penalty / self.norm_notch;
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
        let mut boundary_list = Vec::with_capacity(samples);
        let mut blockage_list = Vec::with_capacity(samples);
        let mut notch_list = Vec::with_capacity(samples);
        for _ in 0..samples {
            self.perturb();
            width_list.push(self.base.width);
            height_list.push(self.base.height);
            outline_list.push(self.base.outline_penalty);
            wirelength_list.push(self.base.wirelength);
            guidance_list.push(self.base.guidance_penalty);
            fence_list.push(self.base.fence_penalty);
            boundary_list.push(self.boundary_penalty);
            blockage_list.push(self.macro_blockage_penalty);
            notch_list.push(self.notch_penalty);
        }

        self.base.norm_outline = clamp_norm(SaCoreBase::<SoftMacro>::cal_average(&outline_list));
        self.base.norm_wirelength =
            clamp_norm(SaCoreBase::<SoftMacro>::cal_average(&wirelength_list));
        self.base.norm_guidance = clamp_norm(SaCoreBase::<SoftMacro>::cal_average(&guidance_list));
        self.base.norm_fence = clamp_norm(SaCoreBase::<SoftMacro>::cal_average(&fence_list));
        self.norm_boundary = clamp_norm(SaCoreBase::<SoftMacro>::cal_average(&boundary_list));
        self.norm_macro_blockage =
            clamp_norm(SaCoreBase::<SoftMacro>::cal_average(&blockage_list));
        self.norm_notch = clamp_norm(SaCoreBase::<SoftMacro>::cal_average(&notch_list));

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
            self.boundary_penalty = boundary_list[i];
            self.macro_blockage_penalty = blockage_list[i];
            self.notch_penalty = notch_list[i];
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

    fn post_process(&mut self) {
        self.attempt_centralization(self.cost());
        self.attempt_macro_cluster_alignment(self.cost());
        if self.base.is_valid() {
            self.fill_dead_space();
            self.cal_penalty();
        }
    }
}

/// Sorts and deduplicates grid coordinates.
fn sorted_grid(mut values: Vec<f32>) -> Vec<f32> {
    values.sort_by(f32::total_cmp);
    values.dedup();
    values
}

/// Maps a `[lo, hi)` segment onto grid cell indices `[start, end)`.
///
/// Grid lines include every object edge, so segment endpoints always land
/// on grid lines.
fn segment_range(lo: f32, hi: f32, grid: &[f32]) -> (usize, usize) {
    let mut start = 0;
    let mut end = grid.len() - 1;
    for i in 0..grid.len() - 1 {
        if grid[i] <= lo && grid[i + 1] > lo {
            start = i;
        }
        if grid[i] <= hi && grid[i + 1] > hi {
            end = i;
        }
    }
    (start, end)
}

/// Expands an empty seed cell into a maximal empty rectangle (left, right,
/// bottom, top greedy order). Returns `(x_start, x_end, y_start, y_end)`.
fn expand_empty(
    grid: &[Vec<i32>],
    i: usize,
    j: usize,
    num_x: usize,
    num_y: usize,
) -> (usize, usize, usize, usize) {
    let mut x_start = i;
    let mut x_end = i + 1;
    let mut y_start = j;
    let mut y_end = j + 1;
    while x_start > 0 && (y_start..y_end).all(|y| grid[y][x_start - 1] == -1) {
        x_start -= 1;
    }
    while x_end < num_x && (y_start..y_end).all(|y| grid[y][x_end] == -1) {
        x_end += 1;
    }
    while y_start > 0 && (x_start..x_end).all(|x| grid[y_start - 1][x] == -1) {
        y_start -= 1;
    }
    while y_end < num_y && (x_start..x_end).all(|x| grid[y_end][x] == -1) {
        y_end += 1;
    }
    (x_start, x_end, y_start, y_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SaCore;
    use crate::shape::ShapeCurve;
    use crate::soft_macro::SoftMacroKind;

    fn zero_weights() -> CostWeights {
        CostWeights {
            area: 0.0,
            outline: 0.0,
            wirelength: 0.0,
            guidance: 0.0,
            fence: 0.0,
        }
    }

    fn zero_soft_weights() -> SoftCostWeights {
        SoftCostWeights {
            boundary: 0.0,
            macro_blockage: 0.0,
            notch: 0.0,
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

    fn std_cluster(name: &str, w: f32, h: f32) -> SoftMacro {
        SoftMacro::cluster(
            name,
            SoftMacroKind::StdCellCluster,
            ShapeCurve::piecewise(&[(w, w)], w * h),
        )
    }

    fn macro_cluster(name: &str, w: f32, h: f32, count: u32) -> SoftMacro {
        SoftMacro::cluster(
            name,
            SoftMacroKind::MacroCluster,
            ShapeCurve::discrete(&[(w, h)]),
        )
        .with_macro_stats(count, 1.0)
    }

    fn core_with(
        outline: Rect,
        macros: Vec<SoftMacro>,
        weights: CostWeights,
        soft_weights: SoftCostWeights,
        seed: u64,
    ) -> SaCoreSoftMacro {
        SaCoreSoftMacro::new(
            Rect::new(0.0, 0.0, outline.ux, outline.uy),
            outline,
            macros,
            Vec::new(),
            weights,
            soft_weights,
            None,
            ActionProbs::default(),
            small_params(seed),
        )
    }

    #[test]
    fn macro_inside_fence_has_zero_penalty() {
        let macros = vec![macro_cluster("c0", 10.0, 10.0, 1)];
        let weights = CostWeights {
            fence: 1.0,
            ..zero_weights()
        };
        let mut sa = core_with(
            Rect::from_size(30.0, 30.0),
            macros,
            weights,
            zero_soft_weights(),
            4,
        );
        let mut fences = BTreeMap::new();
        fences.insert(MacroId::from_raw(0), Rect::new(0.0, 0.0, 20.0, 20.0));
        sa.set_fences(fences);
        sa.run();
        assert_eq!(sa.fence_penalty(), 0.0);
    }

    #[test]
    fn boundary_penalty_uses_root_frame() {
        // The outline sits at (50,50) inside a 100x100 root. A macro-bearing
        // cluster at the outline's origin is 40 from the nearest root edge.
        let root = Rect::from_size(100.0, 100.0);
        let outline = Rect::new(50.0, 50.0, 100.0, 100.0);
        let macros = vec![macro_cluster("m", 10.0, 10.0, 1)];
        let mut sa = SaCoreSoftMacro::new(
            root,
            outline,
            macros,
            Vec::new(),
            zero_weights(),
            SoftCostWeights {
                boundary: 1.0,
                ..zero_soft_weights()
            },
            None,
            ActionProbs::default(),
            small_params(0),
        );
        sa.base.init_sequence_pair();
        sa.base.pack_floorplan();
        sa.cal_penalty();
        assert!((sa.boundary_penalty() - 40.0).abs() < 1e-5);

        // The same cluster in an origin-anchored outline touches the root
        // boundary: zero distance.
        let macros = vec![macro_cluster("m", 10.0, 10.0, 1)];
        let mut sa2 = SaCoreSoftMacro::new(
            root,
            Rect::from_size(50.0, 50.0),
            macros,
            Vec::new(),
            zero_weights(),
            SoftCostWeights {
                boundary: 1.0,
                ..zero_soft_weights()
            },
            None,
            ActionProbs::default(),
            small_params(0),
        );
        sa2.base.init_sequence_pair();
        sa2.base.pack_floorplan();
        sa2.cal_penalty();
        assert_eq!(sa2.boundary_penalty(), 0.0);
    }

    #[test]
    fn blockage_overlap_weighted_by_dominance() {
        let mixed = SoftMacro::cluster(
            "mix",
            SoftMacroKind::MixedCluster,
            ShapeCurve::piecewise(&[(10.0, 10.0)], 100.0),
        )
        .with_macro_stats(2, 0.5);
        let mut sa = core_with(
            Rect::from_size(50.0, 50.0),
            vec![mixed],
            zero_weights(),
            SoftCostWeights {
                macro_blockage: 1.0,
                ..zero_soft_weights()
            },
            0,
        );
        sa.add_blockages(vec![Rect::new(0.0, 0.0, 5.0, 10.0)]);
        sa.base.init_sequence_pair();
        sa.base.pack_floorplan();
        sa.cal_penalty();
        // Overlap 50, count 2, dominance 0.5, averaged over 2 macros.
        assert!((sa.macro_blockage_penalty() - 50.0 * 2.0 * 0.5 / 2.0).abs() < 1e-4);

        sa.add_fixed_macros(vec![Rect::new(0.0, 0.0, 5.0, 10.0)]);
        sa.cal_penalty();
        // Fixed-macro overlap is charged without the dominance discount.
        assert!((sa.macro_blockage_penalty() - (25.0 + 50.0)).abs() < 1e-4);
    }

    #[test]
    fn infeasible_floorplan_is_one_giant_notch() {
        let macros = vec![macro_cluster("m", 40.0, 10.0, 1)];
        let mut sa = core_with(
            Rect::from_size(20.0, 20.0),
            macros,
            zero_weights(),
            SoftCostWeights {
                notch: 1.0,
                ..zero_soft_weights()
            },
            0,
        );
        sa.base.init_sequence_pair();
        sa.base.pack_floorplan();
        sa.cal_penalty();
        // max(40,20) * max(10,20) / (20*20)
        assert!((sa.notch_penalty() - (40.0 * 20.0 / 400.0f32).sqrt()).abs() < 1e-5);
    }

    #[test]
    fn corridor_between_macros_is_a_notch() {
        // Three macro clusters leave a 4-wide corridor open only at the top;
        // 4 is below the default threshold (outline/10 = 10).
        let macros = vec![
            macro_cluster("bottom", 100.0, 40.0, 1),
            macro_cluster("left", 48.0, 60.0, 1),
            macro_cluster("right", 48.0, 60.0, 1),
        ];
        let mut sa = core_with(
            Rect::from_size(100.0, 100.0),
            macros,
            zero_weights(),
            SoftCostWeights {
                notch: 1.0,
                ..zero_soft_weights()
            },
            0,
        );
        sa.base.init_sequence_pair();
        sa.base.macros[0].override_location(0.0, 0.0);
        sa.base.macros[1].override_location(0.0, 40.0);
        sa.base.macros[2].override_location(52.0, 40.0);
        sa.base.width = 100.0;
        sa.base.height = 100.0;
        sa.cal_notch_penalty();
        let expected = (4.0 * 60.0 / 10000.0f32).sqrt();
        assert!(
            (sa.notch_penalty() - expected).abs() < 1e-5,
            "notch {} expected {expected}",
            sa.notch_penalty()
        );
    }

    #[test]
    fn open_dead_space_is_not_a_notch() {
        // One macro cluster in a corner: the empty L-region touches two
        // outline edges and is wide, so it is not a notch.
        let macros = vec![macro_cluster("m", 20.0, 20.0, 1)];
        let mut sa = core_with(
            Rect::from_size(100.0, 100.0),
            macros,
            zero_weights(),
            SoftCostWeights {
                notch: 1.0,
                ..zero_soft_weights()
            },
            0,
        );
        sa.base.init_sequence_pair();
        sa.base.pack_floorplan();
        sa.cal_penalty();
        assert_eq!(sa.notch_penalty(), 0.0);
    }

    #[test]
    fn fill_dead_space_grows_std_cluster() {
        let macros = vec![
            std_cluster("std", 10.0, 10.0),
            macro_cluster("m", 10.0, 10.0, 1),
        ];
        let mut sa = core_with(
            Rect::from_size(30.0, 10.0),
            macros,
            zero_weights(),
            zero_soft_weights(),
            0,
        );
        sa.base.init_sequence_pair();
        sa.base.macros[0].override_location(0.0, 0.0);
        sa.base.macros[1].override_location(20.0, 0.0);
        sa.base.width = 30.0;
        sa.base.height = 10.0;
        sa.fill_dead_space();
        // The std cluster absorbs the empty middle cell.
        assert_eq!(sa.base.macros[0].x(), 0.0);
        assert_eq!(sa.base.macros[0].width(), 20.0);
        // The macro cluster is untouched.
        assert_eq!(sa.base.macros[1].x(), 20.0);
        assert_eq!(sa.base.macros[1].width(), 10.0);
    }

    #[test]
    fn perturb_restore_is_bit_identical() {
        let macros = vec![
            SoftMacro::cluster(
                "a",
                SoftMacroKind::StdCellCluster,
                ShapeCurve::piecewise(&[(5.0, 20.0)], 100.0),
            ),
            SoftMacro::cluster(
                "b",
                SoftMacroKind::MixedCluster,
                ShapeCurve::piecewise(&[(8.0, 16.0)], 128.0),
            )
            .with_macro_stats(1, 0.5),
            macro_cluster("c", 10.0, 5.0, 2),
        ];
        let mut sa = core_with(
            Rect::from_size(60.0, 60.0),
            macros,
            CostWeights::default(),
            SoftCostWeights::default(),
            13,
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
                sa.boundary_penalty,
                sa.macro_blockage_penalty,
                sa.notch_penalty,
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
                    sa.boundary_penalty,
                    sa.macro_blockage_penalty,
                    sa.notch_penalty,
                ),
                state_before
            );
        }
    }

    #[test]
    fn invalid_states_rejected_when_disallowed() {
        // Total object area exceeds the outline: no feasible sequence pair
        // exists, so no valid result is ever recorded.
        let macros = vec![std_cluster("a", 10.0, 10.0), std_cluster("b", 10.0, 10.0)];
        let weights = CostWeights {
            outline: 1.0,
            ..zero_weights()
        };
        let params = SaParams {
            invalid_states_allowed: false,
            ..small_params(7)
        };
        let mut sa = SaCoreSoftMacro::new(
            Rect::from_size(15.0, 10.0),
            Rect::from_size(15.0, 10.0),
            macros,
            Vec::new(),
            weights,
            zero_soft_weights(),
            None,
            ActionProbs::default(),
            params,
        );
        sa.run();
        assert!(!sa.is_valid());
        assert_eq!(sa.best_valid_cost(), None);
    }

    #[test]
    fn centralization_centers_valid_floorplan() {
        // A macro cluster: neither alignment (it sits too far from the
        // boundary) nor dead-space filling (macro clusters are never grown)
        // disturbs the centered position.
        let macros = vec![macro_cluster("c", 10.0, 10.0, 1)];
        let mut sa = core_with(
            Rect::from_size(30.0, 30.0),
            macros,
            CostWeights {
                outline: 1.0,
                ..zero_weights()
            },
            zero_soft_weights(),
            2,
        );
        sa.run();
        assert!(sa.is_valid());
        assert_eq!(sa.macros()[0].x(), 10.0);
        assert_eq!(sa.macros()[0].y(), 10.0);
    }

    #[test]
    fn same_seed_reproduces_run() {
        let build = || {
            let macros = vec![
                SoftMacro::cluster(
                    "a",
                    SoftMacroKind::StdCellCluster,
                    ShapeCurve::piecewise(&[(5.0, 20.0)], 100.0),
                ),
                macro_cluster("b", 10.0, 5.0, 2),
                SoftMacro::cluster(
                    "c",
                    SoftMacroKind::MixedCluster,
                    ShapeCurve::piecewise(&[(8.0, 16.0)], 128.0),
                )
                .with_macro_stats(1, 0.25),
            ];
            let mut sa = core_with(
                Rect::from_size(40.0, 40.0),
                macros,
                CostWeights::default(),
                SoftCostWeights::default(),
                99,
            );
            sa.set_nets(vec![BundledNet::new(
                MacroId::from_raw(0),
                MacroId::from_raw(1),
                2.0,
            )]);
            sa.run();
            sa
        };
        let a = build();
        let b = build();
        assert_eq!(a.norm_cost(), b.norm_cost());
        assert_eq!(a.width(), b.width());
        assert_eq!(a.height(), b.height());
        for (ma, mb) in a.macros().iter().zip(b.macros()) {
            assert_eq!(ma, mb);
        }
    }

    #[test]
    fn resize_keeps_shape_on_curve() {
        let macros = vec![
            SoftMacro::cluster(
                "a",
                SoftMacroKind::StdCellCluster,
                ShapeCurve::piecewise(&[(5.0, 20.0)], 100.0),
            ),
            std_cluster("b", 10.0, 10.0),
        ];
        let probs = ActionProbs {
            pos_swap: 0.0,
            neg_swap: 0.0,
            double_swap: 0.0,
            exchange: 0.0,
            shape: 1.0,
        };
        let mut sa = SaCoreSoftMacro::new(
            Rect::from_size(60.0, 60.0),
            Rect::from_size(60.0, 60.0),
            macros,
            Vec::new(),
            CostWeights::default(),
            zero_soft_weights(),
            None,
            probs,
            small_params(21),
        );
        sa.initialize();
        for _ in 0..100 {
            sa.perturb();
            let m = &sa.macros()[0];
            assert!((m.width() * m.height() - m.area()).abs() < 1e-2);
            assert!(m.width() >= 5.0 - 1e-4 && m.width() <= 20.0 + 1e-4);
        }
    }
}
