//! Feasible-shape curves for resizable (soft) macros.
//!
//! A soft macro representing a cluster of standard cells (or a mixed
//! cluster) can trade width for height at constant area; its feasible
//! shapes form a piecewise curve of width intervals. A cluster made only
//! of hard macros can take a discrete set of tiling shapes instead. Both
//! are represented by [`ShapeCurve`].
//!
//! Width intervals are kept sorted in nondecreasing order and merged when
//! they overlap; the paired height list stores `(height_max, height_min)`
//! per interval so that `width * height == area` holds across each interval.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// The feasible width/height trade-off curve of a soft macro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeCurve {
    /// `(width_min, width_max)` per interval, nondecreasing, non-overlapping.
    widths: Vec<(f32, f32)>,
    /// `(height_max, height_min)` per interval, paired with `widths`.
    heights: Vec<(f32, f32)>,
    /// Discrete curves (macro tilings) pin each interval to a single shape.
    discrete: bool,
}

impl ShapeCurve {
    /// Builds a piecewise curve from raw width intervals and a fixed area.
    ///
    /// Intervals are sorted by their lower bound and merged when they
    /// overlap. Heights are derived from the area.
    ///
    /// # Panics
    ///
    /// Panics if `width_intervals` is empty or `area` is not positive; both
    /// indicate caller misuse.
    pub fn piecewise(width_intervals: &[(f32, f32)], area: f32) -> Self {
        assert!(
            !width_intervals.is_empty(),
            "shape curve needs at least one width interval"
        );
        assert!(area > 0.0, "shape curve area must be positive");

        let mut sorted = width_intervals.to_vec();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut widths: Vec<(f32, f32)> = Vec::new();
        for &(lo, hi) in &sorted {
            match widths.last_mut() {
                Some(last) if lo <= last.1 => {
                    if hi > last.1 {
                        last.1 = hi;
                    }
                }
                _ => widths.push((lo, hi)),
            }
        }
        let heights = widths.iter().map(|&(lo, hi)| (area / lo, area / hi)).collect();

        Self {
            widths,
            heights,
            discrete: false,
        }
    }

    /// Builds a discrete curve from a list of `(width, height)` tilings.
    ///
    /// # Panics
    ///
    /// Panics if `tilings` is empty (caller misuse).
    pub fn discrete(tilings: &[(f32, f32)]) -> Self {
        assert!(!tilings.is_empty(), "discrete shape curve needs tilings");
        let widths = tilings.iter().map(|&(w, _)| (w, w)).collect();
        let heights = tilings.iter().map(|&(_, h)| (h, h)).collect();
        Self {
            widths,
            heights,
            discrete: true,
        }
    }

    /// Returns whether this is a discrete (tiling) curve.
    pub fn is_discrete(&self) -> bool {
        self.discrete
    }

    /// Returns the number of intervals (or tilings).
    pub fn num_intervals(&self) -> usize {
        self.widths.len()
    }

    /// Returns the initial shape: the narrowest feasible width and its height.
    pub fn initial_shape(&self) -> (f32, f32) {
        (self.widths[0].0, self.heights[0].0)
    }

    /// Returns the area of the interval at `idx`.
    fn interval_area(&self, idx: usize) -> f32 {
        self.widths[idx].1 * self.heights[idx].1
    }

    /// Snaps a requested width onto the curve.
    ///
    /// Returns the `(width, height)` pair actually realizable: widths below
    /// the curve clamp to the narrowest shape, widths above it to the widest,
    /// and widths falling between intervals snap up to the next interval's
    /// lower bound.
    pub fn resolve_width(&self, width: f32) -> (f32, f32) {
        let first = self.widths[0];
        let last = self.widths[self.widths.len() - 1];
        if width <= first.0 {
            return (first.0, self.heights[0].0);
        }
        if width >= last.1 {
            return (last.1, self.heights[self.heights.len() - 1].1);
        }
        let mut idx = 0;
        while self.widths[idx].1 < width {
            idx += 1;
        }
        let width = width.max(self.widths[idx].0);
        let area = self.interval_area(idx);
        (width, area / width)
    }

    /// Snaps a requested height onto the curve (the mirror of
    /// [`resolve_width`](Self::resolve_width); the height list is
    /// nonincreasing).
    pub fn resolve_height(&self, height: f32) -> (f32, f32) {
        let first = self.heights[0];
        let last = self.heights[self.heights.len() - 1];
        if height >= first.0 {
            return (self.widths[0].0, first.0);
        }
        if height <= last.1 {
            return (self.widths[self.widths.len() - 1].1, last.1);
        }
        let mut idx = 0;
        while self.heights[idx].1 > height {
            idx += 1;
        }
        let height = height.min(self.heights[idx].0);
        let area = self.interval_area(idx);
        (area / height, height)
    }

    /// Picks a uniform-random shape along the curve.
    ///
    /// A random interval is chosen, then a random width within it; discrete
    /// curves therefore pick a random tiling.
    pub fn random_shape<R: Rng>(&self, rng: &mut R) -> (f32, f32) {
        let idx = ((rng.gen::<f32>() * self.widths.len() as f32).floor() as usize)
            .min(self.widths.len() - 1);
        let (lo, hi) = self.widths[idx];
        let width = lo + rng.gen::<f32>() * (hi - lo);
        let area = self.interval_area(idx);
        (width, area / width)
    }

    /// Rescales a piecewise curve to a new, larger area.
    ///
    /// Each interval keeps its minimum width and minimum height; the maxima
    /// grow to accommodate the new area, merging intervals that start to
    /// overlap. Returns the new initial shape. Requests that do not grow the
    /// area (or on discrete curves) are ignored and return `None`.
    pub fn set_area(&mut self, area: f32) -> Option<(f32, f32)> {
        // The narrowest shape realizes the current area; anything at or
        // below it is a shrink and is ignored.
        if self.discrete || area <= self.widths[0].0 * self.heights[0].0 {
            return None;
        }

        let mut widths: Vec<(f32, f32)> = Vec::new();
        let mut heights: Vec<(f32, f32)> = Vec::new();
        for i in 0..self.widths.len() {
            let min_width = self.widths[i].0;
            let min_height = self.heights[i].1;
            let max_width = area / min_height;
            let max_height = area / min_width;
            let merges = matches!(widths.last(), Some(last) if min_width <= last.1);
            if merges {
                let end = widths.len() - 1;
                widths[end].1 = max_width;
                heights[end].1 = min_height;
            } else {
                widths.push((min_width, max_width));
                heights.push((max_height, min_height));
            }
        }
        self.widths = widths;
        self.heights = heights;
        Some(self.initial_shape())
    }
}
